//! Yahoo Finance chart API parsing.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MacroError, Result};

/// Public chart endpoint base.
pub const YAHOO_CHART_BASE: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Gold futures.
pub const GOLD_SYMBOL: &str = "GC=F";
/// WTI crude futures.
pub const WTI_SYMBOL: &str = "CL=F";
/// Brent crude futures.
pub const BRENT_SYMBOL: &str = "BZ=F";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// Latest price against the previous close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub price: f64,
    pub prev: f64,
    pub change: f64,
    pub change_pct: f64,
    pub direction: Direction,
    pub currency: String,
    /// Set on placeholder quotes served when the upstream fetch failed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
}

impl Quote {
    /// Zeroed placeholder used when live prices are unavailable.
    pub fn unavailable() -> Self {
        Self {
            price: 0.0,
            prev: 0.0,
            change: 0.0,
            change_pct: 0.0,
            direction: Direction::Up,
            currency: "USD".to_string(),
            error: true,
        }
    }
}

/// The three live commodity quotes served by `/api/prices`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prices {
    pub gold: Quote,
    pub oil_wti: Quote,
    pub oil_brent: Quote,
}

impl Prices {
    pub fn unavailable() -> Self {
        Self {
            gold: Quote::unavailable(),
            oil_wti: Quote::unavailable(),
            oil_brent: Quote::unavailable(),
        }
    }
}

/// One daily close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// `YYYY-MM-DD` (UTC).
    pub date: String,
    pub value: f64,
}

/// Chart range covering `years` of history.
pub fn history_range(years: i64) -> &'static str {
    match years {
        i64::MIN..=1 => "1y",
        2 => "2y",
        _ => "5y",
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn first_result<'a>(body: &'a Value, symbol: &str) -> Result<&'a Value> {
    body.pointer("/chart/result/0")
        .filter(|r| !r.is_null())
        .ok_or_else(|| MacroError::Upstream(format!("no chart data for {symbol}")))
}

/// Build a [`Quote`] from a chart response's `meta` block.
pub fn parse_quote(symbol: &str, body: &Value) -> Result<Quote> {
    let meta = &first_result(body, symbol)?["meta"];
    let price = meta["regularMarketPrice"]
        .as_f64()
        .ok_or_else(|| MacroError::MalformedResponse(format!("{symbol}: missing regularMarketPrice")))?;
    let prev = meta["chartPreviousClose"]
        .as_f64()
        .filter(|p| *p != 0.0)
        .or_else(|| meta["previousClose"].as_f64())
        .ok_or_else(|| MacroError::MalformedResponse(format!("{symbol}: missing previous close")))?;

    let change = round_to(price - prev, 2);
    let change_pct = if prev == 0.0 {
        0.0
    } else {
        round_to(change / prev * 100.0, 2)
    };
    Ok(Quote {
        price: round_to(price, 2),
        prev: round_to(prev, 2),
        change,
        change_pct,
        direction: if change >= 0.0 { Direction::Up } else { Direction::Down },
        currency: meta["currency"].as_str().unwrap_or("USD").to_string(),
        error: false,
    })
}

/// Daily closes from a chart response. Null closes are skipped.
pub fn parse_history(symbol: &str, body: &Value) -> Result<Vec<HistoryPoint>> {
    let result = first_result(body, symbol)?;
    let (Some(timestamps), Some(closes)) = (
        result["timestamp"].as_array(),
        result.pointer("/indicators/quote/0/close").and_then(Value::as_array),
    ) else {
        return Err(MacroError::MalformedResponse(format!(
            "{symbol}: missing timestamp or close series"
        )));
    };

    Ok(timestamps
        .iter()
        .zip(closes)
        .filter_map(|(ts, close)| {
            let close = close.as_f64()?;
            let date = DateTime::from_timestamp(ts.as_i64()?, 0)?.date_naive();
            Some(HistoryPoint {
                date: date.format("%Y-%m-%d").to_string(),
                value: round_to(close, 1),
            })
        })
        .collect())
}
