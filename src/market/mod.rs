//! Market data proxies: live commodity quotes, gold price history and the
//! FRED API, all behind the shared TTL cache.

pub mod fred;
pub mod yahoo;

pub use fred::FredApiKey;
pub use yahoo::{HistoryPoint, Prices, Quote};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::error::{MacroError, Result};

/// Live quotes stay fresh for five minutes.
pub const PRICES_TTL: Duration = Duration::from_secs(5 * 60);
/// Gold history and FRED responses stay fresh for an hour.
pub const SERIES_TTL: Duration = Duration::from_secs(60 * 60);
/// Timeout for proxied market calls.
pub const MARKET_TIMEOUT: Duration = Duration::from_secs(15);
/// Timeout for a single quote lookup.
pub const QUOTE_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko)";

pub struct MarketService {
    client: Client,
    cache: Arc<TtlCache<Value>>,
    yahoo_base: String,
    fred_base: String,
    fred_key: Option<FredApiKey>,
}

impl std::fmt::Debug for MarketService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketService")
            .field("yahoo_base", &self.yahoo_base)
            .field("fred_base", &self.fred_base)
            .field("fred_key", &self.fred_key)
            .finish()
    }
}

impl MarketService {
    pub fn new(cache: Arc<TtlCache<Value>>, fred_key: Option<FredApiKey>) -> Result<Self> {
        let client = Client::builder()
            .timeout(MARKET_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| MacroError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            cache,
            yahoo_base: yahoo::YAHOO_CHART_BASE.to_string(),
            fred_base: fred::FRED_API_BASE.to_string(),
            fred_key,
        })
    }

    /// Override upstream bases (proxies, tests).
    pub fn with_bases(mut self, yahoo_base: impl Into<String>, fred_base: impl Into<String>) -> Self {
        self.yahoo_base = yahoo_base.into().trim_end_matches('/').to_string();
        self.fred_base = fred_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Gold, WTI and Brent quotes. Never fails: when any quote cannot be
    /// fetched, every quote is replaced by a zeroed placeholder.
    pub async fn prices(&self) -> Prices {
        let fetched = self
            .cache
            .get_or_compute("prices", PRICES_TTL, || async {
                let (gold, wti, brent) = tokio::try_join!(
                    self.quote(yahoo::GOLD_SYMBOL),
                    self.quote(yahoo::WTI_SYMBOL),
                    self.quote(yahoo::BRENT_SYMBOL),
                )?;
                serde_json::to_value(Prices {
                    gold,
                    oil_wti: wti,
                    oil_brent: brent,
                })
                .map_err(|e| MacroError::MalformedResponse(e.to_string()))
            })
            .await
            .and_then(|v| {
                serde_json::from_value::<Prices>(v)
                    .map_err(|e| MacroError::MalformedResponse(e.to_string()))
            });

        fetched.unwrap_or_else(|e| {
            warn!(error = %e, "Live prices unavailable, serving placeholders");
            Prices::unavailable()
        })
    }

    /// Daily gold closes over roughly `years` years.
    pub async fn gold_history(&self, years: i64) -> Result<Vec<HistoryPoint>> {
        let key = format!("gold_history_{years}");
        let value = self
            .cache
            .get_or_compute(&key, SERIES_TTL, || async {
                let url = format!(
                    "{}/{}?range={}&interval=1d",
                    self.yahoo_base,
                    yahoo::GOLD_SYMBOL,
                    yahoo::history_range(years)
                );
                let body = self.get_json(&url, MARKET_TIMEOUT).await?;
                let points = yahoo::parse_history(yahoo::GOLD_SYMBOL, &body)?;
                debug!(years, points = points.len(), "Gold history fetched");
                serde_json::to_value(points).map_err(|e| MacroError::MalformedResponse(e.to_string()))
            })
            .await?;
        serde_json::from_value(value).map_err(|e| MacroError::MalformedResponse(e.to_string()))
    }

    /// Proxy one FRED API call. `params` may include the caller's
    /// `_endpoint`; the key and response format are always set here.
    pub async fn fred(&self, endpoint: &str, params: &BTreeMap<String, String>) -> Result<Value> {
        let endpoint = fred::validate_endpoint(endpoint)?;
        let forwarded = fred::forwarded_params(params);
        let key = fred::cache_key(endpoint, &forwarded);

        self.cache
            .get_or_compute(&key, SERIES_TTL, || async {
                let api_key = self
                    .fred_key
                    .as_ref()
                    .ok_or_else(|| MacroError::Config("FRED API key not configured".to_string()))?;
                let url = fred::request_url(&self.fred_base, endpoint, &forwarded, api_key)?;
                debug!(endpoint, "Proxying FRED request");
                self.get_json(url.as_str(), MARKET_TIMEOUT).await
            })
            .await
    }

    async fn quote(&self, symbol: &str) -> Result<Quote> {
        let url = format!("{}/{}?range=2d&interval=1d", self.yahoo_base, symbol);
        let body = self.get_json(&url, QUOTE_TIMEOUT).await?;
        yahoo::parse_quote(symbol, &body)
    }

    async fn get_json(&self, url: &str, timeout: Duration) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MacroError::Upstream(format!("HTTP {status} from market API")));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| MacroError::MalformedResponse(format!("market API returned invalid JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> MarketService {
        // Nothing listens on port 9; every request fails fast.
        MarketService::new(Arc::new(TtlCache::new()), None)
            .unwrap()
            .with_bases("http://127.0.0.1:9/chart", "http://127.0.0.1:9/fred")
    }

    #[tokio::test]
    async fn test_prices_fall_back_to_placeholders() {
        let prices = service().prices().await;
        assert_eq!(prices, Prices::unavailable());
        assert!(prices.gold.error);
    }

    #[tokio::test]
    async fn test_cached_prices_served_without_fetch() {
        let svc = service();
        let live = Prices {
            gold: Quote {
                price: 2400.0,
                error: false,
                ..Quote::unavailable()
            },
            ..Prices::unavailable()
        };
        svc.cache.insert("prices", serde_json::to_value(&live).unwrap());
        assert_eq!(svc.prices().await.gold.price, 2400.0);
    }

    #[tokio::test]
    async fn test_fred_rejects_bad_endpoint_before_fetch() {
        let err = service()
            .fred("../secrets", &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid FRED endpoint"));
    }

    #[tokio::test]
    async fn test_fred_without_key_is_config_error() {
        let err = service()
            .fred("series/observations", &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MacroError::Config(_)));
    }

    #[tokio::test]
    async fn test_gold_history_failure_propagates() {
        let svc = service();
        assert!(svc.gold_history(2).await.is_err());
        assert_eq!(svc.cache.stats().total_entries, 0);
    }
}
