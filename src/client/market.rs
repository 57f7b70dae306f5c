//! Hourly quantitative refresh through the dashboard server's proxies.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::{MacroError, Result};
use crate::market::yahoo::Prices;

/// Default FRED series refreshed by the client.
pub const DEFAULT_SERIES: &[&str] = &["UNRATE", "DFF", "DGS10", "DGS2", "T10Y2Y", "VIXCLS"];

/// Observations requested per series; the newest valid one is kept.
const OBSERVATION_LIMIT: &str = "15";

/// Newest usable observation of a FRED series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub date: String,
    pub value: f64,
}

/// Result of one refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub prices: Prices,
    /// Latest observation per series; `None` when the series failed.
    pub series: BTreeMap<String, Option<Observation>>,
}

/// First observation whose value parses. FRED marks gaps with `"."`.
pub fn latest_observation(body: &Value) -> Option<Observation> {
    body.get("observations")?
        .as_array()?
        .iter()
        .find_map(|o| {
            let date = o.get("date")?.as_str()?;
            let value = o.get("value")?.as_str()?.parse::<f64>().ok()?;
            Some(Observation {
                date: date.to_string(),
                value,
            })
        })
}

/// Pulls live prices and FRED series from the dashboard server.
pub struct MarketClient {
    client: Client,
    base: Url,
    series: Vec<String>,
}

impl MarketClient {
    pub fn new(server_url: &str, series: Vec<String>, timeout: Duration) -> Result<Self> {
        let base = Url::parse(server_url)
            .map_err(|e| MacroError::Config(format!("invalid server URL {server_url:?}: {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MacroError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base,
            series,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| MacroError::Config(format!("invalid API path {path}: {e}")))
    }

    /// Fetch prices and every configured series. Only a prices failure is
    /// an error; series failures are logged and reported as `None`.
    pub async fn refresh(&self) -> Result<MarketSnapshot> {
        let prices_req = self.prices();
        let series_req = futures::future::join_all(self.series.iter().map(|id| async move {
            let latest = match self.latest(id).await {
                Ok(latest) => latest,
                Err(e) => {
                    warn!(series = %id, error = %e, "FRED series refresh failed");
                    None
                }
            };
            (id.clone(), latest)
        }));
        let (prices, series) = tokio::join!(prices_req, series_req);
        let snapshot = MarketSnapshot {
            prices: prices?,
            series: series.into_iter().collect(),
        };
        debug!(series = snapshot.series.len(), "Market snapshot refreshed");
        Ok(snapshot)
    }

    async fn prices(&self) -> Result<Prices> {
        let response = self.client.get(self.url("/api/prices")?).send().await?;
        if !response.status().is_success() {
            return Err(MacroError::Upstream(format!(
                "prices request failed: HTTP {}",
                response.status()
            )));
        }
        response
            .json::<Prices>()
            .await
            .map_err(|e| MacroError::MalformedResponse(format!("prices body: {e}")))
    }

    async fn latest(&self, series_id: &str) -> Result<Option<Observation>> {
        let mut url = self.url("/api/fred")?;
        url.query_pairs_mut()
            .append_pair("_endpoint", "series/observations")
            .append_pair("series_id", series_id)
            .append_pair("sort_order", "desc")
            .append_pair("limit", OBSERVATION_LIMIT);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.json::<Value>().await?;
        if !status.is_success() {
            let detail = body
                .get("detail")
                .or_else(|| body.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(MacroError::Upstream(format!("HTTP {status}: {detail}")));
        }
        Ok(latest_observation(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::build_router;
    use crate::api::server::tests::test_state;
    use serde_json::json;

    #[test]
    fn test_latest_observation_skips_gaps() {
        let body = json!({"observations": [
            {"date": "2026-03-06", "value": "."},
            {"date": "2026-03-05", "value": "4.12"},
            {"date": "2026-03-04", "value": "4.10"}
        ]});
        assert_eq!(
            latest_observation(&body),
            Some(Observation {
                date: "2026-03-05".into(),
                value: 4.12
            })
        );
        assert!(latest_observation(&json!({"observations": []})).is_none());
        assert!(latest_observation(&json!({"error_message": "bad"})).is_none());
    }

    #[tokio::test]
    async fn test_refresh_through_local_server() {
        let (state, _) = test_state(Some("{}"));
        state.cache.insert(
            "fred_series/observations?limit=15&series_id=UNRATE&sort_order=desc",
            json!({"observations": [{"date": "2026-02-01", "value": "4.1"}]}),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state, None)).await.unwrap();
        });

        let client = MarketClient::new(
            &format!("http://{addr}"),
            vec!["UNRATE".into(), "DGS10".into()],
            Duration::from_secs(10),
        )
        .unwrap();
        let snapshot = client.refresh().await.unwrap();

        // Yahoo is unreachable in tests, so prices are placeholders.
        assert!(snapshot.prices.gold.error);
        assert_eq!(snapshot.series["UNRATE"].as_ref().unwrap().value, 4.1);
        // No FRED key and nothing cached: the proxy answers 502.
        assert_eq!(snapshot.series["DGS10"], None);
    }

    #[tokio::test]
    async fn test_refresh_unreachable_server_is_error() {
        let client =
            MarketClient::new("http://127.0.0.1:9", vec![], Duration::from_secs(2)).unwrap();
        assert!(client.refresh().await.is_err());
    }
}
