//! Day-scoped local cache and prefetch for the podcast script.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::clock::{iso_date, Clock};
use crate::error::{MacroError, Result};

use super::storage::KeyValueStore;

/// Local key holding the cached script.
pub const PODCAST_CACHE_KEY: &str = "podcast_cache_v3";

/// Podcast generation sits behind the server's throttle; allow it time.
pub const PODCAST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CachedPodcast {
    date: String,
    #[serde(default)]
    lines: Vec<Value>,
}

/// Lines cached for `today`, if any.
fn cached_lines(raw: &str, today: NaiveDate) -> Option<Vec<Value>> {
    let cached: CachedPodcast = serde_json::from_str(raw).ok()?;
    (cached.date == iso_date(today) && !cached.lines.is_empty()).then_some(cached.lines)
}

/// Non-empty `lines` from a `/api/podcast` body; in-band errors yield `None`.
fn response_lines(body: Value) -> Option<Vec<Value>> {
    if body.get("error").is_some() {
        return None;
    }
    match body {
        Value::Object(mut map) => match map.remove("lines") {
            Some(Value::Array(lines)) if !lines.is_empty() => Some(lines),
            _ => None,
        },
        _ => None,
    }
}

/// Prefetches today's podcast script once and keeps it for the day.
pub struct PodcastCache {
    client: Client,
    endpoint: Url,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl PodcastCache {
    pub fn new(
        server_url: &str,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let endpoint = Url::parse(server_url)
            .and_then(|base| base.join("/api/podcast"))
            .map_err(|e| MacroError::Config(format!("invalid server URL {server_url:?}: {e}")))?;
        let client = Client::builder()
            .timeout(PODCAST_TIMEOUT)
            .build()
            .map_err(|e| MacroError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            store,
            clock,
        })
    }

    /// Today's cached lines, without touching the network.
    pub async fn cached(&self) -> Option<Vec<Value>> {
        match self.store.get(PODCAST_CACHE_KEY).await {
            Ok(Some(raw)) => cached_lines(&raw, self.clock.today()),
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "Podcast cache unreadable");
                None
            }
        }
    }

    /// Cached lines for today, or a fresh script from the server. Any
    /// failure yields `None`.
    pub async fn prefetch(&self) -> Option<Vec<Value>> {
        if let Some(lines) = self.cached().await {
            debug!(lines = lines.len(), "Podcast served from local cache");
            return Some(lines);
        }

        let lines = match self.fetch().await {
            Ok(Some(lines)) => lines,
            Ok(None) => {
                debug!("Podcast response had no script");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Podcast prefetch failed");
                return None;
            }
        };

        let entry = CachedPodcast {
            date: iso_date(self.clock.today()),
            lines: lines.clone(),
        };
        match serde_json::to_string(&entry) {
            Ok(raw) => {
                if let Err(e) = self.store.set(PODCAST_CACHE_KEY, raw).await {
                    debug!(error = %e, "Failed to cache podcast");
                }
            }
            Err(e) => debug!(error = %e, "Failed to serialize podcast"),
        }
        Some(lines)
    }

    async fn fetch(&self) -> Result<Option<Vec<Value>>> {
        let body = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await?
            .json::<Value>()
            .await?;
        Ok(response_lines(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::build_router;
    use crate::api::server::tests::test_state;
    use crate::client::storage::KvStore;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 7).unwrap()
    }

    async fn serve(text: Option<&str>) -> String {
        let (state, _) = test_state(text);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state, None)).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_cached_lines_requires_today_and_content() {
        let raw = r#"{"date":"2026-03-07","lines":[{"speaker":"Alex","text":"hi"}]}"#;
        assert_eq!(cached_lines(raw, today()).unwrap().len(), 1);
        let yesterday = NaiveDate::from_ymd_opt(2026, 3, 6).unwrap();
        assert!(cached_lines(raw, yesterday).is_none());
        assert!(cached_lines(r#"{"date":"2026-03-07","lines":[]}"#, today()).is_none());
        assert!(cached_lines("garbage", today()).is_none());
    }

    #[test]
    fn test_response_lines() {
        assert_eq!(
            response_lines(json!({"lines": [{"speaker": "Sam", "text": "x"}]}))
                .unwrap()
                .len(),
            1
        );
        assert!(response_lines(json!({"lines": []})).is_none());
        assert!(response_lines(json!({"error": "Podcast generation failed", "lines": [1]})).is_none());
        assert!(response_lines(json!([1])).is_none());
    }

    #[tokio::test]
    async fn test_prefetch_uses_cache_without_network() {
        let store = Arc::new(KvStore::new_in_memory());
        store
            .set(
                PODCAST_CACHE_KEY,
                r#"{"date":"2026-03-07","lines":[{"speaker":"Alex","text":"cached"}]}"#.into(),
            )
            .await
            .unwrap();
        // Nothing listens on port 9.
        let cache = PodcastCache::new(
            "http://127.0.0.1:9",
            store,
            Arc::new(ManualClock::new(today())),
        )
        .unwrap();
        let lines = cache.prefetch().await.unwrap();
        assert_eq!(lines[0]["text"], "cached");
    }

    #[tokio::test]
    async fn test_prefetch_unreachable_is_none() {
        let store = Arc::new(KvStore::new_in_memory());
        let cache = PodcastCache::new(
            "http://127.0.0.1:9",
            store.clone(),
            Arc::new(ManualClock::new(today())),
        )
        .unwrap();
        assert!(cache.prefetch().await.is_none());
        assert!(store.get(PODCAST_CACHE_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prefetch_fetches_and_caches() {
        let base = serve(Some(r#"{"lines":[{"speaker":"Alex","text":"Morning!"}]}"#)).await;
        let store = Arc::new(KvStore::new_in_memory());
        let cache =
            PodcastCache::new(&base, store.clone(), Arc::new(ManualClock::new(today()))).unwrap();

        let lines = cache.prefetch().await.unwrap();
        assert_eq!(lines[0]["speaker"], "Alex");
        let raw = store.get(PODCAST_CACHE_KEY).await.unwrap().unwrap();
        assert_eq!(cached_lines(&raw, today()).unwrap(), lines);
    }

    #[tokio::test]
    async fn test_prefetch_generation_failure_not_cached() {
        let base = serve(None).await;
        let store = Arc::new(KvStore::new_in_memory());
        let cache =
            PodcastCache::new(&base, store.clone(), Arc::new(ManualClock::new(today()))).unwrap();

        assert!(cache.prefetch().await.is_none());
        assert!(store.keys().await.unwrap().is_empty());
    }
}
