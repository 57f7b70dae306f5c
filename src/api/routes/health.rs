//! Health endpoint for the dashboard API.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::server::AppState;

/// GET /api/health — liveness plus cache and queue occupancy.
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cache = state.cache.stats();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "cache_entries": cache.total_entries,
        "cache_hits": cache.total_hits,
        "in_flight": state.insights.in_flight(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::server::tests::test_state;
    use std::time::Duration;

    #[tokio::test]
    async fn test_get_health_returns_ok() {
        let (state, _) = test_state(Some("{}"));
        state.cache.insert("prices", json!({}));
        assert!(state.cache.get("prices", Duration::from_secs(60)).is_some());
        let Json(body) = get_health(State(Arc::new(state))).await;
        assert_eq!(body["status"], "ok");
        assert!(body["version"].is_string());
        assert_eq!(body["cache_entries"], 1);
        assert_eq!(body["cache_hits"], 1);
        assert_eq!(body["in_flight"], 0);
    }
}
