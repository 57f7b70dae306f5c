//! Generated insight and podcast routes.
//!
//! Generation failures are reported in-band (`200 {error, detail}`) so the
//! dashboard client can retry without treating the server as down.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use crate::api::server::AppState;
use crate::error::MacroError;

const INSIGHTS_CACHE_CONTROL: &str = "public, max-age=3600";

#[derive(Debug, Deserialize)]
pub struct InsightQuery {
    s: Option<String>,
}

/// GET /api/insights?s=<section>
pub async fn get_insights(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InsightQuery>,
) -> Response {
    let Some(key) = query.s.filter(|s| !s.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Missing section",
                "detail": "query parameter `s` is required",
            })),
        )
            .into_response();
    };

    match state.insights.section(&key).await {
        Ok(body) => (
            [(header::CACHE_CONTROL, INSIGHTS_CACHE_CONTROL)],
            Json(body),
        )
            .into_response(),
        Err(e @ MacroError::UnknownSection(_)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Unknown section", "detail": e.to_string() })),
        )
            .into_response(),
        Err(e) => {
            error!(section = %key, error = %e, "Insights request failed");
            Json(json!({ "error": "Insights generation failed", "detail": e.to_string() }))
                .into_response()
        }
    }
}

/// GET /api/podcast
pub async fn get_podcast(State(state): State<Arc<AppState>>) -> Response {
    match state.insights.podcast().await {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            error!(error = %e, "Podcast request failed");
            Json(json!({ "error": "Podcast generation failed", "detail": e.to_string() }))
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::api::server::build_router;
    use crate::api::server::tests::{get_json, test_state};
    use axum::http::{header, StatusCode};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_insights_success_sets_cache_header() {
        let (state, provider) = test_state(Some(r#"{"collectibles": {"intro": "Watches steady"}}"#));
        let app = build_router(state, None);

        let (status, headers, body) = get_json(app.clone(), "/api/insights?s=collectibles").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=3600");
        assert_eq!(body["collectibles"]["intro"], "Watches steady");

        // Second request is a cache hit.
        let (_, _, again) = get_json(app, "/api/insights?s=collectibles").await;
        assert_eq!(again, body);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_insights_unknown_section_is_400() {
        let (state, provider) = test_state(Some("{}"));
        let app = build_router(state, None);
        let (status, _, body) = get_json(app, "/api/insights?s=weather").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unknown section");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_insights_missing_section_is_400() {
        let (state, _) = test_state(Some("{}"));
        let app = build_router(state, None);
        let (status, _, body) = get_json(app, "/api/insights").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("`s`"));
    }

    #[tokio::test]
    async fn test_insights_generation_failure_in_band() {
        let (state, _) = test_state(None);
        let app = build_router(state, None);
        let (status, headers, body) = get_json(app, "/api/insights?s=us_economy").await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.get(header::CACHE_CONTROL).is_none());
        assert_eq!(body["error"], "Insights generation failed");
        assert!(body["detail"].as_str().unwrap().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_podcast_malformed_reported_in_band() {
        let (state, _) = test_state(Some(r#"{"lines": []}"#));
        let app = build_router(state, None);
        let (status, _, body) = get_json(app, "/api/podcast").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], "Podcast generation failed");
    }

    #[tokio::test]
    async fn test_podcast_success() {
        let (state, _) = test_state(Some(
            r#"{"lines": [{"speaker": "Alex", "text": "Good morning."}, {"speaker": "Sam", "text": "Payrolls beat."}]}"#,
        ));
        let app = build_router(state, None);
        let (_, _, body) = get_json(app, "/api/podcast").await;
        assert_eq!(body["lines"].as_array().unwrap().len(), 2);
    }
}
