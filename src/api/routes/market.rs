//! Market proxy routes.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;

use crate::api::server::AppState;
use crate::market::fred;

const DEFAULT_HISTORY_YEARS: i64 = 2;

/// GET /api/prices — always 200; placeholders carry `error: true`.
pub async fn get_prices(State(state): State<Arc<AppState>>) -> Response {
    Json(state.market.prices().await).into_response()
}

#[derive(Debug, Deserialize)]
pub struct GoldHistoryQuery {
    years: Option<String>,
}

/// Parse `years`, falling back to two on anything missing, zero or non-numeric.
fn history_years(raw: Option<&str>) -> i64 {
    raw.and_then(|y| y.trim().parse::<i64>().ok())
        .filter(|y| *y != 0)
        .unwrap_or(DEFAULT_HISTORY_YEARS)
}

/// GET /api/gold-history?years=N
pub async fn get_gold_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GoldHistoryQuery>,
) -> Response {
    let years = history_years(query.years.as_deref());
    match state.market.gold_history(years).await {
        Ok(points) => (
            [(header::CACHE_CONTROL, "public, max-age=3600")],
            Json(points),
        )
            .into_response(),
        Err(e) => {
            error!(years, error = %e, "Gold history request failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "Failed to fetch gold history" })),
            )
                .into_response()
        }
    }
}

/// GET /api/fred?_endpoint=<path>&...
pub async fn get_fred(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    let Some(endpoint) = params.get(fred::ENDPOINT_PARAM) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing _endpoint" })),
        )
            .into_response();
    };
    if let Err(e) = fred::validate_endpoint(endpoint) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid _endpoint", "detail": e.to_string() })),
        )
            .into_response();
    }

    match state.market.fred(endpoint, &params).await {
        Ok(body) => (
            [(header::CACHE_CONTROL, "public, max-age=1800")],
            Json(body),
        )
            .into_response(),
        Err(e) => {
            error!(endpoint = %endpoint, error = %e, "FRED request failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "FRED API error", "detail": e.to_string() })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::server::build_router;
    use crate::api::server::tests::{get_json, test_state};

    #[test]
    fn test_history_years_parsing() {
        assert_eq!(history_years(None), 2);
        assert_eq!(history_years(Some("5")), 5);
        assert_eq!(history_years(Some("0")), 2);
        assert_eq!(history_years(Some("abc")), 2);
        assert_eq!(history_years(Some(" 1 ")), 1);
    }

    #[tokio::test]
    async fn test_prices_fallback_is_200() {
        let (state, _) = test_state(Some("{}"));
        let app = build_router(state, None);
        let (status, _, body) = get_json(app, "/api/prices").await;
        assert_eq!(status, StatusCode::OK);
        for key in ["gold", "oil_wti", "oil_brent"] {
            assert_eq!(body[key]["error"], true, "{key}");
            assert_eq!(body[key]["price"], 0.0, "{key}");
        }
    }

    #[tokio::test]
    async fn test_gold_history_failure_is_502() {
        let (state, _) = test_state(Some("{}"));
        let app = build_router(state, None);
        let (status, _, body) = get_json(app, "/api/gold-history?years=5").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Failed to fetch gold history");
    }

    #[tokio::test]
    async fn test_gold_history_cached_response() {
        let (state, _) = test_state(Some("{}"));
        state.cache.insert(
            "gold_history_1",
            json!([{"date": "2026-03-06", "value": 2901.3}]),
        );
        let app = build_router(state, None);
        let (status, headers, body) = get_json(app, "/api/gold-history?years=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=3600");
        assert_eq!(body[0]["value"], 2901.3);
    }

    #[tokio::test]
    async fn test_fred_missing_endpoint_is_400() {
        let (state, _) = test_state(Some("{}"));
        let app = build_router(state, None);
        let (status, _, body) = get_json(app, "/api/fred?series_id=UNRATE").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing _endpoint");
    }

    #[tokio::test]
    async fn test_fred_traversal_is_400() {
        let (state, _) = test_state(Some("{}"));
        let app = build_router(state, None);
        let (status, _, _) = get_json(app, "/api/fred?_endpoint=..%2Fadmin").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_fred_cached_response_served() {
        let (state, _) = test_state(Some("{}"));
        state.cache.insert(
            "fred_series/observations?series_id=UNRATE",
            json!({"observations": [{"value": "4.1"}]}),
        );
        let app = build_router(state, None);
        let (status, headers, body) = get_json(
            app,
            "/api/fred?_endpoint=series/observations&series_id=UNRATE",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=1800");
        assert_eq!(body["observations"][0]["value"], "4.1");
    }

    #[tokio::test]
    async fn test_fred_upstream_failure_is_502() {
        let (state, _) = test_state(Some("{}"));
        let app = build_router(state, None);
        let (status, _, body) =
            get_json(app, "/api/fred?_endpoint=series/observations&series_id=CPI").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "FRED API error");
    }
}
