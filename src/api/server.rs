//! Axum API server for the dashboard backend.

use axum::routing::get;
use axum::Router;
use serde_json::Value;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::cache::TtlCache;
use crate::error::{MacroError, Result};
use crate::insights::InsightService;
use crate::market::MarketService;

/// Shared state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    /// Cached, deduplicated insight generation.
    pub insights: Arc<InsightService>,
    /// Yahoo and FRED proxies.
    pub market: Arc<MarketService>,
    /// Process-wide cache shared by both services; exposed for health output.
    pub cache: Arc<TtlCache<Value>>,
}

impl AppState {
    pub fn new(
        insights: Arc<InsightService>,
        market: Arc<MarketService>,
        cache: Arc<TtlCache<Value>>,
    ) -> Self {
        Self {
            insights,
            market,
            cache,
        }
    }
}

/// Build the axum router with all API routes. When `static_dir` is set,
/// unmatched paths are served from it (the dashboard frontend).
pub fn build_router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let shared_state = Arc::new(state);

    let api = Router::new()
        .route("/api/health", get(super::routes::health::get_health))
        // Generated content
        .route("/api/insights", get(super::routes::insights::get_insights))
        .route("/api/podcast", get(super::routes::insights::get_podcast))
        // Market proxies
        .route("/api/prices", get(super::routes::market::get_prices))
        .route(
            "/api/gold-history",
            get(super::routes::market::get_gold_history),
        )
        .route("/api/fred", get(super::routes::market::get_fred))
        .layer(TraceLayer::new_for_http())
        .with_state(shared_state);

    if let Some(dir) = static_dir {
        api.fallback_service(ServeDir::new(dir))
    } else {
        api
    }
}

/// Bind `addr` and serve until `shutdown` is cancelled.
pub async fn start_server(
    addr: SocketAddr,
    state: AppState,
    static_dir: Option<PathBuf>,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = build_router(state, static_dir);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| MacroError::Io(format!("failed to bind {addr}: {e}")))?;
    tracing::info!("Dashboard API listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    tracing::info!("Dashboard API stopped");
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::insights::SectionGenerator;
    use crate::providers::{Generation, GenerationRequest, GenerativeProvider};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    /// Answers every prompt with a fixed payload, or fails.
    pub(crate) struct FixedProvider {
        pub(crate) text: Option<String>,
        pub(crate) calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerativeProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, _request: GenerationRequest) -> Result<Generation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.text {
                Some(text) => Ok(Generation {
                    text: text.clone(),
                    citations: vec![],
                }),
                None => Err(MacroError::Upstream("rate limited (HTTP 429)".into())),
            }
        }
    }

    pub(crate) fn test_state(text: Option<&str>) -> (AppState, Arc<FixedProvider>) {
        let provider = Arc::new(FixedProvider {
            text: text.map(str::to_string),
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(TtlCache::new());
        let insights = InsightService::new(
            SectionGenerator::new(provider.clone()),
            Arc::clone(&cache),
            Arc::new(SystemClock),
        );
        // Nothing listens on port 9; market calls fail fast.
        let market = MarketService::new(Arc::clone(&cache), None)
            .unwrap()
            .with_bases("http://127.0.0.1:9/chart", "http://127.0.0.1:9/fred");
        let state = AppState::new(Arc::new(insights), Arc::new(market), cache);
        (state, provider)
    }

    pub(crate) async fn get_json(app: Router, uri: &str) -> (StatusCode, header::HeaderMap, Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    #[test]
    fn test_build_router_no_static() {
        let (state, _) = test_state(Some("{}"));
        let _router = build_router(state, None);
    }

    #[tokio::test]
    async fn test_static_fallback_serves_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>dashboard</h1>").unwrap();
        let (state, _) = test_state(Some("{}"));
        let app = build_router(state, Some(dir.path().to_path_buf()));

        let req = Request::builder()
            .uri("/index.html")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"<h1>dashboard</h1>");
    }

    #[tokio::test]
    async fn test_unknown_route_without_static_is_404() {
        let (state, _) = test_state(Some("{}"));
        let app = build_router(state, None);
        let (status, _, _) = get_json(app, "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_server_stops_on_cancel() {
        let (state, _) = test_state(Some("{}"));
        let shutdown = CancellationToken::new();
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let handle = tokio::spawn(start_server(addr, state, None, shutdown.clone()));
        shutdown.cancel();
        assert!(handle.await.unwrap().is_ok());
    }
}
