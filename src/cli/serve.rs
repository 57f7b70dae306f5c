//! `macrodesk serve`: the dashboard API server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use macrodesk::api::{start_server, AppState};
use macrodesk::cache::TtlCache;
use macrodesk::clock::SystemClock;
use macrodesk::config::Config;
use macrodesk::insights::{InsightService, SectionGenerator};
use macrodesk::market::{FredApiKey, MarketService};
use macrodesk::providers::{GeminiProvider, ThrottledProvider};

/// Build the shared state from config.
pub(crate) fn build_state(config: &Config) -> Result<AppState> {
    let gemini = GeminiProvider::from_config(
        config.gemini.api_key.as_deref(),
        &config.gemini.model,
        config.gemini.timeout(),
    )
    .with_context(|| "Failed to configure the Gemini provider")?;
    let provider = ThrottledProvider::new(
        Arc::new(gemini),
        config.gemini.concurrency,
        config.gemini.min_delay(),
    );

    let cache = Arc::new(TtlCache::new());
    let insights = InsightService::new(
        SectionGenerator::new(Arc::new(provider)),
        Arc::clone(&cache),
        Arc::new(SystemClock),
    )
    .with_ttl(config.cache.insight_ttl());

    let fred_key = config.fred.api_key.clone().and_then(FredApiKey::new);
    if fred_key.is_none() {
        warn!("FRED_API_KEY not set; /api/fred will fail for uncached requests");
    }
    let market = MarketService::new(Arc::clone(&cache), fred_key)
        .with_context(|| "Failed to configure market proxies")?;

    Ok(AppState::new(Arc::new(insights), Arc::new(market), cache))
}

pub(crate) async fn cmd_serve(
    config: Config,
    bind: Option<String>,
    port: Option<u16>,
    static_dir: Option<PathBuf>,
) -> Result<()> {
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .with_context(|| format!("Invalid bind address {bind}:{port}"))?;

    let static_dir = static_dir.or_else(|| config.server.static_dir.clone());
    if let Some(dir) = &static_dir {
        if dir.is_dir() {
            println!("Serving dashboard from {}", dir.display());
        } else {
            anyhow::bail!("Static directory {} does not exist", dir.display());
        }
    }

    let state = build_state(&config)?;

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, shutting down");
        }
        on_signal.cancel();
    });

    println!("Dashboard API: http://{addr}");
    println!("Press Ctrl+C to stop.");

    start_server(addr, state, static_dir, shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("Dashboard server error: {e}"))?;
    Ok(())
}
