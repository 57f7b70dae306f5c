//! `macrodesk sync`: headless dashboard client.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use macrodesk::client::{
    HttpInsightSource, InsightEvent, InsightOrchestrator, KvStore, MarketClient, MarketSnapshot,
    PodcastCache, RoundOutcome, Scheduler,
};
use macrodesk::clock::SystemClock;
use macrodesk::config::Config;

pub(crate) async fn cmd_sync(config: Config, server: Option<String>, once: bool) -> Result<()> {
    let server_url = server.unwrap_or_else(|| config.client.server_url.clone());
    let timeout = config.client.request_timeout();

    let store_path = config.client.store_path();
    let store = KvStore::new(store_path.clone());
    if let Err(e) = store.load().await {
        warn!(path = %store_path.display(), error = %e, "Local store unreadable, starting empty");
    }
    let store = Arc::new(store);
    let clock = Arc::new(SystemClock);

    let source = HttpInsightSource::new(&server_url, timeout)
        .with_context(|| format!("Invalid server URL {server_url}"))?;
    let orchestrator = InsightOrchestrator::new(
        Arc::new(source),
        store.clone(),
        clock.clone(),
        config.client.insights_version.clone(),
    );
    let podcast = Arc::new(PodcastCache::new(&server_url, store.clone(), clock)?);
    let market = Arc::new(MarketClient::new(
        &server_url,
        config.client.fred_series.clone(),
        timeout,
    )?);

    let printer = tokio::spawn(print_events(orchestrator.subscribe()));
    println!("Syncing insights from {server_url}");

    if once {
        let outcome = orchestrator.start().await;
        if let RoundOutcome::Settled(report) = &outcome {
            println!(
                "Round settled: {} merged, {} abandoned",
                report.merged.len(),
                report.abandoned.len()
            );
        }
        match podcast.prefetch().await {
            Some(lines) => println!("Podcast: {} lines", lines.len()),
            None => println!("Podcast: unavailable"),
        }
        refresh_market(&market).await;
        orchestrator.shutdown();
        printer.abort();
        return Ok(());
    }

    let scheduler = Scheduler::new();
    {
        let o = orchestrator.clone();
        scheduler.spawn("initial-round", async move {
            o.start().await;
        });
    }
    {
        let podcast = Arc::clone(&podcast);
        scheduler.spawn("podcast-prefetch", async move {
            if let Some(lines) = podcast.prefetch().await {
                info!(lines = lines.len(), "Podcast script ready");
            }
        });
    }
    {
        let m = Arc::clone(&market);
        scheduler.spawn("initial-market", async move {
            refresh_market(&m).await;
        });
    }
    {
        let o = orchestrator.clone();
        let m = Arc::clone(&market);
        scheduler.every(
            "rollover-check",
            Duration::from_secs(config.client.rollover_check_secs),
            move || {
                let o = o.clone();
                let m = Arc::clone(&m);
                async move {
                    if o.check_rollover().await {
                        refresh_market(&m).await;
                    }
                }
            },
        );
    }
    {
        let m = Arc::clone(&market);
        scheduler.every(
            "market-refresh",
            Duration::from_secs(config.client.market_refresh_secs),
            move || {
                let m = Arc::clone(&m);
                async move { refresh_market(&m).await }
            },
        );
    }

    println!("Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .with_context(|| "Failed to listen for Ctrl+C")?;
    info!("Ctrl+C received, stopping sync");

    orchestrator.shutdown();
    scheduler.shutdown().await;
    printer.abort();
    Ok(())
}

async fn refresh_market(market: &MarketClient) {
    match market.refresh().await {
        Ok(snapshot) => print_market(&snapshot),
        Err(e) => warn!(error = %e, "Market refresh failed"),
    }
}

fn print_market(snapshot: &MarketSnapshot) {
    let gold = &snapshot.prices.gold;
    if gold.error {
        println!("Gold: unavailable");
    } else {
        println!("Gold: {:.2} {} ({:+.2}%)", gold.price, gold.currency, gold.change_pct);
    }
    for (series, latest) in &snapshot.series {
        match latest {
            Some(obs) => println!("{series}: {} ({})", obs.value, obs.date),
            None => println!("{series}: unavailable"),
        }
    }
}

/// One JSON line per state change.
async fn print_events(mut rx: tokio::sync::broadcast::Receiver<InsightEvent>) {
    loop {
        match rx.recv().await {
            Ok(InsightEvent::SectionFailed { .. }) => {}
            Ok(event) => {
                if let Ok(line) = serde_json::to_string(&event) {
                    println!("{line}");
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event printer lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
