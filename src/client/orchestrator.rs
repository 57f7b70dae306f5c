//! Insight fetch orchestration for the dashboard client.
//!
//! One fetch round hydrates today's persisted state, requests every section
//! in parallel, merges each arrival as it lands, retries the failures in up
//! to three slower sequential passes, then persists whatever it has. A round
//! that merges nothing schedules a whole-round retry with exponential
//! backoff; after five of those the orchestrator gives up until
//! [`InsightOrchestrator::retry`] is called.
//!
//! Only one round runs at a time. The in-progress flag is released by a drop
//! guard, so it is cleared on every exit path. A day rollover that finds a
//! round running discards that round's late results and queues a fresh round
//! for when the flag is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::clock::{iso_date, Clock};
use crate::error::{MacroError, Result};
use crate::insights::{MergedInsights, Section};

use super::events::{EventBus, InsightEvent, SyncStatus};
use super::storage::KeyValueStore;

/// Sequential retry passes after the parallel wave.
pub const MAX_RETRY_PASSES: u32 = 3;
/// Whole-round retries after empty rounds before giving up.
pub const MAX_ROUND_RETRIES: u32 = 5;
/// Pause between sections inside a retry pass.
pub const SECTION_RETRY_GAP: Duration = Duration::from_millis(1000);
/// Default timeout for one section request. A cold section waits behind the
/// server's generation queue before its own generation call starts.
pub const DEFAULT_SECTION_TIMEOUT: Duration = Duration::from_secs(300);
/// Prefix shared by every persisted insight bundle.
pub const STORAGE_PREFIX: &str = "insights_";

const EVENT_CAPACITY: usize = 1024;
const ROUND_RETRY_BASE_MS: u64 = 5000;
const ROUND_RETRY_CAP_MS: u64 = 60_000;
const SECTION_RETRY_BASE_MS: u64 = 2000;

/// Delay before whole-round retry number `attempt` (1-based):
/// `min(5000 * 2^(attempt-1), 60000)` ms.
pub fn round_retry_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let ms = ROUND_RETRY_BASE_MS
        .saturating_mul(1u64 << exponent)
        .min(ROUND_RETRY_CAP_MS);
    Duration::from_millis(ms)
}

/// Delay before retry pass `pass_index` (0-based): `2000 * (pass_index + 1)` ms.
pub fn section_retry_delay(pass_index: u32) -> Duration {
    Duration::from_millis(SECTION_RETRY_BASE_MS * (u64::from(pass_index) + 1))
}

fn section_index(section: Section) -> usize {
    Section::ALL
        .iter()
        .position(|s| *s == section)
        .unwrap_or(usize::MAX)
}

/// Persisted key for the merged bundle of `version` on `date`.
pub fn storage_key(version: &str, date: NaiveDate) -> String {
    format!("{STORAGE_PREFIX}{version}_{}", iso_date(date))
}

// ── Section source ───────────────────────────────────────────────────────────

/// Where section payloads come from.
#[async_trait]
pub trait InsightSource: Send + Sync {
    async fn fetch(&self, section: Section) -> Result<Map<String, Value>>;
}

/// Fetches sections from the dashboard server's `/api/insights`.
pub struct HttpInsightSource {
    client: Client,
    endpoint: Url,
}

impl HttpInsightSource {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(server_url)
            .map_err(|e| MacroError::Config(format!("invalid server URL {server_url:?}: {e}")))?;
        let endpoint = base
            .join("/api/insights")
            .map_err(|e| MacroError::Config(format!("invalid server URL {server_url:?}: {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MacroError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, endpoint })
    }

    fn section_url(&self, section: Section) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("s", section.as_str());
        url
    }
}

/// Client errors other than 429 mean the server will never serve the section.
fn rejected(status: StatusCode) -> bool {
    status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS
}

/// A response counts only when it is 2xx and a JSON object without `error`.
/// A rejected request is [`MacroError::UnknownSection`], which is not retried.
pub fn section_payload(status: StatusCode, body: Value) -> Result<Map<String, Value>> {
    if rejected(status) {
        let detail = body
            .get("detail")
            .or_else(|| body.get("error"))
            .and_then(Value::as_str)
            .unwrap_or("request rejected");
        return Err(MacroError::UnknownSection(format!("HTTP {status}: {detail}")));
    }
    let Value::Object(map) = body else {
        return Err(MacroError::MalformedResponse(
            "section response is not a JSON object".to_string(),
        ));
    };
    if let Some(error) = map.get("error") {
        let detail = map.get("detail").and_then(Value::as_str).unwrap_or("");
        let error = error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string());
        return Err(MacroError::Upstream(if detail.is_empty() {
            error
        } else {
            format!("{error}: {detail}")
        }));
    }
    if !status.is_success() {
        return Err(MacroError::Upstream(format!("HTTP {status}")));
    }
    Ok(map)
}

#[async_trait]
impl InsightSource for HttpInsightSource {
    async fn fetch(&self, section: Section) -> Result<Map<String, Value>> {
        let response = self.client.get(self.section_url(section)).send().await?;
        let status = response.status();
        let body = match response.json::<Value>().await {
            Ok(body) => body,
            Err(_) if rejected(status) => Value::Null,
            Err(e) => {
                return Err(MacroError::MalformedResponse(format!(
                    "HTTP {status}: invalid JSON body: {e}"
                )))
            }
        };
        section_payload(status, body)
    }
}

// ── Round results ────────────────────────────────────────────────────────────

/// What a completed round did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    /// Sections merged this round, in arrival order.
    pub merged: Vec<Section>,
    /// Sections still failing after every retry pass, or rejected outright.
    pub abandoned: Vec<Section>,
    /// Attempts made per section.
    pub attempts: HashMap<Section, u32>,
    /// Delay of the whole-round retry scheduled by an empty round.
    pub next_retry: Option<Duration>,
    /// The calendar day changed while the round ran. Nothing it fetched after
    /// that was kept, and nothing was persisted.
    pub superseded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Another round holds the in-progress flag.
    AlreadyRunning,
    Settled(RoundReport),
}

// ── Orchestrator ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct Session {
    merged: Option<MergedInsights>,
    loaded_date: Option<NaiveDate>,
    empty_rounds: u32,
    failed: bool,
    pending_retry: Option<CancellationToken>,
    status: Option<SyncStatus>,
    /// Bumped on every day reset; rounds only merge into their own epoch.
    epoch: u64,
    /// A rollover happened while a round held the in-progress flag.
    rollover_pending: bool,
}

impl Session {
    fn reset_for(&mut self, today: NaiveDate) {
        self.merged = None;
        self.empty_rounds = 0;
        self.failed = false;
        self.loaded_date = Some(today);
        self.epoch += 1;
    }
}

struct Inner {
    source: Arc<dyn InsightSource>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    version: String,
    events: EventBus,
    in_progress: AtomicBool,
    session: Mutex<Session>,
    shutdown: CancellationToken,
}

/// Client-side owner of the merged insight state. Cheap to clone; clones
/// share one session.
#[derive(Clone)]
pub struct InsightOrchestrator {
    inner: Arc<Inner>,
}

struct InProgressGuard<'a>(&'a AtomicBool);

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl InsightOrchestrator {
    pub fn new(
        source: Arc<dyn InsightSource>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                store,
                clock,
                version: version.into(),
                events: EventBus::new(EVENT_CAPACITY),
                in_progress: AtomicBool::new(false),
                session: Mutex::new(Session::default()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InsightEvent> {
        self.inner.events.subscribe()
    }

    /// Current merged state, if anything has been hydrated or fetched.
    pub fn snapshot(&self) -> Option<MergedInsights> {
        self.session().merged.clone()
    }

    pub fn status(&self) -> SyncStatus {
        Self::derive_status(&self.session())
    }

    pub fn is_running(&self) -> bool {
        self.inner.in_progress.load(Ordering::SeqCst)
    }

    /// Whether a whole-round retry is waiting to fire.
    pub fn retry_pending(&self) -> bool {
        self.session()
            .pending_retry
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }

    /// Run one fetch round, unless one is already running.
    pub async fn start(&self) -> RoundOutcome {
        let outcome = self.run_exclusive().await;
        // The in-progress flag is released by now, so a rollover that comes
        // after this check starts its own round.
        if matches!(outcome, RoundOutcome::Settled(_))
            && std::mem::take(&mut self.session().rollover_pending)
        {
            info!("Calendar day changed during the round, starting a fresh one");
            tokio::spawn(self.start_boxed());
        }
        outcome
    }

    async fn run_exclusive(&self) -> RoundOutcome {
        if self.inner.in_progress.swap(true, Ordering::SeqCst) {
            debug!("Fetch round already in progress");
            return RoundOutcome::AlreadyRunning;
        }
        let _guard = InProgressGuard(&self.inner.in_progress);
        self.cancel_pending_retry();

        let today = self.inner.clock.today();
        let key = storage_key(&self.inner.version, today);
        let epoch = {
            let mut session = self.session();
            session.rollover_pending = false;
            // A round that starts on a new day without a rollover check
            // still starts clean.
            if session.loaded_date.is_some_and(|date| date != today) {
                session.reset_for(today);
            } else {
                session.loaded_date = Some(today);
            }
            session.epoch
        };
        info!(date = %today, "Starting insight fetch round");

        self.hydrate(&key, epoch).await;
        self.purge_stale(&key).await;
        self.publish_status();

        let mut report = self.run_round(epoch).await;
        self.settle(&key, epoch, &mut report).await;

        self.inner.events.send(InsightEvent::RoundSettled {
            merged: report.merged.len(),
            failed: report.abandoned.len(),
        });
        self.publish_status();
        info!(
            merged = report.merged.len(),
            abandoned = report.abandoned.len(),
            superseded = report.superseded,
            "Insight fetch round settled"
        );
        RoundOutcome::Settled(report)
    }

    /// User-initiated retry: cancel any scheduled retry, clear the failure
    /// counters and run a round now.
    pub async fn retry(&self) -> RoundOutcome {
        self.cancel_pending_retry();
        {
            let mut session = self.session();
            session.empty_rounds = 0;
            session.failed = false;
        }
        self.publish_status();
        self.start().await
    }

    /// Start over when the calendar day changed since the last round.
    /// Returns `true` when a rollover happened.
    pub async fn check_rollover(&self) -> bool {
        let today = self.inner.clock.today();
        let previous = {
            let mut session = self.session();
            let loaded = session.loaded_date;
            match loaded {
                Some(date) if date != today => {
                    session.reset_for(today);
                    session.rollover_pending = true;
                    date
                }
                Some(_) => return false,
                None => {
                    session.loaded_date = Some(today);
                    return false;
                }
            }
        };

        info!(from = %previous, to = %today, "Calendar day changed, resetting insights");
        self.cancel_pending_retry();
        self.inner.events.send(InsightEvent::RolledOver {
            from: iso_date(previous),
            to: iso_date(today),
        });
        self.publish_status();
        if self.start().await == RoundOutcome::AlreadyRunning {
            debug!("Round in progress, fresh round queued behind it");
        }
        true
    }

    /// Cancel scheduled retries; rounds in progress finish normally.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.inner
            .session
            .lock()
            .expect("orchestrator session lock poisoned")
    }

    fn derive_status(session: &Session) -> SyncStatus {
        if session.merged.as_ref().is_some_and(|m| !m.is_empty()) {
            SyncStatus::Live
        } else if session.failed {
            SyncStatus::Failed
        } else {
            SyncStatus::Loading
        }
    }

    fn publish_status(&self) {
        let changed = {
            let mut session = self.session();
            let status = Self::derive_status(&session);
            if session.status == Some(status) {
                None
            } else {
                session.status = Some(status);
                Some(status)
            }
        };
        if let Some(status) = changed {
            self.inner.events.send(InsightEvent::StatusChanged { status });
        }
    }

    async fn hydrate(&self, key: &str, epoch: u64) {
        let raw = match self.inner.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                debug!(key, error = %e, "Persisted insights unreadable");
                return;
            }
        };
        match serde_json::from_str::<MergedInsights>(&raw) {
            Ok(persisted) => {
                let sections = persisted.content_keys();
                {
                    let mut session = self.session();
                    if session.epoch != epoch {
                        return;
                    }
                    session.merged = Some(persisted);
                }
                debug!(key, sections, "Hydrated insights from local store");
                self.inner.events.send(InsightEvent::Hydrated { sections });
            }
            Err(e) => warn!(key, error = %e, "Ignoring corrupt persisted insights"),
        }
    }

    async fn purge_stale(&self, keep: &str) {
        let keys = match self.inner.store.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                debug!(error = %e, "Could not list local store keys");
                return;
            }
        };
        for key in keys
            .iter()
            .filter(|k| k.starts_with(STORAGE_PREFIX) && k.as_str() != keep)
        {
            match self.inner.store.remove(key).await {
                Ok(()) => debug!(key = %key, "Purged stale insights"),
                Err(e) => debug!(key = %key, error = %e, "Failed to purge stale insights"),
            }
        }
    }

    /// Parallel wave, then sequential retry passes over the retryable
    /// failures. Retrying stops once the calendar day has moved on.
    async fn run_round(&self, epoch: u64) -> RoundReport {
        let mut report = RoundReport::default();

        let mut wave: FuturesUnordered<_> = Section::ALL
            .into_iter()
            .map(|section| {
                let source = Arc::clone(&self.inner.source);
                async move { (section, source.fetch(section).await) }
            })
            .collect();

        let mut failed = Vec::new();
        while let Some((section, result)) = wave.next().await {
            self.record(epoch, section, result, &mut report, &mut failed);
        }
        // Keep retries in the fixed section order.
        failed.sort_by_key(|s| section_index(*s));

        for pass in 0..MAX_RETRY_PASSES {
            if failed.is_empty() {
                break;
            }
            let delay = section_retry_delay(pass);
            debug!(pass, ?delay, remaining = failed.len(), "Retry pass scheduled");
            tokio::time::sleep(delay).await;
            if !self.is_current(epoch) {
                debug!("Calendar day changed, dropping remaining retries");
                break;
            }

            let to_retry = std::mem::take(&mut failed);
            for (i, section) in to_retry.into_iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(SECTION_RETRY_GAP).await;
                }
                let result = self.inner.source.fetch(section).await;
                self.record(epoch, section, result, &mut report, &mut failed);
            }
        }

        report.abandoned.extend(failed);
        report.abandoned.sort_by_key(|s| section_index(*s));
        report.superseded = !self.is_current(epoch);
        report
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.session().epoch == epoch
    }

    /// Merge a success, or queue a retryable failure on `retry`. Failures
    /// that can never succeed go straight to `report.abandoned`.
    fn record(
        &self,
        epoch: u64,
        section: Section,
        result: Result<Map<String, Value>>,
        report: &mut RoundReport,
        retry: &mut Vec<Section>,
    ) {
        let attempt = {
            let count = report.attempts.entry(section).or_insert(0);
            *count += 1;
            *count
        };
        match result {
            Ok(payload) => {
                {
                    let mut session = self.session();
                    if session.epoch != epoch {
                        debug!(section = %section, "Dropping section fetched for a previous day");
                        return;
                    }
                    session
                        .merged
                        .get_or_insert_with(MergedInsights::new)
                        .merge_section(section.as_str(), payload);
                }
                report.merged.push(section);
                debug!(section = %section, attempt, "Section merged");
                self.inner
                    .events
                    .send(InsightEvent::SectionMerged { section, attempt });
                self.publish_status();
            }
            Err(e) => {
                warn!(section = %section, attempt, error = %e, "Section fetch failed");
                self.inner.events.send(InsightEvent::SectionFailed {
                    section,
                    attempt,
                    error: e.to_string(),
                });
                if e.is_retryable() {
                    retry.push(section);
                } else {
                    report.abandoned.push(section);
                }
            }
        }
    }

    async fn settle(&self, key: &str, epoch: u64, report: &mut RoundReport) {
        if report.superseded {
            debug!(key, "Round outlived its day, nothing persisted");
            return;
        }
        if !report.merged.is_empty() {
            {
                let mut session = self.session();
                session.empty_rounds = 0;
                session.failed = false;
            }
            self.persist(key, epoch).await;
            return;
        }

        let attempt = {
            let mut session = self.session();
            if session.empty_rounds >= MAX_ROUND_RETRIES {
                session.failed = true;
                None
            } else {
                session.empty_rounds += 1;
                Some(session.empty_rounds)
            }
        };
        match attempt {
            Some(attempt) => {
                let delay = round_retry_delay(attempt);
                warn!(attempt, ?delay, "No sections loaded, retrying round");
                self.schedule_retry(delay);
                self.inner.events.send(InsightEvent::RetryScheduled {
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                });
                report.next_retry = Some(delay);
            }
            None => warn!(
                retries = MAX_ROUND_RETRIES,
                "No sections loaded after every retry, giving up until a manual retry"
            ),
        }
    }

    async fn persist(&self, key: &str, epoch: u64) {
        let merged = {
            let session = self.session();
            if session.epoch != epoch {
                return;
            }
            session.merged.clone()
        };
        let Some(merged) = merged else {
            return;
        };
        let data = match serde_json::to_string(&merged) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Failed to serialize merged insights");
                return;
            }
        };
        match self.inner.store.set(key, data).await {
            Ok(()) => debug!(key, "Persisted merged insights"),
            Err(e) => warn!(key, error = %e, "Failed to persist merged insights"),
        }
    }

    fn schedule_retry(&self, delay: Duration) {
        let token = self.inner.shutdown.child_token();
        if let Some(previous) = self.session().pending_retry.replace(token.clone()) {
            previous.cancel();
        }
        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!("Scheduled round retry cancelled"),
                _ = tokio::time::sleep(delay) => {
                    this.start_boxed().await;
                }
            }
        });
    }

    /// `start` behind a nameable future type so a scheduled retry can call it
    /// from inside `start` itself.
    fn start_boxed(&self) -> BoxFuture<'static, RoundOutcome> {
        let this = self.clone();
        Box::pin(async move { this.start().await })
    }

    fn cancel_pending_retry(&self) {
        if let Some(token) = self.session().pending_retry.take() {
            token.cancel();
        }
    }
}
