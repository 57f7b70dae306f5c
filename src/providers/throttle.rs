//! Server-wide admission control for outbound generation calls.
//!
//! [`ThrottledProvider`] wraps another provider and limits how many calls may
//! be in flight at once. When a call finishes, its slot stays reserved for a
//! cool-down period before the next queued call may take it, which keeps
//! bursts under the provider's rate limit. Waiters are admitted FIFO.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{MacroError, Result};

use super::{Generation, GenerationRequest, GenerativeProvider};

/// Default number of concurrent generation calls.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Default cool-down before a released slot can be reused.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(4000);

/// A decorator [`GenerativeProvider`] that queues calls behind a shared
/// concurrency limit and cool-down.
pub struct ThrottledProvider {
    inner: Arc<dyn GenerativeProvider>,
    slots: Arc<Semaphore>,
    concurrency: usize,
    min_delay: Duration,
}

impl ThrottledProvider {
    /// Create a throttle around `inner`. `concurrency` is clamped to at least 1.
    pub fn new(inner: Arc<dyn GenerativeProvider>, concurrency: usize, min_delay: Duration) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            inner,
            slots: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            min_delay,
        }
    }

    /// Slots free right now (not counting queued waiters).
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

impl std::fmt::Debug for ThrottledProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottledProvider")
            .field("provider", &self.inner.name())
            .field("concurrency", &self.concurrency)
            .field("min_delay", &self.min_delay)
            .finish()
    }
}

#[async_trait]
impl GenerativeProvider for ThrottledProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, request: GenerationRequest) -> Result<Generation> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| MacroError::Upstream("generation queue closed".to_string()))?;

        let result = self.inner.generate(request).await;

        // Hold the slot through the cool-down without delaying this caller.
        let min_delay = self.min_delay;
        if min_delay.is_zero() {
            drop(slot);
        } else {
            tokio::spawn(async move {
                tokio::time::sleep(min_delay).await;
                drop(slot);
            });
        }
        debug!(provider = %self.inner.name(), ok = result.is_ok(), "Generation call settled");
        result
    }
}
