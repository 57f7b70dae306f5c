//! Cancellable periodic tasks for the dashboard client.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// Owns every periodic task spawned for a session.
pub struct Scheduler {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Run `tick` every `interval`, first after one full interval, until
    /// [`shutdown`](Self::shutdown). A tick in progress at shutdown is
    /// dropped.
    pub fn every<F, Fut>(&self, name: &'static str, interval: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        self.tracker.spawn(async move {
            debug!(task = name, ?interval, "Scheduled task registered");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick() => {}
                }
            }
            info!(task = name, "Scheduled task stopped");
        });
    }

    /// Run `task` once, now. Dropped if still running at shutdown.
    pub fn spawn<Fut>(&self, name: &'static str, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!(task = name, "One-shot task cancelled"),
                _ = task => debug!(task = name, "One-shot task finished"),
            }
        });
    }

    /// Number of tasks still running.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Cancel every task and wait for them to exit.
    pub async fn shutdown(&self) {
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
