//! In-flight request deduplication.
//!
//! Concurrent callers asking for the same key share one upstream call and one
//! outcome. The computation runs as its own task, so it completes and cleans
//! up its registry entry even if every HTTP caller disconnects meanwhile.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use crate::error::{MacroError, Result};

type SharedResult<T> = Shared<BoxFuture<'static, Result<T>>>;
type Registry<T> = Arc<Mutex<HashMap<String, SharedResult<T>>>>;

/// Registry of pending computations keyed by request identity.
pub struct InFlight<T> {
    pending: Registry<T>,
}

impl<T> InFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `compute` unless an identical request is already pending, in which
    /// case wait for that one instead.
    pub async fn dedupe<F>(&self, key: &str, compute: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        self.dedupe_or(key, || None, compute).await
    }

    /// Like [`dedupe`](Self::dedupe), but `settled` is consulted under the
    /// registry lock before a new computation is started. A computation that
    /// publishes its result somewhere `settled` can see, before it settles,
    /// then never races a caller that missed that result a moment earlier.
    ///
    /// Registration happens under the registry lock before anything is
    /// awaited. The entry is removed when the computation settles, whether it
    /// succeeded, failed or panicked.
    pub async fn dedupe_or<S, F>(&self, key: &str, settled: S, compute: F) -> Result<T>
    where
        S: FnOnce() -> Option<T>,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let shared = {
            let mut pending = lock(&self.pending);
            if let Some(existing) = pending.get(key) {
                debug!(key, "Joining in-flight request");
                existing.clone()
            } else if let Some(value) = settled() {
                debug!(key, "Settled while waiting for the registry");
                return Ok(value);
            } else {
                // The spawned task cannot take the registry lock until we
                // release it, so removal always follows insertion.
                let unregister = Unregister {
                    registry: Arc::clone(&self.pending),
                    key: key.to_string(),
                };
                let task = tokio::spawn(async move {
                    let _unregister = unregister;
                    compute.await
                });
                let shared = async move {
                    task.await.unwrap_or_else(|e| {
                        Err(MacroError::Upstream(format!("request task aborted: {e}")))
                    })
                }
                .boxed()
                .shared();
                pending.insert(key.to_string(), shared.clone());
                shared
            }
        };
        shared.await
    }

    /// Number of computations still pending.
    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl<T> Default for InFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Drops the registry entry for `key`, on unwind as well as on return.
struct Unregister<T> {
    registry: Registry<T>,
    key: String,
}

impl<T> Drop for Unregister<T> {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

fn lock<T>(
    registry: &Mutex<HashMap<String, SharedResult<T>>>,
) -> MutexGuard<'_, HashMap<String, SharedResult<T>>> {
    registry.lock().expect("in-flight registry lock poisoned")
}
