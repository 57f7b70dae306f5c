//! Process-wide TTL cache with a get-or-compute contract.
//!
//! Every lookup carries its own TTL, so one store can hold live prices
//! (minutes) next to daily insight sections (hours). Entries are only replaced
//! by a later successful compute; failures are never cached. The key space is
//! bounded by the fixed set of upstream endpoints, so there is no eviction.
//!
//! Timestamps come from `tokio::time::Instant`, which lets tests drive expiry
//! with a paused clock.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::Result;

/// A single cached value.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    /// When the value was stored.
    stored_at: Instant,
    /// Number of lookups served from this entry.
    hit_count: u32,
}

/// Key → (value, timestamp) map shared by every proxy endpoint.
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a value. Returns `None` if the key is absent or older than `ttl`.
    ///
    /// Expired entries stay in place until the next successful compute
    /// overwrites them.
    pub fn get(&self, key: &str, ttl: Duration) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.lock();
        let entry = entries.get_mut(key)?;
        if now.saturating_duration_since(entry.stored_at) >= ttl {
            debug!(key, "Cache entry expired");
            return None;
        }
        entry.hit_count = entry.hit_count.saturating_add(1);
        Some(entry.value.clone())
    }

    /// Store a value stamped with the current time, replacing any previous one.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.lock().insert(
            key.into(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                hit_count: 0,
            },
        );
    }

    /// Return the cached value for `key`, or run `compute` and cache its result.
    ///
    /// `compute` is not invoked on a hit. On failure the cache is left
    /// untouched and the error is returned to the caller.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(value) = self.get(key, ttl) {
            debug!(key, "Cache hit");
            return Ok(value);
        }
        let value = compute().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    /// Return aggregate statistics about the cache.
    pub fn stats(&self) -> CacheStats {
        let entries = self.lock();
        CacheStats {
            total_entries: entries.len(),
            total_hits: entries.values().map(|e| u64::from(e.hit_count)).sum(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().expect("ttl cache lock poisoned")
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries currently in the cache.
    pub total_entries: usize,
    /// Cumulative number of cache hits across all entries.
    pub total_hits: u64,
}
