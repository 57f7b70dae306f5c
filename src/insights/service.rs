//! Server-side insight lookups: day-scoped cache first, then a single shared
//! generation per key.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::cache::{InFlight, TtlCache};
use crate::clock::{iso_date, Clock};
use crate::error::Result;

use super::{Section, SectionGenerator};

/// Lifetime of a generated section or podcast script.
pub const INSIGHT_TTL: Duration = Duration::from_secs(6 * 60 * 60);

pub struct InsightService {
    generator: SectionGenerator,
    cache: Arc<TtlCache<Value>>,
    inflight: InFlight<Value>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl InsightService {
    pub fn new(generator: SectionGenerator, cache: Arc<TtlCache<Value>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            generator,
            cache,
            inflight: InFlight::new(),
            clock,
            ttl: INSIGHT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Cache key for a section on a given day.
    pub fn section_cache_key(section: Section, date: chrono::NaiveDate) -> String {
        format!("insights_{}_{}", section, iso_date(date))
    }

    /// Today's payload for the section named `key`.
    ///
    /// Unknown keys fail before touching the cache or the provider. Concurrent
    /// misses for the same key share one generation call and one outcome.
    pub async fn section(&self, key: &str) -> Result<Value> {
        let section: Section = key.parse()?;
        let date = self.clock.today();
        let cache_key = Self::section_cache_key(section, date);

        let generator = self.generator.clone();
        self.cached(&cache_key, async move {
            info!(section = %section, provider = generator.provider_name(), "Generating section");
            let value = generator.generate(section, date).await;
            match &value {
                Ok(_) => info!(section = %section, "Section generated"),
                Err(e) => warn!(section = %section, error = %e, "Section generation failed"),
            }
            value
        })
        .await
    }

    /// Today's podcast script.
    pub async fn podcast(&self) -> Result<Value> {
        let date = self.clock.today();
        let cache_key = format!("podcast_{}", iso_date(date));

        let generator = self.generator.clone();
        self.cached(&cache_key, async move {
            info!("Generating podcast script");
            let value = generator.generate_podcast(date).await;
            if let Err(e) = &value {
                warn!(error = %e, "Podcast generation failed");
            }
            value
        })
        .await
    }

    /// Generations currently pending.
    pub fn in_flight(&self) -> usize {
        self.inflight.pending()
    }

    /// Cache hit, or join/start the shared computation. The result is stored
    /// inside the shared computation so the key is always covered by either
    /// the cache or the in-flight registry. The cache is checked again under
    /// the registry lock, after a generation may have finished in between.
    async fn cached<F>(&self, cache_key: &str, compute: F) -> Result<Value>
    where
        F: Future<Output = Result<Value>> + Send + 'static,
    {
        if let Some(hit) = self.cache.get(cache_key, self.ttl) {
            return Ok(hit);
        }

        let cache = Arc::clone(&self.cache);
        let owned_key = cache_key.to_string();
        self.inflight
            .dedupe_or(
                cache_key,
                || self.cache.get(cache_key, self.ttl),
                async move {
                    let value = compute.await?;
                    cache.insert(owned_key, value.clone());
                    Ok(value)
                },
            )
            .await
    }
}
