//! Server-side caching: per-call TTL memoization and in-flight request dedup.

pub mod inflight;
pub mod ttl;

pub use inflight::InFlight;
pub use ttl::{CacheStats, TtlCache};
