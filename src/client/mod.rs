//! Headless dashboard client.
//!
//! Keeps the day-scoped merged insight state in sync with the server,
//! persists it locally, and publishes state changes to whatever renders it.

pub mod events;
pub mod market;
pub mod orchestrator;
pub mod podcast;
pub mod scheduler;
pub mod storage;

pub use events::{EventBus, InsightEvent, SyncStatus};
pub use market::{MarketClient, MarketSnapshot};
pub use orchestrator::{HttpInsightSource, InsightOrchestrator, InsightSource, RoundOutcome};
pub use podcast::PodcastCache;
pub use scheduler::Scheduler;
pub use storage::{KeyValueStore, KvStore};
