//! macrodesk: an economic dashboard backend and its headless client.
//!
//! The server side caches and deduplicates grounded LLM briefings per
//! dashboard section and proxies FRED and Yahoo Finance. The client side
//! keeps a day-scoped merged view of those briefings in sync, with retries
//! and local persistence.

pub mod api;
pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod insights;
pub mod market;
pub mod providers;

pub use config::Config;
pub use error::{MacroError, Result};
