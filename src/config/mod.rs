//! Configuration for the dashboard server and client.
//!
//! Loaded from `~/.macrodesk/config.json` (missing file means defaults), then
//! overridden from the environment. Every section is `#[serde(default)]`, so
//! partial files are fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::client::market::DEFAULT_SERIES;
use crate::client::orchestrator::DEFAULT_SECTION_TIMEOUT;
use crate::error::{MacroError, Result};
use crate::insights::service::INSIGHT_TTL;
use crate::providers::gemini::{DEFAULT_GEMINI_MODEL, DEFAULT_GENERATION_TIMEOUT};
use crate::providers::throttle::{DEFAULT_CONCURRENCY, DEFAULT_MIN_DELAY};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub gemini: GeminiConfig,
    pub fred: FredConfig,
    pub cache: CacheConfig,
    pub client: ClientConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Directory served for unmatched paths (the dashboard frontend).
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3000,
            static_dir: None,
        }
    }
}

/// Generative provider settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    /// Outbound generation calls allowed at once.
    pub concurrency: usize,
    /// Cool-down before a released slot is reused.
    pub min_delay_ms: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            timeout_secs: DEFAULT_GENERATION_TIMEOUT.as_secs(),
            concurrency: DEFAULT_CONCURRENCY,
            min_delay_ms: DEFAULT_MIN_DELAY.as_millis() as u64,
        }
    }
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("min_delay_ms", &self.min_delay_ms)
            .finish()
    }
}

impl GeminiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }
}

/// FRED proxy settings.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FredConfig {
    pub api_key: Option<String>,
}

impl std::fmt::Debug for FredConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FredConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Server-side cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for generated sections and the podcast script.
    pub insight_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            insight_ttl_secs: INSIGHT_TTL.as_secs(),
        }
    }
}

impl CacheConfig {
    pub fn insight_ttl(&self) -> Duration {
        Duration::from_secs(self.insight_ttl_secs)
    }
}

/// Headless client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    /// Bumped to invalidate every persisted insight bundle.
    pub insights_version: String,
    /// Local store file; defaults to `~/.macrodesk/client-store.json`.
    pub store_path: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub rollover_check_secs: u64,
    pub market_refresh_secs: u64,
    pub fred_series: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3000".to_string(),
            insights_version: "v9".to_string(),
            store_path: None,
            request_timeout_secs: DEFAULT_SECTION_TIMEOUT.as_secs(),
            rollover_check_secs: 60,
            market_refresh_secs: 60 * 60,
            fred_series: DEFAULT_SERIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ClientConfig {
    pub fn store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| Config::dir().join("client-store.json"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// `~/.macrodesk`, or `./.macrodesk` without a home directory.
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".macrodesk")
    }

    /// Default config file location.
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load from the default path, then apply environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_with_path(&Self::path())
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_path(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_path(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse the file at `path` only. A missing file yields defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| MacroError::Config(format!("invalid config {}: {e}", path.display())))
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    fn apply_overrides_from(&mut self, var: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(bind) = var("MACRODESK_BIND") {
            self.server.bind = bind;
        }
        if let Some(port) = var("MACRODESK_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => debug!(value = %port, "Ignoring invalid MACRODESK_PORT"),
            }
        }
        if let Some(dir) = var("MACRODESK_STATIC_DIR") {
            self.server.static_dir = Some(PathBuf::from(dir));
        }
        if let Some(key) = var("GEMINI_API_KEY").or_else(|| var("GOOGLE_API_KEY")) {
            self.gemini.api_key = Some(key);
        }
        if let Some(model) = var("MACRODESK_GEMINI_MODEL") {
            self.gemini.model = model;
        }
        if let Some(key) = var("FRED_API_KEY") {
            self.fred.api_key = Some(key);
        }
        if let Some(url) = var("MACRODESK_SERVER_URL") {
            self.client.server_url = url;
        }
        if let Some(version) = var("MACRODESK_INSIGHTS_VERSION") {
            self.client.insights_version = version;
        }
    }

    /// Reject settings that would leave the server or client unusable.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(MacroError::Config("server.port must be non-zero".into()));
        }
        if self.gemini.concurrency == 0 {
            return Err(MacroError::Config(
                "gemini.concurrency must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("gemini.timeout_secs", self.gemini.timeout_secs),
            ("cache.insight_ttl_secs", self.cache.insight_ttl_secs),
            ("client.request_timeout_secs", self.client.request_timeout_secs),
            ("client.rollover_check_secs", self.client.rollover_check_secs),
            ("client.market_refresh_secs", self.client.market_refresh_secs),
        ] {
            if value == 0 {
                return Err(MacroError::Config(format!("{name} must be non-zero")));
            }
        }
        if self.client.insights_version.trim().is_empty() {
            return Err(MacroError::Config(
                "client.insights_version must not be empty".into(),
            ));
        }
        let url = Url::parse(&self.client.server_url).map_err(|e| {
            MacroError::Config(format!(
                "client.server_url {:?} is not a URL: {e}",
                self.client.server_url
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(MacroError::Config(format!(
                "client.server_url must be http or https, got {}",
                url.scheme()
            )));
        }
        Ok(())
    }
}
