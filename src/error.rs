//! Error types for macrodesk.
//!
//! `MacroError` is `Clone` so a single failed upstream call can be handed to
//! every caller that joined the same in-flight request.

use thiserror::Error;

/// Errors produced by the server, the generator and the dashboard client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MacroError {
    /// The requested section key is not part of the fixed section set.
    #[error("Unknown section: {0}")]
    UnknownSection(String),

    /// Upstream text did not contain a parseable JSON payload.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Network, auth, rate-limit or timeout failure from an upstream API.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Local persistence failure (read, write, quota).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid or missing configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// Filesystem or socket failure.
    #[error("I/O error: {0}")]
    Io(String),
}

impl MacroError {
    /// Whether a caller may try the same request again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::MalformedResponse(_) | Self::Upstream(_))
    }
}

impl From<std::io::Error> for MacroError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<reqwest::Error> for MacroError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Upstream(format!("request timed out: {err}"))
        } else {
            Self::Upstream(err.to_string())
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, MacroError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(MacroError::Upstream("429".into()).is_retryable());
        assert!(MacroError::MalformedResponse("no json".into()).is_retryable());
        assert!(!MacroError::UnknownSection("nope".into()).is_retryable());
        assert!(!MacroError::Storage("quota".into()).is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: MacroError = io.into();
        assert!(matches!(err, MacroError::Io(msg) if msg.contains("missing")));
    }

    #[test]
    fn test_display_includes_detail() {
        let err = MacroError::UnknownSection("weather".into());
        assert_eq!(err.to_string(), "Unknown section: weather");
    }
}
