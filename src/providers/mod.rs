//! Generative text providers.
//!
//! A provider turns one prompt into text plus the web citations it was
//! grounded on. Retry policy lives with the callers; providers report each
//! failure exactly once.

pub mod gemini;
pub mod throttle;

pub use gemini::GeminiProvider;
pub use throttle::ThrottledProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MacroError, Result};

/// Suffix appended to prompts when the caller needs a bare JSON object back.
pub const JSON_ONLY_INSTRUCTION: &str = "\n\nIMPORTANT: Return ONLY valid JSON. No markdown fences, no explanation, just the JSON object.";

/// A web source the provider grounded its answer on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    pub title: String,
}

/// One generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Ask the provider for a JSON-only answer.
    pub json_only: bool,
}

impl GenerationRequest {
    pub fn json(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            json_only: true,
        }
    }

    /// Prompt text as sent upstream.
    pub fn full_prompt(&self) -> String {
        if self.json_only {
            format!("{}{}", self.prompt, JSON_ONLY_INSTRUCTION)
        } else {
            self.prompt.clone()
        }
    }
}

/// Raw provider output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    /// Final answer text (reasoning parts excluded).
    pub text: String,
    /// Grounding citations in provider order.
    pub citations: Vec<Citation>,
}

/// A generative text backend.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Issue a single generation call. Never retries internally.
    async fn generate(&self, request: GenerationRequest) -> Result<Generation>;
}

/// Map an HTTP failure from a provider to an upstream error with a readable
/// category prefix.
pub fn provider_error(status: u16, message: &str) -> MacroError {
    let category = match status {
        401 | 403 => "authentication failed",
        404 => "model or endpoint not found",
        408 | 504 => "provider timed out",
        429 => "rate limited",
        500..=599 => "provider unavailable",
        _ => "request rejected",
    };
    MacroError::Upstream(format!("{category} (HTTP {status}): {message}"))
}
