//! Native Gemini provider with Google Search grounding.
//!
//! Auth priority: config key → GEMINI_API_KEY → GOOGLE_API_KEY
//!
//! Thinking model support: Gemini 2.5 models return parts tagged `thought: true`.
//! This provider filters those out and only returns the final non-thought text.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::error::{MacroError, Result};

use super::{provider_error, Citation, Generation, GenerationRequest, GenerativeProvider};

/// Gemini v1beta REST API base.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model when none is configured.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Generation calls are slow when search grounding kicks in.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(90);

// ── Auth ─────────────────────────────────────────────────────────────────────

/// API key for the Gemini REST API, sent as the `?key=` query parameter.
#[derive(Clone)]
pub struct GeminiAuth(String);

impl std::fmt::Debug for GeminiAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GeminiAuth([REDACTED])")
    }
}

impl GeminiAuth {
    /// Resolve the key in priority order.
    ///
    /// 1. `explicit_key` — value from config file
    /// 2. `env_key` — value of `GEMINI_API_KEY` or `GOOGLE_API_KEY`
    pub fn resolve(explicit_key: Option<&str>, env_key: Option<&str>) -> Option<Self> {
        explicit_key
            .filter(|k| !k.is_empty())
            .or_else(|| env_key.filter(|k| !k.is_empty()))
            .map(|k| Self(k.to_string()))
    }

    /// Read `GEMINI_API_KEY`, falling back to `GOOGLE_API_KEY`.
    pub fn env_key() -> Option<String> {
        std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .ok()
    }
}

// ── Provider ──────────────────────────────────────────────────────────────────

/// Gemini provider speaking the `generateContent` REST API directly.
pub struct GeminiProvider {
    auth: GeminiAuth,
    model: String,
    base_url: String,
    client: Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("auth", &self.auth)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiProvider {
    /// Build a provider that authenticates with an API key.
    pub fn new(auth: GeminiAuth, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MacroError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            auth,
            model: model.to_string(),
            base_url: GEMINI_API_BASE.to_string(),
            client,
        })
    }

    /// Build from an optional configured key, resolving auth in priority order.
    pub fn from_config(api_key: Option<&str>, model: &str, timeout: Duration) -> Result<Self> {
        let env_key = GeminiAuth::env_key();
        let auth = GeminiAuth::resolve(api_key, env_key.as_deref()).ok_or_else(|| {
            MacroError::Config(
                "no Gemini API key: set gemini.api_key or GEMINI_API_KEY".to_string(),
            )
        })?;
        Self::new(auth, model, timeout)
    }

    /// Point the provider at a different API base (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build the `generateContent` request body with search grounding enabled.
    pub fn build_request_body(&self, request: &GenerationRequest) -> Value {
        json!({
            "contents": [{
                "parts": [{ "text": request.full_prompt() }]
            }],
            "tools": [{ "google_search": {} }],
            "generationConfig": {
                "temperature": 0.7,
                "maxOutputTokens": 8192
            }
        })
    }

    /// Extract final answer text from a Gemini API response.
    ///
    /// Gemini 2.5 thinking models return parts tagged `"thought": true`.
    /// Those are intermediate reasoning steps and must be filtered out.
    /// If no non-thought parts exist (unusual), we fall back to returning
    /// the thought text so the caller always gets *something*.
    pub fn extract_text(response: &Value) -> Option<String> {
        let parts = response["candidates"][0]["content"]["parts"].as_array()?;

        let final_parts: Vec<&str> = parts
            .iter()
            .filter(|p| !p["thought"].as_bool().unwrap_or(false))
            .filter_map(|p| p["text"].as_str())
            .collect();

        if !final_parts.is_empty() {
            return Some(final_parts.join(""));
        }

        let thought_parts: Vec<&str> = parts.iter().filter_map(|p| p["text"].as_str()).collect();

        if !thought_parts.is_empty() {
            Some(thought_parts.join(""))
        } else {
            None
        }
    }

    /// Collect web citations from `groundingMetadata.groundingChunks`.
    ///
    /// Chunks without a `web` entry (e.g. retrieved context) are skipped.
    pub fn extract_citations(response: &Value) -> Vec<Citation> {
        response["candidates"][0]["groundingMetadata"]["groundingChunks"]
            .as_array()
            .map(|chunks| {
                chunks
                    .iter()
                    .filter_map(|chunk| {
                        let web = chunk.get("web")?;
                        Some(Citation {
                            url: web["uri"].as_str()?.to_string(),
                            title: web["title"].as_str().unwrap_or_default().to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Build the full API URL for `generateContent`.
    fn api_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// Turn a decoded response body into a [`Generation`].
    fn parse_response(json: &Value) -> Result<Generation> {
        if let Some(error) = json.get("error") {
            let message = error["message"]
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| error.to_string());
            return Err(MacroError::Upstream(format!("Gemini API error: {message}")));
        }
        let text = Self::extract_text(json).unwrap_or_default();
        if text.trim().is_empty() {
            return Err(MacroError::MalformedResponse(
                "Empty Gemini response".to_string(),
            ));
        }
        Ok(Generation {
            text,
            citations: Self::extract_citations(json),
        })
    }
}

#[async_trait]
impl GenerativeProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<Generation> {
        let body = self.build_request_body(&request);

        debug!(model = %self.model, "Gemini generateContent request");

        let response = self
            .client
            .post(self.api_url())
            .query(&[("key", self.auth.0.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| MacroError::Upstream(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| MacroError::Upstream(format!("Gemini response read failed: {e}")))?;

        if !status.is_success() {
            // Try to extract a useful message from the Gemini error body.
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(String::from))
                .unwrap_or(text);
            return Err(provider_error(status.as_u16(), &message));
        }

        let json: Value = serde_json::from_str(&text).map_err(|e| {
            MacroError::MalformedResponse(format!("Gemini returned invalid JSON: {e}"))
        })?;
        Self::parse_response(&json)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
