//! Turn a section (or the podcast) into a parsed JSON payload.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{MacroError, Result};
use crate::providers::{Citation, GenerationRequest, GenerativeProvider};

use super::extract::extract_json_object;
use super::merge::SOURCES_KEY;
use super::{prompts, Section};

/// Citations attached to a payload, at most.
pub const MAX_SOURCES: usize = 3;

/// Prompts a provider and shapes its answer into a section payload.
#[derive(Clone)]
pub struct SectionGenerator {
    provider: Arc<dyn GenerativeProvider>,
}

impl SectionGenerator {
    pub fn new(provider: Arc<dyn GenerativeProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Generate the payload for `key`, failing with `UnknownSection` before
    /// any provider call when the key is not one of the known sections.
    pub async fn generate_key(&self, key: &str, date: NaiveDate) -> Result<Value> {
        let section: Section = key.parse()?;
        self.generate(section, date).await
    }

    /// Generate the payload for `section` on `date`.
    pub async fn generate(&self, section: Section, date: NaiveDate) -> Result<Value> {
        let prompt = prompts::section_prompt(section, date);
        let object = self.generate_object(prompt).await?;
        debug!(section = %section, keys = object.len(), "Section payload parsed");
        Ok(Value::Object(object))
    }

    /// Generate the two-host podcast script for `date`. The payload must carry
    /// a non-empty `lines` array.
    pub async fn generate_podcast(&self, date: NaiveDate) -> Result<Value> {
        let object = self.generate_object(prompts::podcast_prompt(date)).await?;
        let line_count = object
            .get("lines")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        if line_count == 0 {
            return Err(MacroError::MalformedResponse(
                "podcast script has no lines".to_string(),
            ));
        }
        Ok(Value::Object(object))
    }

    async fn generate_object(&self, prompt: String) -> Result<Map<String, Value>> {
        let generation = self.provider.generate(GenerationRequest::json(prompt)).await?;
        let mut object = extract_json_object(&generation.text)?;
        if !generation.citations.is_empty() {
            object.insert(SOURCES_KEY.to_string(), sources_value(&generation.citations));
        }
        Ok(object)
    }
}

fn sources_value(citations: &[Citation]) -> Value {
    Value::Array(
        citations
            .iter()
            .take(MAX_SOURCES)
            .map(|c| serde_json::json!({ "url": c.url, "title": c.title }))
            .collect(),
    )
}
