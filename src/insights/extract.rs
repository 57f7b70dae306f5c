//! Pull a JSON object out of free-form model output.
//!
//! Models wrap JSON in prose or markdown fences even when told not to. The
//! scanner finds the first `{`, walks forward tracking nesting depth while
//! skipping braces inside string literals, and parses the balanced span.

use serde_json::{Map, Value};

use crate::error::{MacroError, Result};

/// Extract the first balanced top-level JSON object from `text`.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>> {
    let span = balanced_object_span(text)?;
    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(MacroError::MalformedResponse(
            "extracted JSON is not an object".to_string(),
        )),
        Err(e) => Err(MacroError::MalformedResponse(format!(
            "invalid JSON object: {e}"
        ))),
    }
}

fn balanced_object_span(text: &str) -> Result<&str> {
    let start = text
        .find('{')
        .ok_or_else(|| MacroError::MalformedResponse("no JSON object in response".to_string()))?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Ok(&text[start..end]);
                }
            }
            _ => {}
        }
    }

    Err(MacroError::MalformedResponse(
        "unterminated JSON object in response".to_string(),
    ))
}
