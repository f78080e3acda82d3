//! Extraction of JSON objects from free-form LLM output.
//!
//! Models wrap JSON in markdown fences, prefix it with prose, or emit
//! trailing commentary. `extract_json` locates the first balanced JSON
//! object and parses it.

use serde_json::Value;

/// Extract and parse the first JSON object embedded in `text`.
///
/// Handles ```json fenced blocks, leading/trailing prose, and nested
/// braces inside string literals. Returns `None` when no parseable
/// object is present.
pub fn extract_json(text: &str) -> Option<Value> {
    let candidate = strip_fences(text);

    // Fast path: the whole candidate is the object.
    if let Ok(value) = serde_json::from_str::<Value>(candidate.trim()) {
        if value.is_object() {
            return Some(value);
        }
    }

    let span = balanced_object_span(candidate)?;
    serde_json::from_str(&candidate[span.0..span.1]).ok()
}

/// Strip a markdown code fence if the payload is wrapped in one.
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
    {
        if let Some(end) = rest.rfind("```") {
            return &rest[..end];
        }
        return rest;
    }
    trimmed
}

/// Byte span of the first brace-balanced object, string-literal aware.
fn balanced_object_span(text: &str) -> Option<(usize, usize)> {
    let start = text.find('{')?;
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
                    return Some((start, start + offset + ch.len_utf8()));
                }
            }
            _ => {}
        }
    }
    None
}
