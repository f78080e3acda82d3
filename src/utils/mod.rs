//! Cross-cutting helpers: JSON extraction from LLM output, text
//! truncation, and logging initialization.

pub mod json;
pub mod logging;
pub mod text;

pub use json::extract_json;
pub use text::{char_len, truncate_chars};
