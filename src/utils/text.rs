//! Small text helpers shared by prompts and summaries.

/// Truncate to at most `max_chars` characters, respecting char
/// boundaries. Byte slicing would panic on multi-byte input.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Character count, used wherever length thresholds are specified in
/// characters rather than bytes.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_ascii() {
        assert_eq!(truncate_chars("hello world", 5), "hello");
        assert_eq!(truncate_chars("hi", 5), "hi");
    }

    #[test]
    fn truncates_multibyte_safely() {
        let text = "最新技术趋势分析";
        assert_eq!(truncate_chars(text, 2), "最新");
        assert_eq!(char_len(text), 8);
    }
}
