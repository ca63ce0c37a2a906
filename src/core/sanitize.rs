//! Input cleaning and key validation.
//!
//! Two regimes. Free text (decision text/rationale, pattern description and
//! example, context values) is cleaned and truncated, never refused.
//! Structural keys (pattern names, context keys) double as lookup
//! identifiers and must stay predictable, so they are refused, never
//! rewritten.

use regex::Regex;
use std::sync::OnceLock;

pub const DEFAULT_MAX_TEXT_LEN: usize = 10_000;
pub const MAX_KEY_LEN: usize = 100;
pub const TRUNCATION_MARKER: &str = "... [truncated]";

fn key_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // ASCII-only on purpose: keys are lookup identifiers, not prose.
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]+$").unwrap())
}

/// Clean a free-text field. Never fails: control and null bytes are stripped
/// (newlines and tabs survive, they are legitimate in free text), whitespace
/// is trimmed, and oversized input is cut with a visible marker.
pub fn sanitize_text(value: &str, max_len: usize) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_len {
        return cleaned.to_string();
    }
    let kept: String = cleaned.chars().take(max_len).collect();
    format!("{}{}", kept.trim_end(), TRUNCATION_MARKER)
}

/// Tag labels get the free-text treatment with a short ceiling; empties
/// (including tags reduced to nothing by cleaning) are dropped.
pub fn sanitize_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|tag| sanitize_text(tag, MAX_KEY_LEN))
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// True only for a non-empty key of at most 100 characters drawn from
/// `[A-Za-z0-9_.-]`.
pub fn validate_key(key: &str) -> bool {
    !key.is_empty() && key.chars().count() <= MAX_KEY_LEN && key_pattern().is_match(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_control_bytes_and_trims() {
        assert_eq!(sanitize_text("  hello\u{0}wor\u{7}ld  ", 100), "helloworld");
    }

    #[test]
    fn test_keeps_newlines_and_tabs() {
        assert_eq!(sanitize_text("a\n\tb", 100), "a\n\tb");
    }

    #[test]
    fn test_truncates_with_visible_marker() {
        let long = "x".repeat(50);
        let out = sanitize_text(&long, 10);
        assert_eq!(out, format!("{}{}", "x".repeat(10), TRUNCATION_MARKER));
    }

    #[test]
    fn test_short_input_untouched() {
        assert_eq!(sanitize_text("fine", 10), "fine");
    }

    #[test]
    fn test_valid_keys() {
        assert!(validate_key("api.base-url_v2"));
        assert!(validate_key("a"));
        assert!(validate_key(&"k".repeat(100)));
    }

    #[test]
    fn test_invalid_keys() {
        assert!(!validate_key(""));
        assert!(!validate_key(&"k".repeat(101)));
        assert!(!validate_key("path/to/thing"));
        assert!(!validate_key("has space"));
        assert!(!validate_key("semi;colon"));
    }
}
