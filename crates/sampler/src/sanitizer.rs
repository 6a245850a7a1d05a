//! The sole stringification path for anything destined for a prompt.
//!
//! Every rule here is size-bounded: an unbounded field is a prompt-length
//! denial-of-service waiting to happen, so every limit below is a named
//! constant rather than "whatever fits".

use superego_core::request::TOOL_NAME_RE;

/// Free-text fields (reasons, sampling guidance) are truncated here.
pub const MAX_FREE_TEXT_LEN: usize = 2_000;
/// Path-shaped fields (`cwd`, path-like parameter values) are truncated here.
pub const MAX_PATH_LEN: usize = 500;
/// Parameter key names are truncated here.
pub const MAX_KEY_LEN: usize = 100;
/// Any other nested parameter value, stringified, is truncated here.
pub const MAX_VALUE_LEN: usize = 1_000;

/// Stateless sanitization rules applied before any field reaches a prompt.
pub struct Sanitizer;

impl Sanitizer {
    /// Validate a tool name against the identifier regex. Returns `None`
    /// (rather than a best-effort sanitized string) because an invalid
    /// tool name means the Sampler must refuse outright.
    #[must_use]
    pub fn tool_name(name: &str) -> Option<&str> {
        TOOL_NAME_RE.is_match(name).then_some(name)
    }

    /// Strip `../` traversal sequences and control characters from a path,
    /// then truncate.
    #[must_use]
    pub fn path(input: &str) -> String {
        let stripped: String = input.replace("../", "").chars().filter(|c| !c.is_control()).collect();
        truncate_chars(&stripped, MAX_PATH_LEN)
    }

    /// HTML-escape and strip control characters from free text, then
    /// truncate.
    #[must_use]
    pub fn free_text(input: &str) -> String {
        let escaped = html_escape(input);
        let stripped: String = escaped.chars().filter(|c| !c.is_control() || *c == '\n').collect();
        truncate_chars(&stripped, MAX_FREE_TEXT_LEN)
    }

    /// Retain only `[A-Za-z0-9_-]` from a parameter key, then truncate.
    #[must_use]
    pub fn key(input: &str) -> String {
        let filtered: String = input.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-').collect();
        truncate_chars(&filtered, MAX_KEY_LEN)
    }

    /// Stringify an arbitrary JSON value for embedding in a prompt, then
    /// truncate.
    #[must_use]
    pub fn value(input: &serde_json::Value) -> String {
        let s = match input {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let stripped: String = s.chars().filter(|c| !c.is_control()).collect();
        truncate_chars(&stripped, MAX_VALUE_LEN)
    }
}

fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn truncate_chars(input: &str, max: usize) -> String {
    input.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_name_rejects_non_identifier() {
        assert!(Sanitizer::tool_name("rm").is_some());
        assert!(Sanitizer::tool_name("1-bad").is_none());
    }

    #[test]
    fn path_strips_traversal_and_truncates() {
        let p = Sanitizer::path("../../etc/passwd");
        assert_eq!(p, "etc/passwd");
        let long = "a".repeat(600);
        assert_eq!(Sanitizer::path(&long).len(), MAX_PATH_LEN);
    }

    #[test]
    fn free_text_escapes_html_and_strips_control_chars() {
        let s = Sanitizer::free_text("<script>alert(1)</script>\x07");
        assert!(s.contains("&lt;script&gt;"));
        assert!(!s.contains('\x07'));
    }

    #[test]
    fn key_retains_only_allowed_charset() {
        assert_eq!(Sanitizer::key("a-b_c"), "a-b_c");
        assert_eq!(Sanitizer::key("a b$c!"), "abc");
    }

    #[test]
    fn value_stringifies_and_truncates() {
        assert_eq!(Sanitizer::value(&json!("hello")), "hello");
        assert_eq!(Sanitizer::value(&json!(42)), "42");
        let long = "x".repeat(1_500);
        assert_eq!(Sanitizer::value(&json!(long)).len(), MAX_VALUE_LEN);
    }
}
