//! The Rule Compiler, Policy Store, and Config Watcher: together, the
//! policy half of the decision pipeline.
//!
//! A rule document (YAML) is [`parse_document`]d and [`compile`]d into an
//! immutable [`PolicySnapshot`]; a [`PolicyStore`] holds the current
//! snapshot behind an atomically-swapped `Arc`; a [`ConfigWatcher`]
//! observes the source file and republishes a freshly compiled snapshot
//! on every settled edit, leaving the store untouched on any compile
//! failure.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compile;
mod rule;
mod store;
mod watcher;

pub use compile::{compile, parse_document, CompileError, RuleDocument, RuleSpec};
pub use rule::{Field, PolicySnapshot, Rule, RuleAction};
pub use store::PolicyStore;
pub use watcher::{ConfigWatcher, WatchError, DEFAULT_DEBOUNCE};

/// Default path the core looks for a rule document at, overridden by the
/// `SUPEREGO_RULES_FILE` environment variable.
pub const DEFAULT_RULES_PATH: &str = "config/rules.yaml";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use superego_core::ToolRequest;

    #[test]
    fn end_to_end_deny_by_exact_match() {
        let yaml = r#"
rules:
  - id: r1
    priority: 1
    conditions:
      tool_name: { oneOf: ["rm", "sudo"] }
    action: deny
    reason: "dangerous"
"#;
        let snapshot = compile(parse_document(yaml).unwrap()).unwrap();
        let request = ToolRequest::new("rm", json!({"path": "/x"}));
        let matched = snapshot.first_match(&request).unwrap();
        assert_eq!(matched.id, "r1");
        assert_eq!(matched.action, RuleAction::Deny);
    }

    #[test]
    fn end_to_end_allow_by_catch_all() {
        let yaml = r#"
rules:
  - id: r1
    priority: 1
    conditions:
      tool_name: rm
    action: deny
  - id: r2
    priority: 999
    conditions:
      tool_name: { regex: ".*" }
    action: allow
    reason: "default"
"#;
        let snapshot = compile(parse_document(yaml).unwrap()).unwrap();
        let request = ToolRequest::new("ls", json!({}));
        let matched = snapshot.first_match(&request).unwrap();
        assert_eq!(matched.id, "r2");
        assert_eq!(matched.action, RuleAction::Allow);
    }

    #[test]
    fn end_to_end_jsonpath_and_glob_on_nested_parameters() {
        let yaml = r#"
rules:
  - id: j1
    priority: 1
    conditions:
      parameters:
        jsonpath:
          expr: "$.target.path"
          inner: { glob: "/etc/**" }
    action: deny
    reason: "protected"
"#;
        let snapshot = compile(parse_document(yaml).unwrap()).unwrap();

        let blocked = ToolRequest::new("write", json!({"target": {"path": "/etc/shadow"}}));
        assert_eq!(snapshot.first_match(&blocked).unwrap().id, "j1");

        let ok = ToolRequest::new("write", json!({"target": {"path": "/tmp/ok"}}));
        assert!(snapshot.first_match(&ok).is_none());
    }

    #[test]
    fn failed_compile_is_never_partial() {
        let yaml = r#"
rules:
  - id: r1
    priority: 1
    conditions:
      tool_name: rm
    action: deny
  - id: r1
    priority: 2
    conditions:
      tool_name: sudo
    action: deny
"#;
        let result = compile(parse_document(yaml).unwrap());
        assert!(result.is_err());
    }
}
