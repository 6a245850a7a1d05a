//! Superego core primitives: shared types and the error taxonomy.
//!
//! Every other crate in the workspace depends on this one for the request
//! and decision shapes, id/time utilities, and the single error enum that
//! the decision pipeline classifies failures into.

#![deny(unsafe_code)]

pub mod ids {
    //! Monotonic ids and timestamps shared across the pipeline.

    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};
    use uuid::Uuid;

    static NEXT_ID: AtomicU64 = AtomicU64::new(1);

    /// Generate a new monotonic identifier (starts at 1).
    pub fn next_monotonic_id() -> u64 {
        NEXT_ID.fetch_add(1, Ordering::Relaxed)
    }

    /// Milliseconds since UNIX epoch (for timestamps).
    pub fn now_ms() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64
    }

    /// Opaque trace identifier (UUID v4 string).
    pub fn new_trace_id() -> String {
        Uuid::new_v4().to_string()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn monotonic_increments() {
            let a = next_monotonic_id();
            let b = next_monotonic_id();
            assert!(b > a);
        }

        #[test]
        fn trace_id_format() {
            let t = new_trace_id();
            assert_eq!(t.len(), 36);
            assert!(t.chars().all(|c| c.is_ascii_hexdigit() || c == '-'));
        }
    }
}

pub mod request {
    //! The `ToolRequest` input to evaluation.

    use once_cell::sync::Lazy;
    use regex::Regex;
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    use crate::SuperegoError;

    /// Identifier regex tool names, session ids and agent ids must match
    /// (tool names) or stay within (session/agent ids are length-bounded,
    /// not pattern-bounded, but share the same compiled set here for reuse).
    pub static TOOL_NAME_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex is valid"));

    const MAX_SESSION_ID_LEN: usize = 256;
    const MAX_AGENT_ID_LEN: usize = 256;
    const MAX_CWD_LEN: usize = 4096;

    /// A single attempted tool call, as received from an agent host.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ToolRequest {
        /// Identifier of the tool being invoked (e.g. `"bash"`, `"write"`).
        pub tool_name: String,
        /// Heterogeneous parameter bag passed to the tool.
        #[serde(default)]
        pub parameters: Value,
        /// Opaque session identifier, if the host supplies one.
        #[serde(default)]
        pub session_id: Option<String>,
        /// Opaque agent identifier, if the host supplies one.
        #[serde(default)]
        pub agent_id: Option<String>,
        /// Working directory the tool would run in, if applicable.
        #[serde(default)]
        pub cwd: Option<String>,
        /// Milliseconds since UNIX epoch at receipt.
        #[serde(default = "crate::ids::now_ms")]
        pub timestamp_ms: u64,
    }

    impl ToolRequest {
        /// Construct a request with the current timestamp and no optional
        /// fields set.
        #[must_use]
        pub fn new(tool_name: impl Into<String>, parameters: Value) -> Self {
            Self {
                tool_name: tool_name.into(),
                parameters,
                session_id: None,
                agent_id: None,
                cwd: None,
                timestamp_ms: crate::ids::now_ms(),
            }
        }

        /// Validate the invariants spec.md §3 requires: `tool_name` matches
        /// the identifier regex; `session_id`/`agent_id`/`cwd` respect their
        /// length bounds.
        pub fn validate(&self) -> Result<(), SuperegoError> {
            if !TOOL_NAME_RE.is_match(&self.tool_name) {
                return Err(SuperegoError::Validation(format!(
                    "tool_name '{}' does not match required identifier pattern",
                    self.tool_name
                )));
            }
            if let Some(sid) = &self.session_id {
                if sid.len() > MAX_SESSION_ID_LEN {
                    return Err(SuperegoError::Validation("session_id too long".into()));
                }
            }
            if let Some(aid) = &self.agent_id {
                if aid.len() > MAX_AGENT_ID_LEN {
                    return Err(SuperegoError::Validation("agent_id too long".into()));
                }
            }
            if let Some(cwd) = &self.cwd {
                if cwd.len() > MAX_CWD_LEN {
                    return Err(SuperegoError::Validation("cwd too long".into()));
                }
                if !cwd.starts_with('/') && !(cwd.len() >= 2 && cwd.as_bytes()[1] == b':') {
                    return Err(SuperegoError::Validation("cwd must be absolute".into()));
                }
            }
            Ok(())
        }
    }

}

pub mod decision {
    //! The `Decision` result of evaluation and the bounded `AuditEntry`
    //! shape persisted alongside it.

    use serde::Serialize;

    use crate::request::ToolRequest;

    /// The externally observable verdict. `sample` is never returned — it
    /// is resolved internally by the AI Sampler before a `Decision` is
    /// produced.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Action {
        /// Permit the tool call.
        Allow,
        /// Block the tool call.
        Deny,
    }

    /// The result of evaluating a `ToolRequest` against the active policy.
    #[derive(Debug, Clone, Serialize)]
    pub struct Decision {
        /// The verdict.
        pub action: Action,
        /// Plain-language explanation, safe to surface to the caller.
        pub reason: String,
        /// The rule that produced this verdict, if any rule matched.
        pub rule_id: Option<String>,
        /// Confidence in `[0.0, 1.0]`.
        pub confidence: f64,
        /// Monotonic elapsed time for the evaluation, in milliseconds.
        pub processing_time_ms: u64,
    }

    impl Decision {
        /// Construct a decision with `processing_time_ms` left at zero;
        /// callers fill it in once evaluation completes.
        #[must_use]
        pub fn new(action: Action, reason: impl Into<String>, rule_id: Option<String>, confidence: f64) -> Self {
            Self {
                action,
                reason: reason.into(),
                rule_id,
                confidence: confidence.clamp(0.0, 1.0),
                processing_time_ms: 0,
            }
        }

        /// Return a copy with `processing_time_ms` set.
        #[must_use]
        pub fn with_elapsed(mut self, elapsed_ms: u64) -> Self {
            self.processing_time_ms = elapsed_ms;
            self
        }
    }

    /// A single recorded request/decision pair, as kept by the Audit Sink.
    #[derive(Debug, Clone, Serialize)]
    pub struct AuditEntry {
        /// Monotonic entry id.
        pub id: u64,
        /// Milliseconds since UNIX epoch when the entry was recorded.
        pub timestamp_ms: u64,
        /// The request that was evaluated.
        pub request: ToolRequest,
        /// The decision that was produced.
        pub decision: Decision,
        /// Ids of every rule that matched during evaluation (informational;
        /// usually a single entry — the winning rule — but kept as a list
        /// so future multi-rule tracing has somewhere to go).
        pub rule_matches: Vec<String>,
    }
}

use thiserror::Error;

/// The full error taxonomy from spec.md §7. Every evaluation-time failure
/// is one of these variants; the Error Classifier in `decision-engine` is
/// the single place that converts a `SuperegoError` into a `Decision`.
#[derive(Debug, Error, Clone)]
pub enum SuperegoError {
    /// A configuration problem (should only occur at load time; if it
    /// surfaces at evaluate-time it indicates the store served a bad
    /// snapshot).
    #[error("configuration error: {0}")]
    Config(String),
    /// The inbound request failed validation (e.g. malformed tool_name).
    #[error("validation error: {0}")]
    Validation(String),
    /// A condition failed to compile at rule-load time.
    #[error("pattern compile error: {0}")]
    PatternCompile(String),
    /// The AI service is unavailable (breaker open or operation timeout).
    #[error("AI evaluation unavailable: {0}")]
    AiServiceUnavailable(String),
    /// The AI service responded, but not in the expected format.
    #[error("AI response invalid: {0}")]
    AiResponseInvalid(String),
    /// The evaluation was cancelled by the caller.
    #[error("evaluation cancelled")]
    Cancelled,
    /// Anything else.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

pub use request::ToolRequest;
pub use decision::{Action, AuditEntry, Decision};
