//! The Decision Engine: wires the Policy Store, AI Sampler, Audit Sink,
//! and Error Classifier into the single `evaluate` entry point the rest
//! of the gateway calls, per spec.md §4.6.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod classifier;
mod engine;

pub use classifier::{classify, unavailable_decision};
pub use engine::DecisionEngine;

#[cfg(test)]
mod integration_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use policy::{compile, parse_document, PolicyStore};
    use resilience::{BreakerConfig, CircuitBreaker};
    use sampler::{AiSampler, ProviderError, StaticInferenceProvider};
    use serde_json::json;
    use superego_core::{Action, ToolRequest};

    use crate::DecisionEngine;

    /// spec.md §8 scenario 6: a reload mid-flight never produces a mixed
    /// verdict for an in-progress evaluation, and the next evaluation
    /// observes the new rules.
    #[tokio::test]
    async fn hot_reload_is_observed_by_the_next_evaluation_only() {
        let snapshot = compile(parse_document("rules:\n  - id: deny-rm\n    priority: 1\n    conditions:\n      tool_name: rm\n    action: deny\n").unwrap()).unwrap();
        let store = Arc::new(PolicyStore::new(snapshot));
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig::default()));
        let sampler = Arc::new(AiSampler::new(StaticInferenceProvider::ok(""), breaker));
        let audit = Arc::new(audit::AuditSink::new(100));
        let engine = DecisionEngine::new(store.clone(), sampler, audit);

        let before = engine.evaluate(ToolRequest::new("rm", json!({}))).await;
        assert_eq!(before.action, Action::Deny);

        let reloaded = compile(parse_document("rules:\n  - id: allow-all\n    priority: 1\n    conditions:\n      tool_name: { regex: \".*\" }\n    action: allow\n").unwrap()).unwrap();
        store.replace(reloaded);

        let after = engine.evaluate(ToolRequest::new("rm", json!({}))).await;
        assert_eq!(after.action, Action::Allow);
        assert_eq!(after.rule_id.as_deref(), Some("allow-all"));
    }

    /// spec.md §8 scenario 4: a sample rule whose provider is unreachable
    /// fails open at reduced confidence, attributed to the triggering rule.
    #[tokio::test]
    async fn sample_rule_with_unreachable_provider_fails_open() {
        let snapshot = compile(
            parse_document(
                "rules:\n  - id: sample-writes\n    priority: 10\n    conditions:\n      tool_name: write\n    action: sample\n    sampling_guidance: \"check for secrets\"\n",
            )
            .unwrap(),
        )
        .unwrap();
        let store = Arc::new(PolicyStore::new(snapshot));
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(60),
            operation_timeout: Duration::from_secs(5),
        }));
        let provider = StaticInferenceProvider::err(ProviderError::Transport("connection refused".into()));
        let sampler = Arc::new(AiSampler::new(provider, breaker));
        let audit = Arc::new(audit::AuditSink::new(100));
        let engine = DecisionEngine::new(store, sampler, audit);

        let decision = engine.evaluate(ToolRequest::new("write", json!({"path": "/tmp/x"}))).await;
        assert_eq!(decision.action, Action::Allow);
        assert_eq!(decision.rule_id.as_deref(), Some("sample-writes"));
        assert!(decision.confidence < 0.5);
    }
}
