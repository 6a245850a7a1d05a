//! The Decision Engine: the single entry point of the core, per
//! spec.md §4.6.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::instrument;

use audit::AuditSink;
use policy::{PolicyStore, RuleAction};
use sampler::{AiSampler, InferenceProvider, SampleOutcome};
use superego_core::{ids, Action, AuditEntry, Decision, SuperegoError, ToolRequest};

use crate::classifier::{classify, unavailable_decision};

/// Orchestrates one `ToolRequest` through policy evaluation, optional AI
/// sampling, and error classification, per spec.md §4.6's 8-step
/// algorithm. Cheap to clone (every field is `Arc`-wrapped), so a
/// transport can hand a clone to each connection/request task without
/// extra synchronization.
pub struct DecisionEngine<P: InferenceProvider> {
    store: Arc<PolicyStore>,
    sampler: Arc<AiSampler<P>>,
    audit: Arc<AuditSink>,
}

impl<P: InferenceProvider> Clone for DecisionEngine<P> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone(), sampler: self.sampler.clone(), audit: self.audit.clone() }
    }
}

impl<P: InferenceProvider> DecisionEngine<P> {
    /// Wire the engine to a policy store, sampler, and audit sink.
    #[must_use]
    pub fn new(store: Arc<PolicyStore>, sampler: Arc<AiSampler<P>>, audit: Arc<AuditSink>) -> Self {
        Self { store, sampler, audit }
    }

    /// The sole public entry point: evaluate `request` and return a
    /// `Decision`. Never panics, never returns `Err` — every failure is
    /// classified into a `Decision` before it reaches the caller.
    pub async fn evaluate(&self, request: ToolRequest) -> Decision {
        self.evaluate_cancellable(request, CancellationToken::new()).await
    }

    /// As [`Self::evaluate`], but the AI Sampler call is raced against
    /// `cancel`. A fired token aborts the in-flight inference call and
    /// returns the classifier's `Cancelled` outcome (fail-closed, per
    /// spec.md §4.8). The rule walk itself only checks `cancel` between
    /// rules, never mid-pattern, per spec.md §5.
    #[instrument(skip_all, fields(tool_name = %request.tool_name))]
    pub async fn evaluate_cancellable(&self, request: ToolRequest, cancel: CancellationToken) -> Decision {
        let start = Instant::now();
        let (decision, rule_matches) = self.evaluate_inner(&request, &cancel).await;
        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let decision = decision.with_elapsed(elapsed_ms);
        self.record(request, decision.clone(), rule_matches);
        decision
    }

    async fn evaluate_inner(&self, request: &ToolRequest, cancel: &CancellationToken) -> (Decision, Vec<String>) {
        if let Err(e) = request.validate() {
            return (classify(&e), Vec::new());
        }

        let snapshot = self.store.snapshot();

        let mut matched = None;
        for rule in snapshot.rules() {
            if cancel.is_cancelled() {
                return (classify(&SuperegoError::Cancelled), Vec::new());
            }
            if rule.matches(request) {
                matched = Some(rule);
                break;
            }
        }

        let Some(rule) = matched else {
            return (Decision::new(Action::Allow, "no rule matched", None, 0.5), Vec::new());
        };

        match rule.action {
            RuleAction::Allow => (
                Decision::new(Action::Allow, rule.reason.clone().unwrap_or_else(|| "allowed by rule".into()), Some(rule.id.clone()), 1.0),
                vec![rule.id.clone()],
            ),
            RuleAction::Deny => (
                Decision::new(Action::Deny, rule.reason.clone().unwrap_or_else(|| "denied by rule".into()), Some(rule.id.clone()), 1.0),
                vec![rule.id.clone()],
            ),
            RuleAction::Sample => {
                let guidance = rule.sampling_guidance.as_deref().unwrap_or("");
                let decision = tokio::select! {
                    () = cancel.cancelled() => classify(&SuperegoError::Cancelled),
                    outcome = self.sampler.sample(request, guidance) => match outcome {
                        SampleOutcome::Verdict { allow, reason, confidence } => {
                            let action = if allow { Action::Allow } else { Action::Deny };
                            Decision::new(action, reason, Some(rule.id.clone()), confidence)
                        }
                        SampleOutcome::Unavailable { reason } => unavailable_decision(reason, &rule.id),
                    },
                };
                (decision, vec![rule.id.clone()])
            }
        }
    }

    fn record(&self, request: ToolRequest, decision: Decision, rule_matches: Vec<String>) {
        let entry = AuditEntry { id: ids::next_monotonic_id(), timestamp_ms: ids::now_ms(), request, decision, rule_matches };
        self.audit.record(entry);
    }
}
