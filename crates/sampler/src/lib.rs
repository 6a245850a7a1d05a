//! Prompt sanitization and circuit-breaker-guarded AI sampling.
//!
//! [`AiSampler::sample`] is the only way a [`ToolRequest`] ever reaches an
//! LLM: it sanitizes every field first, calls the configured
//! [`InferenceProvider`] through a [`CircuitBreaker`], and parses the
//! model's reply under a strict three-line contract. Anything that
//! deviates from that contract — a breaker trip, a timeout, a malformed
//! reply — comes back as [`SampleOutcome::Unavailable`], never partial
//! output.

#![deny(unsafe_code)]

mod provider;
mod sanitizer;

pub use provider::{HttpInferenceProvider, InferenceProvider, ProviderError, StaticInferenceProvider};
pub use sanitizer::Sanitizer;

use std::sync::Arc;

use resilience::{BreakerError, CircuitBreaker};
use superego_core::ToolRequest;
use tracing::{instrument, warn};

/// Why the Sampler could not produce a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// The circuit breaker was open (or a probe was already in flight).
    BreakerOpen,
    /// The provider call exceeded the breaker's operation timeout.
    Timeout,
    /// The provider responded, but not in the expected three-line format.
    ParseFailure,
}

/// The result of an AI sampling attempt.
#[derive(Debug, Clone)]
pub enum SampleOutcome {
    /// A well-formed verdict was parsed from the provider's reply.
    Verdict {
        /// Whether the model recommends allowing the call.
        allow: bool,
        /// The model's one-sentence justification.
        reason: String,
        /// The model-reported confidence, in `[0.0, 1.0]`.
        confidence: f64,
    },
    /// No verdict could be produced; the caller should apply the
    /// fail-open fallback.
    Unavailable {
        /// Why sampling failed.
        reason: UnavailableReason,
    },
}

/// Wraps an [`InferenceProvider`] with sanitization and breaker
/// protection.
pub struct AiSampler<P: InferenceProvider> {
    provider: P,
    breaker: Arc<CircuitBreaker>,
}

impl<P: InferenceProvider> AiSampler<P> {
    /// Build a sampler guarding `provider` with `breaker`. Takes the
    /// breaker by `Arc` so callers (the `superego` facade) can share the
    /// exact instance with a `telemetry::HealthMonitor` — the monitor
    /// must observe the breaker that actually fronts inference calls,
    /// not a look-alike standing in for it.
    #[must_use]
    pub fn new(provider: P, breaker: Arc<CircuitBreaker>) -> Self {
        Self { provider, breaker }
    }

    /// The breaker guarding this sampler's provider calls, shared so a
    /// `HealthMonitor` can report its real state.
    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Sample a verdict for `request`, embedding `guidance` (the matched
    /// rule's `sampling_guidance`) in the prompt.
    #[instrument(skip_all, fields(tool_name = %request.tool_name))]
    pub async fn sample(&self, request: &ToolRequest, guidance: &str) -> SampleOutcome {
        let Some(tool_name) = Sanitizer::tool_name(&request.tool_name) else {
            warn!("sampler refusing request with malformed tool_name");
            return SampleOutcome::Unavailable { reason: UnavailableReason::ParseFailure };
        };

        let prompt = build_prompt(tool_name, request, guidance);

        let result = self.breaker.call(|| async { self.provider.complete(&prompt).await }).await;

        match result {
            Ok(raw) => parse_verdict(&raw),
            Err(BreakerError::BreakerOpen) => SampleOutcome::Unavailable { reason: UnavailableReason::BreakerOpen },
            Err(BreakerError::Timeout) => SampleOutcome::Unavailable { reason: UnavailableReason::Timeout },
            Err(BreakerError::Operation(e)) => {
                warn!(error = %e, "ai provider call failed");
                SampleOutcome::Unavailable { reason: UnavailableReason::ParseFailure }
            }
        }
    }
}

fn build_prompt(tool_name: &str, request: &ToolRequest, guidance: &str) -> String {
    let cwd = request.cwd.as_deref().map(Sanitizer::path).unwrap_or_default();
    let params = sanitize_parameters(&request.parameters);
    let guidance = Sanitizer::free_text(guidance);

    format!(
        "You are evaluating whether to allow a tool call.\n\
         Tool: {tool_name}\n\
         Working directory: {cwd}\n\
         Parameters: {params}\n\
         Guidance: {guidance}\n\
         \n\
         Respond with exactly three lines:\n\
         DECISION: ALLOW|DENY\n\
         REASON: <one sentence>\n\
         CONFIDENCE: <float in [0,1]>\n"
    )
}

/// Render the parameter bag for embedding in a prompt, per spec.md §4.5:
/// each key retains only `[A-Za-z0-9_-]` (truncated at 100), each value
/// is stringified and truncated at 1,000. A non-object bag (array,
/// scalar, `null`) has no keys to filter, so it is stringified as a
/// single value.
fn sanitize_parameters(parameters: &serde_json::Value) -> String {
    let Some(map) = parameters.as_object() else {
        return Sanitizer::value(parameters);
    };
    map.iter()
        .map(|(key, value)| format!("{}={}", Sanitizer::key(key), Sanitizer::value(value)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_verdict(raw: &str) -> SampleOutcome {
    let mut decision = None;
    let mut reason = None;
    let mut confidence = None;

    for line in raw.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("DECISION:") {
            decision = Some(rest.trim());
        } else if let Some(rest) = line.strip_prefix("REASON:") {
            reason = Some(rest.trim());
        } else if let Some(rest) = line.strip_prefix("CONFIDENCE:") {
            confidence = Some(rest.trim());
        }
    }

    let allow = match decision {
        Some("ALLOW") => true,
        Some("DENY") => false,
        _ => return SampleOutcome::Unavailable { reason: UnavailableReason::ParseFailure },
    };

    let Some(reason) = reason else {
        return SampleOutcome::Unavailable { reason: UnavailableReason::ParseFailure };
    };

    let Some(confidence) = confidence.and_then(|c| c.parse::<f64>().ok()) else {
        return SampleOutcome::Unavailable { reason: UnavailableReason::ParseFailure };
    };
    if !(0.0..=1.0).contains(&confidence) {
        return SampleOutcome::Unavailable { reason: UnavailableReason::ParseFailure };
    }

    SampleOutcome::Verdict { allow, reason: reason.to_string(), confidence }
}
