//! The Error Classifier: the single choke point that turns any evaluation
//! failure into a [`Decision`], per spec.md §4.8 and §7. No error ever
//! crosses [`crate::DecisionEngine::evaluate`]'s boundary as an exception.

use sampler::UnavailableReason;
use superego_core::{Action, Decision, SuperegoError};

/// Map a [`SuperegoError`] to its fail-open/fail-closed [`Decision`], per
/// spec.md §4.8's table. Every branch here returns a plain-language
/// reason; the error's internal detail is logged by the caller via
/// `tracing`, never embedded in the reason string, per spec.md §7.
#[must_use]
pub fn classify(error: &SuperegoError) -> Decision {
    match error {
        SuperegoError::Config(_) | SuperegoError::PatternCompile(_) => {
            Decision::new(Action::Deny, "configuration error", None, 0.8)
        }
        SuperegoError::Validation(_) => Decision::new(Action::Deny, "request failed validation", None, 0.8),
        SuperegoError::AiServiceUnavailable(_) => {
            Decision::new(Action::Allow, "AI evaluation unavailable; failing open", None, 0.25)
        }
        SuperegoError::AiResponseInvalid(_) => {
            Decision::new(Action::Allow, "AI evaluation unavailable; failing open", None, 0.2)
        }
        SuperegoError::Cancelled => Decision::new(Action::Deny, "evaluation cancelled", None, 0.9),
        SuperegoError::Unexpected(_) => Decision::new(Action::Deny, "unexpected internal error", None, 0.9),
    }
}

/// Map a sampler-reported [`UnavailableReason`] to its fail-open
/// `Decision`, attributing it to the `sample` rule that triggered the AI
/// call. Confidence sits in the `[0.2, 0.3]` band spec.md §4.8 allows for
/// AI-unavailability, biased toward the low end since the verdict is
/// entirely a fallback.
#[must_use]
pub fn unavailable_decision(reason: UnavailableReason, rule_id: &str) -> Decision {
    let (confidence, detail) = match reason {
        UnavailableReason::BreakerOpen => (0.2, "circuit breaker open"),
        UnavailableReason::Timeout => (0.25, "operation timed out"),
        UnavailableReason::ParseFailure => (0.2, "response could not be parsed"),
    };
    Decision::new(
        Action::Allow,
        format!("AI evaluation unavailable ({detail}); failing open"),
        Some(rule_id.to_string()),
        confidence,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_failure_is_fail_closed_deny() {
        let d = classify(&SuperegoError::Validation("bad tool_name".into()));
        assert_eq!(d.action, Action::Deny);
        assert!((d.confidence - 0.8).abs() < f64::EPSILON);
        assert!(!d.reason.contains("bad tool_name"), "internal detail must not leak into reason");
    }

    #[test]
    fn ai_unavailable_is_fail_open_allow() {
        let d = classify(&SuperegoError::AiServiceUnavailable("breaker open".into()));
        assert_eq!(d.action, Action::Allow);
        assert!(d.confidence >= 0.2 && d.confidence <= 0.3);
    }

    #[test]
    fn unexpected_is_fail_closed_deny_with_high_confidence() {
        let d = classify(&SuperegoError::Unexpected("panic caught".into()));
        assert_eq!(d.action, Action::Deny);
        assert!((d.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn breaker_open_unavailable_decision_mentions_ai_unavailable() {
        let d = unavailable_decision(UnavailableReason::BreakerOpen, "s1");
        assert_eq!(d.action, Action::Allow);
        assert!((d.confidence - 0.2).abs() < f64::EPSILON);
        assert_eq!(d.rule_id.as_deref(), Some("s1"));
        assert!(d.reason.contains("AI evaluation unavailable"));
    }
}
