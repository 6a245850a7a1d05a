//! The compiled, immutable [`Rule`] shape and the field-extraction layer
//! that connects a [`pattern_engine::Condition`] to a [`ToolRequest`].

use pattern_engine::Condition;
use serde::Serialize;
use serde_json::Value;
use superego_core::ToolRequest;

/// The request field a compiled condition is matched against. The rule
/// document format's `conditions` map has one key per field; a rule's
/// fields are implicitly ANDed (every named field's condition must hold).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// `tool_name`.
    ToolName,
    /// `parameters` (the whole heterogeneous bag; JSONPath conditions dig
    /// into it).
    Parameters,
    /// `cwd`.
    Cwd,
    /// `session_id`.
    SessionId,
    /// `agent_id`.
    AgentId,
}

impl Field {
    /// Parse a rule document's field-name key.
    pub(crate) fn parse(name: &str) -> Option<Self> {
        match name {
            "tool_name" => Some(Self::ToolName),
            "parameters" => Some(Self::Parameters),
            "cwd" => Some(Self::Cwd),
            "session_id" => Some(Self::SessionId),
            "agent_id" => Some(Self::AgentId),
            _ => None,
        }
    }

    /// Extract this field's value from a request, as a `serde_json::Value`
    /// a [`Condition`] can be matched against. `None` means the field was
    /// absent (the optional identifiers, when unset).
    #[must_use]
    pub fn extract(self, request: &ToolRequest) -> Option<Value> {
        match self {
            Self::ToolName => Some(Value::String(request.tool_name.clone())),
            Self::Parameters => Some(request.parameters.clone()),
            Self::Cwd => request.cwd.clone().map(Value::String),
            Self::SessionId => request.session_id.clone().map(Value::String),
            Self::AgentId => request.agent_id.clone().map(Value::String),
        }
    }
}

/// The action a matched [`Rule`] prescribes. Distinct from
/// `superego_core::Action`: `Sample` never surfaces past the Decision
/// Engine, which resolves it via the AI Sampler before producing a
/// `Decision`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Permit the tool call outright.
    Allow,
    /// Block the tool call outright.
    Deny,
    /// Defer the verdict to the AI Sampler.
    Sample,
}

/// One compiled, frozen policy entry. Built only by
/// [`crate::compile::compile`]; every pattern inside `fields` is already
/// validated and pre-compiled, so matching a `Rule` never fails.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Unique id (uniqueness enforced at compile time).
    pub id: String,
    /// `[0, 999]`, lower binds tighter.
    pub priority: u16,
    /// Position in the source document; the tie-break when two rules
    /// share a priority.
    pub load_order: usize,
    /// Per-field conditions, implicitly ANDed.
    pub fields: Vec<(Field, Condition)>,
    /// The verdict this rule prescribes when matched.
    pub action: RuleAction,
    /// Human-readable explanation surfaced on match.
    pub reason: Option<String>,
    /// Free text embedded in the LLM prompt when `action == Sample`.
    pub sampling_guidance: Option<String>,
}

impl Rule {
    /// Whether every one of this rule's field conditions holds for
    /// `request`.
    #[must_use]
    pub fn matches(&self, request: &ToolRequest) -> bool {
        self.fields.iter().all(|(field, condition)| condition.matches(field.extract(request).as_ref()))
    }
}

/// An ordered, immutable rule set: the unit of atomic replacement in
/// [`crate::store::PolicyStore`]. Rules are sorted by `(priority asc,
/// load_order asc)` once, at compile time, so a walk in document order is
/// already the correct precedence order.
#[derive(Debug, Clone, Default)]
pub struct PolicySnapshot {
    pub(crate) rules: Vec<Rule>,
}

impl PolicySnapshot {
    /// The compiled rules, in match-precedence order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Walk the snapshot in order and return the first matching rule, if
    /// any. Deterministic: ties are impossible here because `rules` is
    /// already sorted by `(priority, load_order)`.
    #[must_use]
    pub fn first_match(&self, request: &ToolRequest) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.matches(request))
    }
}
