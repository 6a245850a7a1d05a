//! Parse → compile → validate → sort, per spec.md §4.2's load sequence.
//!
//! [`compile`] never bails on the first error: it collects every problem
//! across the whole document (duplicate ids, out-of-range priorities,
//! pattern compile failures) and returns them together, so a rule author
//! sees every mistake in one pass.

use std::collections::HashSet;

use pattern_engine::{Condition, CompositeOp, NumericOp, PatternError};
use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use thiserror::Error;

use crate::rule::{Field, Rule, RuleAction};
use crate::PolicySnapshot;

const MIN_PRIORITY: i64 = 0;
const MAX_PRIORITY: i64 = 999;

/// A raw rule document, deserialized straight from YAML before any
/// condition compilation happens.
#[derive(Debug, Deserialize)]
pub struct RuleDocument {
    /// The declarative rules, in file order.
    pub rules: Vec<RuleSpec>,
}

/// One rule entry as written in the document, before compilation.
#[derive(Debug, Deserialize)]
pub struct RuleSpec {
    id: String,
    priority: i64,
    #[serde(default)]
    conditions: serde_yaml::Mapping,
    action: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    sampling_guidance: Option<String>,
}

/// Everything that can go wrong compiling a [`RuleDocument`]. Raised only
/// at load time; a compiled [`Rule`] can never produce one of these.
#[derive(Debug, Error, Clone)]
pub enum CompileError {
    /// The document could not be parsed as YAML at all.
    #[error("malformed rule document: {0}")]
    Malformed(String),
    /// Two rules declared the same `id`.
    #[error("duplicate rule id '{0}'")]
    DuplicateId(String),
    /// `priority` fell outside `[0, 999]`.
    #[error("rule '{id}' priority {priority} is out of range [0, 999]")]
    PriorityOutOfRange {
        /// The offending rule's id.
        id: String,
        /// The declared priority.
        priority: i64,
    },
    /// `action` was not one of `allow`, `deny`, `sample`.
    #[error("rule '{id}' has invalid action '{action}' (expected allow|deny|sample)")]
    InvalidAction {
        /// The offending rule's id.
        id: String,
        /// The declared action string.
        action: String,
    },
    /// A `conditions` key was not a recognized request field name.
    #[error("rule '{id}' references unknown field '{field}'")]
    UnknownField {
        /// The offending rule's id.
        id: String,
        /// The unrecognized field name.
        field: String,
    },
    /// A pattern (regex/glob/jsonpath) failed to compile.
    #[error("rule '{id}': {source}")]
    Pattern {
        /// The offending rule's id.
        id: String,
        /// The underlying compile failure.
        #[source]
        source: PatternError,
    },
    /// A condition object was malformed (unrecognized shape, missing
    /// sub-keys, etc).
    #[error("rule '{id}': invalid condition: {detail}")]
    InvalidCondition {
        /// The offending rule's id.
        id: String,
        /// What was wrong with it.
        detail: String,
    },
}

/// Parse a YAML document's bytes into a [`RuleDocument`].
pub fn parse_document(yaml: &str) -> Result<RuleDocument, CompileError> {
    serde_yaml::from_str(yaml).map_err(|e| CompileError::Malformed(e.to_string()))
}

/// Compile a parsed [`RuleDocument`] into an immutable [`PolicySnapshot`].
///
/// Per spec.md §4.2: collect every error before bailing; a failed compile
/// never partially populates a snapshot.
pub fn compile(document: RuleDocument) -> Result<PolicySnapshot, Vec<CompileError>> {
    let mut errors = Vec::new();
    let mut seen_ids = HashSet::new();
    let mut rules = Vec::with_capacity(document.rules.len());

    for (load_order, spec) in document.rules.into_iter().enumerate() {
        match compile_rule(spec, load_order) {
            Ok(rule) => {
                if !seen_ids.insert(rule.id.clone()) {
                    errors.push(CompileError::DuplicateId(rule.id.clone()));
                }
                rules.push(rule);
            }
            Err(errs) => errors.extend(errs),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    rules.sort_by_key(|r| (r.priority, r.load_order));
    Ok(PolicySnapshot { rules })
}

fn compile_rule(spec: RuleSpec, load_order: usize) -> Result<Rule, Vec<CompileError>> {
    let mut errors = Vec::new();

    if spec.priority < MIN_PRIORITY || spec.priority > MAX_PRIORITY {
        errors.push(CompileError::PriorityOutOfRange { id: spec.id.clone(), priority: spec.priority });
    }

    let action = match spec.action.as_str() {
        "allow" => Some(RuleAction::Allow),
        "deny" => Some(RuleAction::Deny),
        "sample" => Some(RuleAction::Sample),
        other => {
            errors.push(CompileError::InvalidAction { id: spec.id.clone(), action: other.to_string() });
            None
        }
    };

    let mut fields = Vec::with_capacity(spec.conditions.len());
    for (key, value) in &spec.conditions {
        let Some(field_name) = key.as_str() else {
            errors.push(CompileError::InvalidCondition { id: spec.id.clone(), detail: "condition key must be a string".into() });
            continue;
        };
        let Some(field) = Field::parse(field_name) else {
            errors.push(CompileError::UnknownField { id: spec.id.clone(), field: field_name.to_string() });
            continue;
        };
        match parse_condition(value) {
            Ok(condition) => fields.push((field, condition)),
            Err(PatternOrShape::Pattern(source)) => errors.push(CompileError::Pattern { id: spec.id.clone(), source }),
            Err(PatternOrShape::Shape(detail)) => errors.push(CompileError::InvalidCondition { id: spec.id.clone(), detail }),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(Rule {
        id: spec.id,
        priority: spec.priority as u16,
        load_order,
        fields,
        action: action.expect("validated above"),
        reason: spec.reason,
        sampling_guidance: spec.sampling_guidance,
    })
}

enum PatternOrShape {
    Pattern(PatternError),
    Shape(String),
}

impl From<PatternError> for PatternOrShape {
    fn from(e: PatternError) -> Self {
        Self::Pattern(e)
    }
}

/// Parse one condition value. A bare scalar is `exact`; a single-key
/// mapping dispatches on its key (`oneOf`, `regex`, `glob`, `jsonpath`,
/// `numeric`, `and`, `or`, `not`) — the same discriminated-by-key idiom
/// the rest of the rule document format uses.
fn parse_condition(value: &YamlValue) -> Result<Condition, PatternOrShape> {
    match value {
        YamlValue::Mapping(map) if map.len() == 1 => {
            let (key, inner) = map.iter().next().expect("len == 1");
            let Some(key) = key.as_str() else {
                return Err(PatternOrShape::Shape("condition object key must be a string".into()));
            };
            match key {
                "oneOf" => {
                    let values = inner
                        .as_sequence()
                        .ok_or_else(|| PatternOrShape::Shape("oneOf expects a list".into()))?
                        .iter()
                        .map(yaml_to_json)
                        .collect();
                    Ok(Condition::one_of(values))
                }
                "regex" => {
                    let pattern = inner.as_str().ok_or_else(|| PatternOrShape::Shape("regex expects a string pattern".into()))?;
                    Ok(Condition::regex(pattern)?)
                }
                "glob" => {
                    let pattern = inner.as_str().ok_or_else(|| PatternOrShape::Shape("glob expects a string pattern".into()))?;
                    Ok(Condition::glob(pattern)?)
                }
                "jsonpath" => parse_jsonpath(inner),
                "numeric" => parse_numeric(inner),
                "and" => parse_composite(CompositeOp::And, inner),
                "or" => parse_composite(CompositeOp::Or, inner),
                "not" => {
                    let child = parse_condition(inner)?;
                    Condition::composite(CompositeOp::Not, vec![child]).map_err(Into::into)
                }
                other => Err(PatternOrShape::Shape(format!("unrecognized condition key '{other}'"))),
            }
        }
        YamlValue::Mapping(_) => Err(PatternOrShape::Shape("condition object must have exactly one key".into())),
        scalar => Ok(Condition::exact(yaml_to_json(scalar))),
    }
}

fn parse_jsonpath(inner: &YamlValue) -> Result<Condition, PatternOrShape> {
    let map = inner.as_mapping().ok_or_else(|| PatternOrShape::Shape("jsonpath expects {expr, inner}".into()))?;
    let expr = map
        .get("expr")
        .and_then(YamlValue::as_str)
        .ok_or_else(|| PatternOrShape::Shape("jsonpath requires a string 'expr'".into()))?;
    let inner_spec = map.get("inner").ok_or_else(|| PatternOrShape::Shape("jsonpath requires an 'inner' condition".into()))?;
    let inner_condition = parse_condition(inner_spec)?;
    Ok(Condition::jsonpath(expr, inner_condition)?)
}

fn parse_numeric(inner: &YamlValue) -> Result<Condition, PatternOrShape> {
    let map = inner.as_mapping().ok_or_else(|| PatternOrShape::Shape("numeric expects {op, value}".into()))?;
    let op = map
        .get("op")
        .and_then(YamlValue::as_str)
        .ok_or_else(|| PatternOrShape::Shape("numeric requires a string 'op'".into()))?;
    let value = map
        .get("value")
        .and_then(YamlValue::as_f64)
        .ok_or_else(|| PatternOrShape::Shape("numeric requires a numeric 'value'".into()))?;
    let op = match op {
        "<" => NumericOp::Lt,
        "<=" | "\u{2264}" => NumericOp::Le,
        "=" | "==" => NumericOp::Eq,
        ">=" | "\u{2265}" => NumericOp::Ge,
        ">" => NumericOp::Gt,
        other => return Err(PatternOrShape::Shape(format!("unrecognized numeric operator '{other}'"))),
    };
    Ok(Condition::numeric(op, value))
}

fn parse_composite(op: CompositeOp, inner: &YamlValue) -> Result<Condition, PatternOrShape> {
    let children = inner.as_sequence().ok_or_else(|| PatternOrShape::Shape(format!("{op:?} expects a list of conditions")))?;
    let compiled: Result<Vec<Condition>, PatternOrShape> = children.iter().map(parse_condition).collect();
    Condition::composite(op, compiled?).map_err(Into::into)
}

fn yaml_to_json(value: &YamlValue) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_exact_one_of_regex_and_jsonpath() {
        let yaml = r#"
rules:
  - id: r1
    priority: 1
    conditions:
      tool_name: { oneOf: ["rm", "sudo"] }
    action: deny
    reason: "dangerous"
  - id: r2
    priority: 5
    conditions:
      parameters:
        jsonpath:
          expr: "$.target.path"
          inner: { glob: "/etc/**" }
    action: deny
"#;
        let doc = parse_document(yaml).unwrap();
        let snapshot = compile(doc).unwrap();
        assert_eq!(snapshot.rules().len(), 2);
        assert_eq!(snapshot.rules()[0].id, "r1");
    }

    #[test]
    fn rejects_out_of_range_priority_and_collects_other_errors() {
        let yaml = r#"
rules:
  - id: r1
    priority: 1000
    conditions:
      tool_name: rm
    action: bogus
"#;
        let doc = parse_document(yaml).unwrap();
        let errs = compile(doc).unwrap_err();
        assert_eq!(errs.len(), 2);
    }

    #[test]
    fn duplicate_ids_are_reported() {
        let yaml = r#"
rules:
  - id: dup
    priority: 1
    conditions:
      tool_name: a
    action: allow
  - id: dup
    priority: 2
    conditions:
      tool_name: b
    action: deny
"#;
        let doc = parse_document(yaml).unwrap();
        let errs = compile(doc).unwrap_err();
        assert!(matches!(errs[0], CompileError::DuplicateId(ref id) if id == "dup"));
    }

    #[test]
    fn invalid_regex_is_a_pattern_compile_error() {
        let yaml = r#"
rules:
  - id: r1
    priority: 1
    conditions:
      tool_name: { regex: "(unclosed" }
    action: deny
"#;
        let doc = parse_document(yaml).unwrap();
        let errs = compile(doc).unwrap_err();
        assert!(matches!(errs[0], CompileError::Pattern { .. }));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let yaml = r#"
rules:
  - id: r1
    priority: 1
    conditions:
      bogus_field: x
    action: allow
"#;
        let doc = parse_document(yaml).unwrap();
        let errs = compile(doc).unwrap_err();
        assert!(matches!(errs[0], CompileError::UnknownField { .. }));
    }

    #[test]
    fn sorts_by_priority_then_load_order() {
        let yaml = r#"
rules:
  - id: first
    priority: 5
    conditions:
      tool_name: edit
    action: deny
  - id: second
    priority: 5
    conditions:
      tool_name: edit
    action: allow
  - id: third
    priority: 1
    conditions:
      tool_name: edit
    action: allow
"#;
        let doc = parse_document(yaml).unwrap();
        let snapshot = compile(doc).unwrap();
        let ids: Vec<&str> = snapshot.rules().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["third", "first", "second"]);
    }
}
