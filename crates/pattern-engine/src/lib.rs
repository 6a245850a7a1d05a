//! Compiled predicate matching: the Pattern Engine.
//!
//! A [`Condition`] is built once, at rule-load time, from its declarative
//! form (see the `policy` crate for the YAML mapping); every pattern it
//! contains (regex, glob, JSONPath) is pre-compiled so that [`Condition::matches`]
//! never parses, never allocates beyond what stringifying a field costs,
//! and never panics.

#![deny(unsafe_code)]

mod glob;
mod jsonpath;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

pub use jsonpath::JsonPathExpr;

/// Failure raised while compiling a [`Condition`]. Compilation errors are
/// the only way this crate ever produces an `Err` — matching itself is
/// infallible.
#[derive(Debug, Error, Clone)]
pub enum PatternError {
    /// The `regex` crate rejected the pattern.
    #[error("invalid regex pattern '{0}'")]
    InvalidRegex(String),
    /// The JSONPath expression could not be parsed.
    #[error("invalid jsonpath expression: {0}")]
    InvalidJsonPath(String),
    /// A composite condition was given zero children, or `NOT` was given
    /// more than one.
    #[error("invalid composite condition: {0}")]
    InvalidComposite(String),
}

/// The comparison operator for a [`Condition::Numeric`] predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `==`
    Eq,
    /// `>=`
    Ge,
    /// `>`
    Gt,
}

impl NumericOp {
    fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Eq => (lhs - rhs).abs() < f64::EPSILON,
            Self::Ge => lhs >= rhs,
            Self::Gt => lhs > rhs,
        }
    }
}

/// The combinator for a [`Condition::Composite`] predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOp {
    /// All children must match.
    And,
    /// At least one child must match.
    Or,
    /// Exactly one child; its result is inverted.
    Not,
}

/// A single compiled predicate over one field's value.
///
/// `Condition`s nest (via [`CompositeOp`] and the `inner` of a JSONPath
/// condition) but always resolve down to a judgment about one
/// already-extracted `serde_json::Value` — matching never has any notion
/// of "which field" beyond what its caller already extracted.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Equality against a literal value.
    Exact(Value),
    /// Membership in a small set of literal values.
    OneOf(Vec<Value>),
    /// A pre-compiled regular expression, applied to the stringified field.
    Regex(Box<Regex>),
    /// A pre-validated glob pattern, applied to the stringified field.
    Glob(String),
    /// A compiled JSONPath selector; `inner` is applied to every extracted
    /// node and the results are combined with OR.
    JsonPath {
        /// The compiled path expression.
        expr: JsonPathExpr,
        /// The condition applied to each extracted node.
        inner: Box<Condition>,
    },
    /// A numeric comparison; the field is coerced to `f64` first.
    Numeric(NumericOp, f64),
    /// A boolean combinator over nested conditions.
    Composite(CompositeOp, Vec<Condition>),
}

impl Condition {
    /// Build an [`Condition::Exact`] condition.
    #[must_use]
    pub fn exact(value: Value) -> Self {
        Self::Exact(value)
    }

    /// Build a [`Condition::OneOf`] condition.
    #[must_use]
    pub fn one_of(values: Vec<Value>) -> Self {
        Self::OneOf(values)
    }

    /// Compile a [`Condition::Regex`] condition, failing at load time if
    /// the pattern does not compile.
    pub fn regex(pattern: &str) -> Result<Self, PatternError> {
        let re = Regex::new(pattern).map_err(|e| PatternError::InvalidRegex(e.to_string()))?;
        Ok(Self::Regex(Box::new(re)))
    }

    /// Build a [`Condition::Glob`] condition. Glob patterns have no
    /// compile-time failure mode beyond being non-empty.
    pub fn glob(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(PatternError::InvalidComposite("glob pattern must not be empty".into()));
        }
        Ok(Self::Glob(pattern.to_string()))
    }

    /// Compile a [`Condition::JsonPath`] condition.
    pub fn jsonpath(expr: &str, inner: Condition) -> Result<Self, PatternError> {
        let expr = JsonPathExpr::compile(expr)?;
        Ok(Self::JsonPath { expr, inner: Box::new(inner) })
    }

    /// Build a [`Condition::Numeric`] condition.
    #[must_use]
    pub fn numeric(op: NumericOp, value: f64) -> Self {
        Self::Numeric(op, value)
    }

    /// Build a [`Condition::Composite`] condition. `Not` requires exactly
    /// one child; `And`/`Or` require at least one.
    pub fn composite(op: CompositeOp, children: Vec<Condition>) -> Result<Self, PatternError> {
        if children.is_empty() {
            return Err(PatternError::InvalidComposite("composite condition needs at least one child".into()));
        }
        if op == CompositeOp::Not && children.len() != 1 {
            return Err(PatternError::InvalidComposite(format!(
                "NOT takes exactly one child, got {}",
                children.len()
            )));
        }
        Ok(Self::Composite(op, children))
    }

    /// Evaluate this condition against `value` (`None` means the field
    /// was absent from the request). Never panics, never allocates beyond
    /// stringifying the field for `Regex`/`Glob`.
    #[must_use]
    pub fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Self::Composite(CompositeOp::Not, children) => !children[0].matches(value),
            Self::Composite(CompositeOp::And, children) => children.iter().all(|c| c.matches(value)),
            Self::Composite(CompositeOp::Or, children) => children.iter().any(|c| c.matches(value)),
            _ => {
                let Some(value) = value else { return false };
                self.matches_present(value)
            }
        }
    }

    fn matches_present(&self, value: &Value) -> bool {
        match self {
            Self::Exact(expected) => value == expected,
            Self::OneOf(options) => options.contains(value),
            Self::Regex(re) => re.is_match(&stringify(value)),
            Self::Glob(pattern) => glob::glob_match(pattern, &stringify(value)),
            Self::JsonPath { expr, inner } => expr.extract(value).iter().any(|node| inner.matches(Some(node))),
            Self::Numeric(op, target) => match coerce_number(value) {
                Some(n) => op.apply(n, *target),
                None => false,
            },
            Self::Composite(..) => unreachable!("composite handled in matches()"),
        }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exact_matches_equal_value_only() {
        let c = Condition::exact(json!("rm"));
        assert!(c.matches(Some(&json!("rm"))));
        assert!(!c.matches(Some(&json!("sudo"))));
        assert!(!c.matches(None));
    }

    #[test]
    fn one_of_checks_membership() {
        let c = Condition::one_of(vec![json!("rm"), json!("sudo")]);
        assert!(c.matches(Some(&json!("sudo"))));
        assert!(!c.matches(Some(&json!("ls"))));
    }

    #[test]
    fn regex_matches_stringified_field() {
        let c = Condition::regex(r"^\d{3}-\d{2}-\d{4}$").unwrap();
        assert!(c.matches(Some(&json!("123-45-6789"))));
        assert!(!c.matches(Some(&json!("abc"))));
    }

    #[test]
    fn invalid_regex_is_a_compile_error() {
        assert!(Condition::regex("(unclosed").is_err());
    }

    #[test]
    fn glob_excludes_separator_for_single_star() {
        let c = Condition::glob("/etc/*").unwrap();
        assert!(c.matches(Some(&json!("/etc/passwd"))));
        assert!(!c.matches(Some(&json!("/etc/ssh/sshd_config"))));
    }

    #[test]
    fn double_star_glob_crosses_separators() {
        let c = Condition::glob("/etc/**").unwrap();
        assert!(c.matches(Some(&json!("/etc/ssh/sshd_config"))));
    }

    #[test]
    fn jsonpath_applies_inner_to_each_node_with_or() {
        let inner = Condition::glob("/etc/**").unwrap();
        let c = Condition::jsonpath("$.target.path", inner).unwrap();
        let params = json!({"target": {"path": "/etc/shadow"}});
        assert!(c.matches(Some(&params)));

        let ok_params = json!({"target": {"path": "/tmp/ok"}});
        assert!(!c.matches(Some(&ok_params)));
    }

    #[test]
    fn jsonpath_with_no_extracted_nodes_is_no_match() {
        let inner = Condition::exact(json!("x"));
        let c = Condition::jsonpath("$.missing", inner).unwrap();
        assert!(!c.matches(Some(&json!({"other": 1}))));
    }

    #[test]
    fn numeric_coerces_string_and_rejects_non_numeric() {
        let c = Condition::numeric(NumericOp::Ge, 18.0);
        assert!(c.matches(Some(&json!(21))));
        assert!(c.matches(Some(&json!("21"))));
        assert!(!c.matches(Some(&json!("adult"))));
    }

    #[test]
    fn composite_and_short_circuits() {
        let c = Condition::composite(
            CompositeOp::And,
            vec![Condition::exact(json!("a")), Condition::exact(json!("b"))],
        )
        .unwrap();
        assert!(!c.matches(Some(&json!("a"))));
    }

    #[test]
    fn composite_or_matches_any_child() {
        let c = Condition::composite(
            CompositeOp::Or,
            vec![Condition::exact(json!("a")), Condition::exact(json!("b"))],
        )
        .unwrap();
        assert!(c.matches(Some(&json!("b"))));
    }

    #[test]
    fn not_over_missing_field_is_true() {
        let c = Condition::composite(CompositeOp::Not, vec![Condition::exact(json!("a"))]).unwrap();
        assert!(c.matches(None));
    }

    #[test]
    fn not_requires_exactly_one_child() {
        let err = Condition::composite(CompositeOp::Not, vec![Condition::exact(json!("a")), Condition::exact(json!("b"))]);
        assert!(err.is_err());
    }

    #[test]
    fn composite_requires_at_least_one_child() {
        assert!(Condition::composite(CompositeOp::And, vec![]).is_err());
    }
}
