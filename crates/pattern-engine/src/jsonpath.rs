//! A minimal JSONPath subset: `$`, `.field`, `[index]`, and `[*]`.
//!
//! This covers every shape the rule document format uses (field access
//! through nested objects, array indexing, and array wildcards) without
//! pulling in a full JSONPath grammar. Anything outside that subset is a
//! compile-time `PatternError`, never a silent partial match.

use serde_json::Value;

use crate::PatternError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Field(String),
    Index(usize),
    Wildcard,
}

/// A parsed, ready-to-evaluate JSONPath expression.
#[derive(Debug, Clone)]
pub struct JsonPathExpr {
    raw: String,
    segments: Vec<Segment>,
}

impl JsonPathExpr {
    /// Parse and validate a JSONPath expression, e.g. `$.target.path` or
    /// `$.items[*].name`.
    pub fn compile(expr: &str) -> Result<Self, PatternError> {
        let rest = expr
            .strip_prefix('$')
            .ok_or_else(|| PatternError::InvalidJsonPath(format!("expression must start with '$': {expr}")))?;

        let mut segments = Vec::new();
        let chars: Vec<char> = rest.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '.' => {
                    i += 1;
                    let start = i;
                    while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                        i += 1;
                    }
                    if i == start {
                        return Err(PatternError::InvalidJsonPath(format!("empty field name in {expr}")));
                    }
                    segments.push(Segment::Field(chars[start..i].iter().collect()));
                }
                '[' => {
                    let close = chars[i..]
                        .iter()
                        .position(|&c| c == ']')
                        .map(|p| p + i)
                        .ok_or_else(|| PatternError::InvalidJsonPath(format!("unterminated '[' in {expr}")))?;
                    let inner: String = chars[i + 1..close].iter().collect();
                    if inner == "*" {
                        segments.push(Segment::Wildcard);
                    } else {
                        let idx = inner
                            .parse::<usize>()
                            .map_err(|_| PatternError::InvalidJsonPath(format!("bad index '{inner}' in {expr}")))?;
                        segments.push(Segment::Index(idx));
                    }
                    i = close + 1;
                }
                other => {
                    return Err(PatternError::InvalidJsonPath(format!(
                        "unexpected character '{other}' in {expr}"
                    )));
                }
            }
        }

        Ok(Self { raw: expr.to_string(), segments })
    }

    /// Return the original expression text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Extract every node the path selects, in document order. Missing
    /// intermediate fields or out-of-range indices simply contribute no
    /// nodes, rather than erroring.
    #[must_use]
    pub fn extract<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![root];
        for seg in &self.segments {
            let mut next = Vec::new();
            for value in current {
                match seg {
                    Segment::Field(name) => {
                        if let Some(v) = value.get(name.as_str()) {
                            next.push(v);
                        }
                    }
                    Segment::Index(idx) => {
                        if let Some(v) = value.get(*idx) {
                            next.push(v);
                        }
                    }
                    Segment::Wildcard => match value {
                        Value::Array(items) => next.extend(items.iter()),
                        Value::Object(map) => next.extend(map.values()),
                        _ => {}
                    },
                }
            }
            current = next;
        }
        current
    }
}
