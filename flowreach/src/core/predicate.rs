//! Edge predicates.
//!
//! A flow edge is only traversable when its [`Predicate`] holds for the
//! caller's [`Environment`]. Predicates are plain data (tagged variants) so
//! they can be stored next to the edge in the relational store and
//! evaluated without any dynamic dispatch over settings shapes.

use super::environment::Environment;
use super::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Guard attached to a flow edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Holds when every child holds. An empty conjunction holds.
    And(Vec<Predicate>),
    /// Holds when any child holds. An empty disjunction does not hold.
    Or(Vec<Predicate>),
    /// Negates the child.
    Not(Box<Predicate>),
    /// A primitive condition on the settings.
    Leaf(Condition),
}

/// Primitive settings conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Always,
    Never,
    /// The value at `path` equals `value`.
    Equals { path: String, value: Value },
    /// The value at `path` exists and is truthy.
    Truthy { path: String },
    /// The value at `path` equals one of `values`.
    OneOf { path: String, values: Vec<Value> },
}

impl Predicate {
    /// A predicate that always holds.
    pub fn always() -> Self {
        Self::Leaf(Condition::Always)
    }

    /// A predicate that never holds.
    pub fn never() -> Self {
        Self::Leaf(Condition::Never)
    }

    /// Shorthand for `Leaf(Equals { .. })`.
    pub fn equals(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Leaf(Condition::Equals {
            path: path.into(),
            value: value.into(),
        })
    }

    /// Shorthand for `Leaf(Truthy { .. })`.
    pub fn truthy(path: impl Into<String>) -> Self {
        Self::Leaf(Condition::Truthy { path: path.into() })
    }

    /// Shorthand for `Not(..)`.
    pub fn negate(inner: Predicate) -> Self {
        Self::Not(Box::new(inner))
    }

    /// Evaluates the predicate against the settings.
    pub fn evaluate(&self, env: &Environment) -> bool {
        match self {
            Predicate::And(children) => children.iter().all(|p| p.evaluate(env)),
            Predicate::Or(children) => children.iter().any(|p| p.evaluate(env)),
            Predicate::Not(inner) => !inner.evaluate(env),
            Predicate::Leaf(condition) => condition.evaluate(env),
        }
    }

    /// Checks every settings path the predicate reads.
    ///
    /// The empty path addresses the whole settings value. Any other path must
    /// consist of non-empty dot-separated segments.
    pub fn validate(&self) -> Result<()> {
        match self {
            Predicate::And(children) | Predicate::Or(children) => {
                children.iter().try_for_each(Predicate::validate)
            }
            Predicate::Not(inner) => inner.validate(),
            Predicate::Leaf(condition) => match condition.path() {
                Some(path) if !path.is_empty() && path.split('.').any(str::is_empty) => {
                    Err(CoreError::InvalidPredicatePath(path.to_string()))
                }
                _ => Ok(()),
            },
        }
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Self::always()
    }
}

impl Condition {
    fn path(&self) -> Option<&str> {
        match self {
            Condition::Always | Condition::Never => None,
            Condition::Equals { path, .. }
            | Condition::Truthy { path }
            | Condition::OneOf { path, .. } => Some(path),
        }
    }

    fn evaluate(&self, env: &Environment) -> bool {
        match self {
            Condition::Always => true,
            Condition::Never => false,
            Condition::Equals { path, value } => env.lookup(path) == Some(value),
            Condition::Truthy { path } => env.lookup(path).is_some_and(is_truthy),
            Condition::OneOf { path, values } => env
                .lookup(path)
                .is_some_and(|found| values.iter().any(|v| v == found)),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
