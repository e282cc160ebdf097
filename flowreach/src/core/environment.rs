//! Settings environments and the graph keys derived from them.
//!
//! An [`Environment`] is the caller-supplied settings object that flow edge
//! predicates are evaluated against. The crate never interprets its schema:
//! predicates address values inside it by dotted path, and the cache
//! partitions computed data by a [`GraphKey`] hashed from its canonical form.

use super::error::Result;
use super::serialization::{canonical_json, hash_bytes};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Opaque settings used as predicate-evaluation context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment(Value);

impl Environment {
    /// Wraps a JSON settings value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Returns the underlying settings value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Resolves a dotted path (`"features.checkout"`, `"plans.0"`) against
    /// the settings. Numeric segments index into arrays.
    ///
    /// Returns `None` when any segment is missing. The empty path resolves to
    /// the root value.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(&self.0);
        }

        path.split('.').try_fold(&self.0, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Computes the cache partition key for this environment.
    ///
    /// Environments that differ only in object key order map to the same key.
    pub fn graph_key(&self) -> Result<GraphKey> {
        let canonical = canonical_json(&self.0)?;
        Ok(GraphKey::from_hash(hash_bytes(canonical.as_bytes())))
    }
}

impl From<Value> for Environment {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Stable identifier of a graph view: a hash of the canonical settings.
///
/// Rendered as 16 lowercase hex digits, which is also how it appears inside
/// storage keys.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphKey(String);

impl GraphKey {
    /// Builds a key from a settings hash.
    pub fn from_hash(hash: u64) -> Self {
        Self(format!("{:016x}", hash))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GraphKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for GraphKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for GraphKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GraphKey({})", self.0)
    }
}
