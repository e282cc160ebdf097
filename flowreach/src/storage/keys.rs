//! Layout of the coordination store's key space.

use crate::core::GraphKey;
use crate::graph::FlowSlug;
use std::fmt;

/// Default prefix for every key the engine writes.
pub const DEFAULT_KEY_PREFIX: &str = "flowreach";

/// Identifies one cached reachability entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub graph_key: GraphKey,
    pub source: FlowSlug,
    pub inverted: bool,
}

impl EntryKey {
    pub fn new(graph_key: GraphKey, source: FlowSlug, inverted: bool) -> Self {
        Self {
            graph_key,
            source,
            inverted,
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.graph_key, self.source, self.inverted)
    }
}

/// Builds prefixed store keys.
///
/// ```
/// use flowreach::core::GraphKey;
/// use flowreach::graph::FlowSlug;
/// use flowreach::storage::{EntryKey, KeySpace};
///
/// let keys = KeySpace::default();
/// let gk = GraphKey::from("00ff");
/// assert_eq!(keys.lock(&gk), "flowreach:lock:00ff");
///
/// let entry = EntryKey::new(gk, FlowSlug::new("login"), true);
/// assert_eq!(keys.entry(&entry), "flowreach:reach:00ff:login:true");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Lease record (hash).
    pub fn lock(&self, graph_key: &GraphKey) -> String {
        format!("{}:lock:{}", self.prefix, graph_key)
    }

    /// Fencing token counter (int).
    pub fn fence(&self, graph_key: &GraphKey) -> String {
        format!("{}:fence:{}", self.prefix, graph_key)
    }

    /// Version counter (int).
    pub fn version(&self, graph_key: &GraphKey) -> String {
        format!("{}:version:{}", self.prefix, graph_key)
    }

    /// Serialized reachability entry.
    pub fn entry(&self, key: &EntryKey) -> String {
        format!("{}:reach:{}", self.prefix, key)
    }

    /// Pub/sub channel for lock and invalidation events.
    pub fn events(&self, graph_key: &GraphKey) -> String {
        format!("{}:events:{}", self.prefix, graph_key)
    }

    /// Set of every graph key seen.
    pub fn known_keys(&self) -> String {
        format!("{}:keys", self.prefix)
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}
