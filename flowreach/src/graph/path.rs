//! Flow paths
//!
//! A [`FlowPath`] is an ordered sequence of flow slugs where each consecutive
//! pair is connected by a traversable edge. Paths are stored in natural
//! (edge-direction) orientation and compared by length first, then
//! lexicographically by node sequence, which is the order pagination relies on.

use super::FlowSlug;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Ordered sequence of flow slugs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowPath(Vec<FlowSlug>);

impl FlowPath {
    /// Creates a path from its nodes.
    pub fn new(nodes: Vec<FlowSlug>) -> Self {
        Self(nodes)
    }

    /// Returns the nodes of the path.
    pub fn nodes(&self) -> &[FlowSlug] {
        &self.0
    }

    /// Number of transitions in the path (`nodes - 1`).
    pub fn steps(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    /// First node of the path.
    pub fn first(&self) -> Option<&FlowSlug> {
        self.0.first()
    }

    /// Last node of the path.
    pub fn last(&self) -> Option<&FlowSlug> {
        self.0.last()
    }

    /// Returns the path traversed in the opposite direction.
    pub fn reversed(&self) -> Self {
        Self(self.0.iter().rev().cloned().collect())
    }

    /// Consumes the path, returning its nodes.
    pub fn into_nodes(self) -> Vec<FlowSlug> {
        self.0
    }
}

impl Ord for FlowPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for FlowPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FlowPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}", node)?;
        }
        Ok(())
    }
}

impl fmt::Debug for FlowPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FlowPath[{}]", self)
    }
}

impl FromIterator<FlowSlug> for FlowPath {
    fn from_iter<I: IntoIterator<Item = FlowSlug>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
