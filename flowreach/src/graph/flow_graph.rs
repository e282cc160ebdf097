//! FlowGraph - the client flow transition graph
//!
//! This module provides the core data structure for representing client flows
//! and the predicate-gated transitions between them.
//!
//! # Design
//!
//! Edges are stored once, canonically, in their declared direction. Each node
//! keeps index lists into that edge set for both directions:
//! - `outgoing`: edges leaving this flow (natural direction)
//! - `incoming`: edges entering this flow (used by inverted queries)
//!
//! A [`GraphView`] is the graph as seen by one [`Environment`] in one
//! [`Direction`]: only edges whose predicate holds, already oriented for
//! traversal, with neighbours in slug order so traversals are deterministic.

use super::error::{GraphError, GraphResult};
use super::FlowSlug;
use crate::core::{CoreError, Environment, Predicate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Query direction over the canonical edge set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Follow edges from source to target.
    Natural,
    /// Follow edges from target back to source.
    Inverted,
}

impl Direction {
    /// Maps the wire-level `inverted` flag to a direction.
    pub fn from_inverted(inverted: bool) -> Self {
        if inverted {
            Direction::Inverted
        } else {
            Direction::Natural
        }
    }

    /// Returns true for [`Direction::Inverted`].
    pub fn is_inverted(&self) -> bool {
        matches!(self, Direction::Inverted)
    }
}

/// A directed, predicate-gated transition between two flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEdge {
    pub source: FlowSlug,
    pub target: FlowSlug,
    #[serde(default)]
    pub predicate: Predicate,
}

impl FlowEdge {
    /// Creates an edge guarded by `predicate`.
    pub fn new(source: FlowSlug, target: FlowSlug, predicate: Predicate) -> Self {
        Self {
            source,
            target,
            predicate,
        }
    }

    /// Creates an edge that is always traversable.
    pub fn unconditional(source: FlowSlug, target: FlowSlug) -> Self {
        Self::new(source, target, Predicate::always())
    }

    /// Checks the edge on its own, without regard to which flows exist.
    ///
    /// Rejects self-loops and predicates that read malformed settings paths.
    pub fn validate(&self) -> GraphResult<()> {
        if self.source == self.target {
            return Err(GraphError::self_loop(self.source.clone()));
        }
        if let Err(CoreError::InvalidPredicatePath(path)) = self.predicate.validate() {
            return Err(GraphError::InvalidPredicate {
                source_slug: self.source.clone(),
                target: self.target.clone(),
                path,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct FlowNode {
    outgoing: Vec<usize>,
    incoming: Vec<usize>,
}

/// The complete flow graph as stored in the relational store.
///
/// # Example
///
/// ```
/// use flowreach::{Direction, FlowEdge, FlowGraph, FlowSlug};
/// use flowreach::core::Environment;
///
/// let mut graph = FlowGraph::new();
/// graph.add_flow(FlowSlug::new("a")).unwrap();
/// graph.add_flow(FlowSlug::new("b")).unwrap();
/// graph
///     .add_edge(FlowEdge::unconditional(FlowSlug::new("a"), FlowSlug::new("b")))
///     .unwrap();
///
/// let view = graph.view(&Environment::default(), Direction::Inverted);
/// assert_eq!(view.neighbours(&FlowSlug::new("b")), &[FlowSlug::new("a")]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    nodes: BTreeMap<FlowSlug, FlowNode>,
    edges: Vec<FlowEdge>,
}

impl FlowGraph {
    /// Creates an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from node and edge lists, as loaded from storage.
    pub fn from_parts(
        flows: impl IntoIterator<Item = FlowSlug>,
        edges: impl IntoIterator<Item = FlowEdge>,
    ) -> GraphResult<Self> {
        let mut graph = Self::new();
        for slug in flows {
            graph.add_flow(slug)?;
        }
        for edge in edges {
            graph.add_edge(edge)?;
        }
        Ok(graph)
    }

    /// Returns the number of flows in the graph
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no flows
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the number of stored edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Adds a flow node.
    ///
    /// Returns an error if a flow with the same slug already exists.
    pub fn add_flow(&mut self, slug: FlowSlug) -> GraphResult<()> {
        if self.nodes.contains_key(&slug) {
            return Err(GraphError::duplicate_flow(slug));
        }
        self.nodes.insert(slug, FlowNode::default());
        Ok(())
    }

    /// Adds an edge between two existing flows.
    ///
    /// Parallel edges between the same pair are allowed; the transition is
    /// traversable when any of them is.
    pub fn add_edge(&mut self, edge: FlowEdge) -> GraphResult<()> {
        edge.validate()?;
        for endpoint in [&edge.source, &edge.target] {
            if !self.nodes.contains_key(endpoint) {
                let missing = endpoint.clone();
                return Err(GraphError::dangling_edge(
                    edge.source.clone(),
                    edge.target.clone(),
                    missing,
                ));
            }
        }

        let index = self.edges.len();
        if let Some(node) = self.nodes.get_mut(&edge.source) {
            node.outgoing.push(index);
        }
        if let Some(node) = self.nodes.get_mut(&edge.target) {
            node.incoming.push(index);
        }
        self.edges.push(edge);
        Ok(())
    }

    /// Returns true if the flow exists in the graph
    pub fn contains_flow(&self, slug: &FlowSlug) -> bool {
        self.nodes.contains_key(slug)
    }

    /// Returns all flow slugs in slug order
    pub fn flows(&self) -> impl Iterator<Item = &FlowSlug> {
        self.nodes.keys()
    }

    /// Returns all stored edges in insertion order
    pub fn edges(&self) -> &[FlowEdge] {
        &self.edges
    }

    /// Returns the graph as seen under `env`, oriented for `direction`.
    pub fn view(&self, env: &Environment, direction: Direction) -> GraphView {
        let mut adjacency = BTreeMap::new();

        for (slug, node) in &self.nodes {
            let edge_ids = match direction {
                Direction::Natural => &node.outgoing,
                Direction::Inverted => &node.incoming,
            };

            let mut neighbours: Vec<FlowSlug> = edge_ids
                .iter()
                .map(|&i| &self.edges[i])
                .filter(|edge| edge.predicate.evaluate(env))
                .map(|edge| match direction {
                    Direction::Natural => edge.target.clone(),
                    Direction::Inverted => edge.source.clone(),
                })
                .collect();
            neighbours.sort();
            neighbours.dedup();

            adjacency.insert(slug.clone(), neighbours);
        }

        GraphView {
            direction,
            adjacency,
        }
    }
}

/// A filtered, oriented snapshot of a [`FlowGraph`].
#[derive(Debug, Clone)]
pub struct GraphView {
    direction: Direction,
    adjacency: BTreeMap<FlowSlug, Vec<FlowSlug>>,
}

impl GraphView {
    /// The direction this view was oriented for
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns true if the flow exists in the underlying graph
    pub fn contains_flow(&self, slug: &FlowSlug) -> bool {
        self.adjacency.contains_key(slug)
    }

    /// Traversable neighbours of `slug`, in slug order.
    pub fn neighbours(&self, slug: &FlowSlug) -> &[FlowSlug] {
        self.adjacency.get(slug).map(Vec::as_slice).unwrap_or(&[])
    }
}
