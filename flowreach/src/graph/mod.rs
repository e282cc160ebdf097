//! Client flow graph and reachability
//!
//! This module provides the graph data structures and traversal algorithms
//! behind reachability analysis:
//!
//! - Flow nodes and predicate-gated edges, stored once in declared direction
//! - Per-environment, per-direction filtered views
//! - Bounded-depth enumeration of simple paths with deterministic ordering
//!
//! # Design Principles
//!
//! Following Parnas's information hiding principles:
//! - This module hides the graph representation (edge list plus per-node indices)
//! - Exposes only abstract operations: add_flow, add_edge, view, enumerate_paths

mod error;
mod flow_graph;
mod path;
mod reachability;
mod slug;

pub use error::{GraphError, GraphResult};
pub use flow_graph::{Direction, FlowEdge, FlowGraph, GraphView};
pub use path::FlowPath;
pub use reachability::{PathsByTarget, ReachabilityComputer};
pub use slug::FlowSlug;
