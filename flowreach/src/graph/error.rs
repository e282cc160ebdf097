//! Error types for graph operations
//!
//! This module hides error representation details and provides
//! a unified error type for all graph operations.

use super::FlowSlug;
use thiserror::Error;

/// Result type for graph operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that can occur during graph operations
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum GraphError {
    /// A flow was not found in the graph
    #[error("Flow not found: {slug}")]
    FlowNotFound {
        /// The slug that was not found
        slug: FlowSlug,
    },

    /// An edge references a flow that does not exist
    #[error("Edge {source_slug} -> {target} references unknown flow '{missing}'")]
    DanglingEdge {
        /// Edge source
        source_slug: FlowSlug,
        /// Edge target
        target: FlowSlug,
        /// The endpoint that does not exist
        missing: FlowSlug,
    },

    /// A flow was added with a duplicate slug
    #[error("Duplicate flow slug: {slug}")]
    DuplicateFlow {
        /// The duplicate slug
        slug: FlowSlug,
    },

    /// An edge predicate reads a malformed settings path
    #[error("Edge {source_slug} -> {target} has an invalid predicate path {path:?}")]
    InvalidPredicate {
        /// Edge source
        source_slug: FlowSlug,
        /// Edge target
        target: FlowSlug,
        /// The offending path
        path: String,
    },

    /// Self-loop edge (flow transitions to itself)
    #[error("Flow '{slug}' cannot transition to itself")]
    SelfLoop {
        /// The flow with the self-loop
        slug: FlowSlug,
    },
}

impl GraphError {
    /// Creates a flow not found error
    pub fn flow_not_found(slug: FlowSlug) -> Self {
        Self::FlowNotFound { slug }
    }

    /// Creates a dangling edge error
    pub fn dangling_edge(source: FlowSlug, target: FlowSlug, missing: FlowSlug) -> Self {
        Self::DanglingEdge {
            source_slug: source,
            target,
            missing,
        }
    }

    /// Creates a duplicate flow error
    pub fn duplicate_flow(slug: FlowSlug) -> Self {
        Self::DuplicateFlow { slug }
    }

    /// Creates a self-loop error
    pub fn self_loop(slug: FlowSlug) -> Self {
        Self::SelfLoop { slug }
    }
}
