use crate::cache::CacheError;
use crate::core::{CoreError, GraphKey};
use crate::graph::GraphError;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors surfaced by [`RequestCoordinator`](super::RequestCoordinator).
///
/// Lock contention and lost leases never appear here; they become a shed-load
/// outcome. What remains are upstream failures, which are propagated after
/// the held lease is released.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoordinatorError {
    /// A store operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Settings or entry encoding failed.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The flow graph rejected the query (e.g. unknown source flow).
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// A fill succeeded but the entry could not be read back.
    #[error("cache inconsistent for {graph_key}: {reason}")]
    InconsistentCache { graph_key: GraphKey, reason: String },
}

impl From<CacheError> for CoordinatorError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::Storage(e) => CoordinatorError::Storage(e),
            CacheError::Core(e) => CoordinatorError::Core(e),
            CacheError::Graph(e) => CoordinatorError::Graph(e),
            CacheError::KeyMismatch { expected, actual } => CoordinatorError::InconsistentCache {
                graph_key: expected,
                reason: format!("settings hash to {}", actual),
            },
        }
    }
}

pub type CoordinatorResult<T> = std::result::Result<T, CoordinatorError>;
