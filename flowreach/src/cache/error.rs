use crate::core::{CoreError, GraphKey};
use crate::graph::GraphError;
use crate::storage::StorageError;
use thiserror::Error;

/// Cache layer error type.
///
/// Lost leases and missing or stale entries are outcomes of the read and fill
/// operations. Errors here are upstream failures and are never cached.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// The coordination store or flow store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Encoding or decoding an entry failed.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The graph could not be traversed (e.g. unknown source flow).
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// The settings passed to a fill hash to a different graph key than the
    /// lease being used.
    #[error("settings hash to {actual}, but the lease is for {expected}")]
    KeyMismatch { expected: GraphKey, actual: GraphKey },
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;
