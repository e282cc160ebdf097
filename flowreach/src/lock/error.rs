use crate::core::GraphKey;
use crate::storage::StorageError;
use thiserror::Error;

/// Lock layer error type.
///
/// Contention and lost leases are outcomes, not errors. Only an exhausted
/// wait and a failing store surface here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LockError {
    /// The lease stayed contended for every allowed attempt.
    #[error("timed out acquiring lock on {graph_key} after {attempts} attempt(s)")]
    Timeout { graph_key: GraphKey, attempts: u32 },

    /// The coordination store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl LockError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LockError::Timeout { .. })
    }
}

pub type LockResult<T> = std::result::Result<T, LockError>;
