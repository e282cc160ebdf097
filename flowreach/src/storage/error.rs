use crate::core::CoreError;
use crate::graph::GraphError;
use thiserror::Error;

/// Storage layer error type for the flowreach engine.
///
/// This error type wraps underlying database, Redis and serialization errors
/// while preserving the full error chain for debugging. Storage errors are
/// always propagated to the caller and never cached as results.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// A database operation failed.
    #[cfg(feature = "sqlite")]
    #[error("database operation failed")]
    Database(#[from] sqlx::Error),

    /// A Redis command failed.
    #[cfg(feature = "redis")]
    #[error("redis command failed")]
    Redis(#[from] redis::RedisError),

    /// A core serialization or deserialization error occurred.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The stored flows and edges do not form a valid graph.
    #[error("graph snapshot rejected: {0}")]
    Graph(#[from] GraphError),

    /// Failed to get a connection from the pool.
    #[error("connection error: {0}")]
    Connection(String),

    /// A stored record could not be decoded.
    #[error("corrupt record at {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    /// An event subscription ended unexpectedly.
    #[error("event subscription closed for {channel}")]
    SubscriptionClosed { channel: String },
}

impl StorageError {
    pub(crate) fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::CorruptRecord {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
