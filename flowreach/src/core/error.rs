use thiserror::Error;

/// Core error type for the flowreach reachability engine.
///
/// This error type uses `thiserror` with proper `#[source]` annotations
/// to preserve error chains for debugging and error handling.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Serialization failed when encoding a value to bytes.
    #[error("serialization failed")]
    Serialization(#[source] serde_json::Error),

    /// Deserialization failed when decoding bytes to a value.
    #[error("deserialization failed")]
    Deserialization(#[source] serde_json::Error),

    /// A flow slug was empty or contained a reserved character.
    #[error("invalid flow slug: {0:?}")]
    InvalidSlug(String),

    /// A predicate referenced a settings path with an empty segment.
    #[error("invalid predicate path: {0:?}")]
    InvalidPredicatePath(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
