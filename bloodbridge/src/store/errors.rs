use thiserror::Error;

/// Unified error type for storage operations that core code can handle.
///
/// The core performs no retries; retry policy, if any, belongs to the adapter.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// Unique constraint violation
    #[error("Unique constraint violation")]
    UniqueViolation {
        constraint: Option<String>,
        message: String,
    },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Type alias for storage operation results
pub type Result<T> = std::result::Result<T, StoreError>;
