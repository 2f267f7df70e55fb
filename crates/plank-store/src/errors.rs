//! Store error types.

use thiserror::Error;

/// Errors produced by the object store and its repositories.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object id does not exist.
    #[error("object {0} not found")]
    ObjectNotFound(i64),

    /// Underlying SQLite failure.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool failure.
    #[error(transparent)]
    Pool(#[from] r2d2::Error),

    /// Record serialization failure.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Invariant violation or lock poisoning.
    #[error("{0}")]
    Internal(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
