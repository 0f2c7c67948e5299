//! Journal error types.

use thiserror::Error;

/// Journal operation errors.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for journal operations.
pub type JournalResult<T> = std::result::Result<T, JournalError>;
