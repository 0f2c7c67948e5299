//! Locker error types.

use thiserror::Error;

/// Locker operation errors.
#[derive(Debug, Error)]
pub enum LockerError {
    /// The dataset holds an incompatible lock.
    #[error("{key} is locked: {reason}")]
    Locked { key: String, reason: String },

    /// The per-key mutex could not be taken within the retry budget.
    #[error("{key} is busy, retry later")]
    Busy { key: String },

    /// The supplied lock id does not hold a lock on the key.
    #[error("lock {wid} not found on {key}")]
    NotFound { key: String, wid: String },

    #[error("invalid lock id: {0}")]
    InvalidLockId(String),

    #[error("corrupt lock state for {key}: {value:?}")]
    CorruptState { key: String, value: String },

    #[error("cache error: {0}")]
    Cache(String),
}

impl LockerError {
    /// Whether the error means "held by someone else, retry later".
    pub fn is_locked(&self) -> bool {
        matches!(self, LockerError::Locked { .. } | LockerError::Busy { .. })
    }
}

impl From<redis::RedisError> for LockerError {
    fn from(err: redis::RedisError) -> Self {
        LockerError::Cache(err.to_string())
    }
}

/// Result type for locker operations.
pub type LockerResult<T> = std::result::Result<T, LockerError>;
