//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid dataset path: {0}")]
    InvalidPath(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid sdpath: {0}")]
    InvalidSdPath(String),

    #[error("invalid access policy: {0}")]
    InvalidAccessPolicy(String),

    #[error("invalid lock id: {0}")]
    InvalidLockId(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
