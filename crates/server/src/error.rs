//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sdms_journal::JournalError;
use sdms_locker::LockerError;
use sdms_storage::StorageError;
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("permission denied: {0}")]
    Forbidden(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("locked: {0}")]
    Locked(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Locker(#[from] LockerError),

    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Core(#[from] sdms_core::Error),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self.status_code() {
            StatusCode::LOCKED => "locked",
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::CONFLICT => "already_exists",
            StatusCode::BAD_REQUEST => "bad_request",
            StatusCode::UNAUTHORIZED => "unauthorized",
            StatusCode::FORBIDDEN => "permission_denied",
            _ => "unknown",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::Locked(_) => StatusCode::LOCKED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Locker(e) => match e {
                LockerError::Locked { .. } | LockerError::Busy { .. } => StatusCode::LOCKED,
                LockerError::NotFound { .. } => StatusCode::NOT_FOUND,
                LockerError::InvalidLockId(_) => StatusCode::BAD_REQUEST,
                LockerError::CorruptState { .. } | LockerError::Cache(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Journal(e) => match e {
                JournalError::NotFound(_) => StatusCode::NOT_FOUND,
                JournalError::AlreadyExists(_) => StatusCode::CONFLICT,
                JournalError::InvalidQuery(_) | JournalError::InvalidCursor(_) => {
                    StatusCode::BAD_REQUEST
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Storage(e) => match e {
                StorageError::NotFound(_) | StorageError::BucketNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                StorageError::BucketAlreadyExists(_) | StorageError::BucketNotEmpty(_) => {
                    StatusCode::CONFLICT
                }
                StorageError::InvalidBucket(_)
                | StorageError::InvalidKey(_)
                | StorageError::InvalidContinuationToken(_) => StatusCode::BAD_REQUEST,
                StorageError::InvalidSignature(_) | StorageError::SignatureExpired => {
                    StatusCode::FORBIDDEN
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locker_errors_map_to_spec_statuses() {
        let locked = ApiError::from(LockerError::Locked {
            key: "t/s/a".to_string(),
            reason: "write locked".to_string(),
        });
        assert_eq!(locked.status_code(), StatusCode::LOCKED);
        assert_eq!(locked.code(), "locked");

        let busy = ApiError::from(LockerError::Busy {
            key: "t/s/a".to_string(),
        });
        assert_eq!(busy.status_code(), StatusCode::LOCKED);

        let missing = ApiError::from(LockerError::NotFound {
            key: "t/s/a".to_string(),
            wid: "Rabc".to_string(),
        });
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        let invalid = ApiError::from(LockerError::InvalidLockId("x".to_string()));
        assert_eq!(invalid.code(), "bad_request");
    }

    #[test]
    fn test_journal_and_storage_mapping() {
        let exists = ApiError::from(JournalError::AlreadyExists("k".to_string()));
        assert_eq!(exists.status_code(), StatusCode::CONFLICT);
        assert_eq!(exists.code(), "already_exists");

        let cursor = ApiError::from(JournalError::InvalidCursor("bad".to_string()));
        assert_eq!(cursor.status_code(), StatusCode::BAD_REQUEST);

        let expired = ApiError::from(StorageError::SignatureExpired);
        assert_eq!(expired.code(), "permission_denied");

        let io = ApiError::from(StorageError::Io(std::io::Error::other("disk")));
        assert_eq!(io.code(), "unknown");
    }
}
