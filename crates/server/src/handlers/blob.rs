//! Direct object access through signed URLs.
//!
//! These routes need no bearer token; the URL signature is the credential.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use sdms_storage::SignedMethod;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct BlobQuery {
    /// Expiry, unix seconds.
    pub expires: i64,
    pub signature: String,
}

/// GET /blob/{bucket}/{*object}
pub async fn download_blob(
    State(state): State<AppState>,
    Path((bucket, object)): Path<(String, String)>,
    Query(query): Query<BlobQuery>,
) -> ApiResult<impl IntoResponse> {
    state.signer.verify(
        SignedMethod::Download,
        &bucket,
        &object,
        query.expires,
        &query.signature,
    )?;
    let data = state.storage.get_object(&bucket, &object).await?;
    Ok(([(CONTENT_TYPE, "application/octet-stream")], data))
}

/// PUT /blob/{bucket}/{*object}
pub async fn upload_blob(
    State(state): State<AppState>,
    Path((bucket, object)): Path<(String, String)>,
    Query(query): Query<BlobQuery>,
    req: Request,
) -> ApiResult<StatusCode> {
    state.signer.verify(
        SignedMethod::Upload,
        &bucket,
        &object,
        query.expires,
        &query.signature,
    )?;
    let data = axum::body::to_bytes(req.into_body(), state.config.server.max_body_bytes)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    state.storage.save_object(&bucket, &object, data).await?;
    tracing::debug!(bucket = %bucket, object = %object, "object uploaded through signed url");
    Ok(StatusCode::OK)
}
