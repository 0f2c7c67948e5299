//! Subproject endpoints.

use super::common::{SubprojectRoute, read_json};
use crate::auth::require_auth;
use crate::error::{ApiError, ApiResult};
use crate::service::subproject::{self, CreateSubproject, PatchSubproject};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use sdms_core::SubprojectRecord;

/// POST /v1/subproject/tenant/{tenant}/subproject/{subproject}
pub async fn create_subproject(
    State(state): State<AppState>,
    Path(route): Path<SubprojectRoute>,
    req: Request,
) -> ApiResult<Json<SubprojectRecord>> {
    let user = require_auth(&req)?.clone();
    let body: CreateSubproject = read_json(req, state.config.server.max_body_bytes)
        .await?
        .unwrap_or_default();
    let record =
        subproject::create(&state, &user, &route.tenant, &route.subproject, body).await?;
    Ok(Json(record))
}

/// GET /v1/subproject/tenant/{tenant}/subproject/{subproject}
pub async fn get_subproject(
    State(state): State<AppState>,
    Path(route): Path<SubprojectRoute>,
    req: Request,
) -> ApiResult<Json<SubprojectRecord>> {
    let user = require_auth(&req)?.clone();
    let record = subproject::get(&state, &user, &route.tenant, &route.subproject).await?;
    Ok(Json(record))
}

/// PATCH /v1/subproject/tenant/{tenant}/subproject/{subproject}
pub async fn patch_subproject(
    State(state): State<AppState>,
    Path(route): Path<SubprojectRoute>,
    req: Request,
) -> ApiResult<Json<SubprojectRecord>> {
    let user = require_auth(&req)?.clone();
    let body: PatchSubproject = read_json(req, state.config.server.max_body_bytes)
        .await?
        .ok_or_else(|| ApiError::BadRequest("request body is required".to_string()))?;
    let record =
        subproject::patch(&state, &user, &route.tenant, &route.subproject, body).await?;
    Ok(Json(record))
}

/// DELETE /v1/subproject/tenant/{tenant}/subproject/{subproject}
pub async fn delete_subproject(
    State(state): State<AppState>,
    Path(route): Path<SubprojectRoute>,
    req: Request,
) -> ApiResult<StatusCode> {
    let user = require_auth(&req)?.clone();
    subproject::delete(&state, &user, &route.tenant, &route.subproject).await?;
    Ok(StatusCode::OK)
}

/// GET /v1/subproject/tenant/{tenant}
pub async fn list_subprojects(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    req: Request,
) -> ApiResult<Json<Vec<SubprojectRecord>>> {
    let user = require_auth(&req)?.clone();
    let records = subproject::list(&state, &user, &tenant).await?;
    Ok(Json(records))
}
