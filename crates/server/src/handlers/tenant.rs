//! Tenant endpoints.

use super::common::read_json;
use crate::auth::require_auth;
use crate::error::{ApiError, ApiResult};
use crate::service::tenant::{self, RegisterTenant};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use sdms_core::TenantRecord;

/// POST /v1/tenant/{tenant}
pub async fn register_tenant(
    State(state): State<AppState>,
    Path(name): Path<String>,
    req: Request,
) -> ApiResult<Json<TenantRecord>> {
    let user = require_auth(&req)?.clone();
    let body: RegisterTenant = read_json(req, state.config.server.max_body_bytes)
        .await?
        .ok_or_else(|| ApiError::BadRequest("request body is required".to_string()))?;
    let record = tenant::register(&state, &user, &name, body).await?;
    Ok(Json(record))
}

/// GET /v1/tenant/{tenant}
pub async fn get_tenant(
    State(state): State<AppState>,
    Path(name): Path<String>,
    req: Request,
) -> ApiResult<Json<TenantRecord>> {
    require_auth(&req)?;
    Ok(Json(tenant::get(&state, &name).await?))
}

/// GET /v1/tenant
pub async fn list_tenants(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<Vec<TenantRecord>>> {
    require_auth(&req)?;
    Ok(Json(tenant::list(&state).await?))
}
