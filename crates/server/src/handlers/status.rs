//! Service status.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub environment: String,
}

/// GET /v1/status - Check the journal, cache and blob store.
///
/// Unauthenticated, for load balancer and orchestrator probes.
pub async fn status(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    state.journal.health_check().await?;
    state.cache.health_check().await?;
    state.storage.health_check().await?;

    Ok(Json(StatusResponse {
        status: "running",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.server.service_env.clone(),
    }))
}
