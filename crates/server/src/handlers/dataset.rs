//! Dataset endpoints.

use super::common::{DatasetRoute, SubprojectRoute, lock_id_header, read_json, split_list};
use crate::auth::require_auth;
use crate::error::{ApiError, ApiResult};
use crate::metrics::observe;
use crate::service::dataset::{
    self, ContentListing, DatasetList, PatchDataset, Permissions, RegisterDataset,
};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use sdms_core::DatasetView;
use sdms_journal::{ContentMode, DatasetListing};
use sdms_storage::SignedMethod;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct PatchQuery {
    #[serde(default)]
    pub path: String,
    /// Lock session to close.
    pub close: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LockQuery {
    #[serde(default)]
    pub path: String,
    /// `read` or `write`.
    #[serde(default = "default_openmode")]
    pub openmode: String,
    /// Lock id already held by the caller.
    pub wid: Option<String>,
}

fn default_openmode() -> String {
    "read".to_string()
}

#[derive(Debug, Deserialize)]
pub struct CtagQuery {
    #[serde(default)]
    pub path: String,
    pub ctag: String,
}

#[derive(Debug, Deserialize)]
pub struct GtagsQuery {
    #[serde(default)]
    pub path: String,
    /// Comma-separated tags.
    pub gtag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    /// Comma-separated tags every listed dataset must carry.
    pub gtag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContentQuery {
    #[serde(default)]
    pub path: String,
    /// `all`, `datasets` or `directories`.
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignedUrlQuery {
    #[serde(default)]
    pub path: String,
    /// `upload` or `download`.
    pub mode: String,
    /// Object name below the dataset's storage prefix.
    pub object: String,
}

/// Body of the bulk exist and sizes calls.
#[derive(Debug, Deserialize)]
pub struct DatasetPaths {
    /// Dataset paths, `/dir/.../name`.
    pub datasets: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SignedUrlResponse {
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// POST /v1/dataset/tenant/{tenant}/subproject/{subproject}/dataset/{dataset}
pub async fn register_dataset(
    State(state): State<AppState>,
    Path(route): Path<DatasetRoute>,
    Query(query): Query<PathQuery>,
    req: Request,
) -> ApiResult<Json<DatasetView>> {
    let user = require_auth(&req)?.clone();
    let lock_id = lock_id_header(&req);
    let id = route.id(&query.path)?;
    let body: RegisterDataset = read_json(req, state.config.server.max_body_bytes)
        .await?
        .unwrap_or_default();

    let view = observe(
        "register",
        dataset::register(&state, &user, &id, lock_id.as_deref(), body),
    )
    .await?;
    Ok(Json(view))
}

/// GET /v1/dataset/tenant/{tenant}/subproject/{subproject}/dataset/{dataset}
pub async fn get_dataset(
    State(state): State<AppState>,
    Path(route): Path<DatasetRoute>,
    Query(query): Query<PathQuery>,
    req: Request,
) -> ApiResult<Json<DatasetView>> {
    let user = require_auth(&req)?.clone();
    let id = route.id(&query.path)?;
    let view = observe("get", dataset::get(&state, &user, &id)).await?;
    Ok(Json(view))
}

/// DELETE /v1/dataset/tenant/{tenant}/subproject/{subproject}/dataset/{dataset}
pub async fn delete_dataset(
    State(state): State<AppState>,
    Path(route): Path<DatasetRoute>,
    Query(query): Query<PathQuery>,
    req: Request,
) -> ApiResult<StatusCode> {
    let user = require_auth(&req)?.clone();
    let id = route.id(&query.path)?;
    observe("delete", dataset::delete(&state, &user, &id)).await?;
    Ok(StatusCode::OK)
}

/// PATCH /v1/dataset/tenant/{tenant}/subproject/{subproject}/dataset/{dataset}
///
/// With `close` and an empty body, only closes that lock session.
pub async fn patch_dataset(
    State(state): State<AppState>,
    Path(route): Path<DatasetRoute>,
    Query(query): Query<PatchQuery>,
    req: Request,
) -> ApiResult<Json<DatasetView>> {
    let user = require_auth(&req)?.clone();
    let id = route.id(&query.path)?;
    let body: Option<PatchDataset> = read_json(req, state.config.server.max_body_bytes).await?;

    let view = observe(
        "patch",
        dataset::patch(&state, &user, &id, query.close.as_deref(), body),
    )
    .await?;
    Ok(Json(view))
}

/// PUT …/dataset/{dataset}/lock?openmode=read|write
pub async fn lock_dataset(
    State(state): State<AppState>,
    Path(route): Path<DatasetRoute>,
    Query(query): Query<LockQuery>,
    req: Request,
) -> ApiResult<Json<DatasetView>> {
    let user = require_auth(&req)?.clone();
    let open_for_write = match query.openmode.as_str() {
        "write" => true,
        "read" => false,
        other => {
            return Err(ApiError::BadRequest(format!(
                "openmode must be 'read' or 'write', got '{other}'"
            )));
        }
    };
    let proposed = lock_id_header(&req);
    let id = route.id(&query.path)?;

    let view = observe(
        "lock",
        dataset::lock(
            &state,
            &user,
            &id,
            open_for_write,
            proposed.as_deref(),
            query.wid.as_deref(),
        ),
    )
    .await?;
    Ok(Json(view))
}

/// PUT …/dataset/{dataset}/unlock
pub async fn unlock_dataset(
    State(state): State<AppState>,
    Path(route): Path<DatasetRoute>,
    Query(query): Query<PathQuery>,
    req: Request,
) -> ApiResult<StatusCode> {
    let user = require_auth(&req)?.clone();
    let id = route.id(&query.path)?;
    observe("unlock", dataset::unlock(&state, &user, &id)).await?;
    Ok(StatusCode::OK)
}

/// GET …/dataset/{dataset}/ctagcheck?ctag=
pub async fn check_ctag(
    State(state): State<AppState>,
    Path(route): Path<DatasetRoute>,
    Query(query): Query<CtagQuery>,
    req: Request,
) -> ApiResult<Json<bool>> {
    require_auth(&req)?;
    let id = route.id(&query.path)?;
    let matches = observe("ctagcheck", dataset::check_ctag(&state, &id, &query.ctag)).await?;
    Ok(Json(matches))
}

/// GET …/dataset/{dataset}/permission
pub async fn dataset_permissions(
    State(state): State<AppState>,
    Path(route): Path<DatasetRoute>,
    Query(query): Query<PathQuery>,
    req: Request,
) -> ApiResult<Json<Permissions>> {
    let user = require_auth(&req)?.clone();
    let id = route.id(&query.path)?;
    let permissions = observe("permission", dataset::permissions(&state, &user, &id)).await?;
    Ok(Json(permissions))
}

/// PUT …/dataset/{dataset}/gtags?gtag=a,b
pub async fn put_gtags(
    State(state): State<AppState>,
    Path(route): Path<DatasetRoute>,
    Query(query): Query<GtagsQuery>,
    req: Request,
) -> ApiResult<StatusCode> {
    let user = require_auth(&req)?.clone();
    let id = route.id(&query.path)?;
    let gtags = split_list(query.gtag.as_deref());
    observe("gtags", dataset::put_gtags(&state, &user, &id, gtags)).await?;
    Ok(StatusCode::OK)
}

/// GET …/dataset/{dataset}/signed-url?mode=upload|download&object=
pub async fn signed_url(
    State(state): State<AppState>,
    Path(route): Path<DatasetRoute>,
    Query(query): Query<SignedUrlQuery>,
    req: Request,
) -> ApiResult<Json<SignedUrlResponse>> {
    let user = require_auth(&req)?.clone();
    let method = match query.mode.as_str() {
        "upload" => SignedMethod::Upload,
        "download" => SignedMethod::Download,
        other => {
            return Err(ApiError::BadRequest(format!(
                "mode must be 'upload' or 'download', got '{other}'"
            )));
        }
    };
    let id = route.id(&query.path)?;
    let signed = observe(
        "signed-url",
        dataset::signed_url(&state, &user, &id, method, &query.object),
    )
    .await?;
    Ok(Json(SignedUrlResponse {
        url: signed.url,
        expires_at: signed.expires_at,
    }))
}

/// GET /v1/dataset/tenant/{tenant}/subproject/{subproject}
pub async fn list_datasets(
    State(state): State<AppState>,
    Path((tenant, subproject)): Path<(String, String)>,
    Query(query): Query<ListQuery>,
    req: Request,
) -> ApiResult<Json<DatasetList>> {
    let user = require_auth(&req)?.clone();
    let listing = DatasetListing {
        limit: query.limit,
        cursor: query.cursor,
        gtags: split_list(query.gtag.as_deref()),
    };
    let list = observe(
        "list",
        dataset::list(&state, &user, &tenant, &subproject, &listing),
    )
    .await?;
    Ok(Json(list))
}

/// GET /v1/dataset/tenant/{tenant}/subproject/{subproject}/content?path=
pub async fn list_content(
    State(state): State<AppState>,
    Path(route): Path<SubprojectRoute>,
    Query(query): Query<ContentQuery>,
    req: Request,
) -> ApiResult<Json<ContentListing>> {
    let user = require_auth(&req)?.clone();
    let mode = match query.mode.as_deref() {
        None | Some("all") => ContentMode::All,
        Some("datasets") => ContentMode::Datasets,
        Some("directories") => ContentMode::Directories,
        Some(other) => {
            return Err(ApiError::BadRequest(format!(
                "mode must be 'all', 'datasets' or 'directories', got '{other}'"
            )));
        }
    };
    let content = observe(
        "content",
        dataset::list_content(
            &state,
            &user,
            &route.tenant,
            &route.subproject,
            &query.path,
            mode,
        ),
    )
    .await?;
    Ok(Json(content))
}

async fn read_paths(state: &AppState, req: Request) -> ApiResult<Vec<String>> {
    let body: Option<DatasetPaths> = read_json(req, state.config.server.max_body_bytes).await?;
    Ok(body.map(|b| b.datasets).unwrap_or_default())
}

/// POST /v1/dataset/tenant/{tenant}/subproject/{subproject}/exist
pub async fn datasets_exist(
    State(state): State<AppState>,
    Path(route): Path<SubprojectRoute>,
    req: Request,
) -> ApiResult<Json<Vec<bool>>> {
    let user = require_auth(&req)?.clone();
    let paths = read_paths(&state, req).await?;
    let found = observe(
        "exist",
        dataset::exists(&state, &user, &route.tenant, &route.subproject, &paths),
    )
    .await?;
    Ok(Json(found))
}

/// POST /v1/dataset/tenant/{tenant}/subproject/{subproject}/sizes
pub async fn dataset_sizes(
    State(state): State<AppState>,
    Path(route): Path<SubprojectRoute>,
    req: Request,
) -> ApiResult<Json<Vec<i64>>> {
    let user = require_auth(&req)?.clone();
    let paths = read_paths(&state, req).await?;
    let sizes = observe(
        "sizes",
        dataset::sizes(&state, &user, &route.tenant, &route.subproject, &paths),
    )
    .await?;
    Ok(Json(sizes))
}
