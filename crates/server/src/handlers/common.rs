//! Shared handler helpers.

use crate::error::{ApiError, ApiResult};
use axum::extract::Request;
use sdms_core::DatasetId;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Header proposing a lock id for register and lock calls.
pub const LOCK_ID_HEADER: &str = "x-seismic-dms-lockid";

/// Path parameters of a dataset route.
#[derive(Debug, Deserialize)]
pub struct DatasetRoute {
    pub tenant: String,
    pub subproject: String,
    pub dataset: String,
}

impl DatasetRoute {
    /// Dataset id for the route and its `path` query parameter.
    pub fn id(&self, path: &str) -> ApiResult<DatasetId> {
        Ok(DatasetId::new(
            &self.tenant,
            &self.subproject,
            path,
            &self.dataset,
        )?)
    }
}

/// Path parameters of a subproject route.
#[derive(Debug, Deserialize)]
pub struct SubprojectRoute {
    pub tenant: String,
    pub subproject: String,
}

/// The lock id proposed in [`LOCK_ID_HEADER`], if any.
pub fn lock_id_header(req: &Request) -> Option<String> {
    req.headers()
        .get(LOCK_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Read a JSON body of at most `limit` bytes. An empty body reads as `None`.
pub async fn read_json<T: DeserializeOwned>(req: Request, limit: usize) -> ApiResult<Option<T>> {
    let bytes = axum::body::to_bytes(req.into_body(), limit)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

/// Split a comma-separated query value, dropping empty items.
pub fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(Some("a, b,,c")), vec!["a", "b", "c"]);
        assert!(split_list(None).is_empty());
    }

    #[test]
    fn test_lock_id_header() {
        let req = Request::builder()
            .header(LOCK_ID_HEADER, " Wabc ")
            .body(Body::empty())
            .unwrap();
        assert_eq!(lock_id_header(&req).as_deref(), Some("Wabc"));
    }

    #[tokio::test]
    async fn test_read_json_empty_body() {
        let req = Request::builder().body(Body::from("  \n")).unwrap();
        let body: Option<serde_json::Value> = read_json(req, 1024).await.unwrap();
        assert!(body.is_none());

        let req = Request::builder().body(Body::from("{not json")).unwrap();
        let err = read_json::<serde_json::Value>(req, 1024).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
