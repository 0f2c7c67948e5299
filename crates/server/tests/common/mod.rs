//! Common test utilities.
//! Note: #[allow(dead_code)] because each test file compiles common/ separately.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use sdms_core::TenantRecord;
use sdms_core::config::{AppConfig, StorageConfig};
use sdms_journal::{Journal, TenantRepo};
use sdms_server::{AppState, ConfigEntitlements, create_router};
use sdms_storage::{BlobStore, FilesystemBackend};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

pub const TENANT: &str = "tenant-a";
pub const SUBPROJECT: &str = "sub-b";
pub const ESD: &str = "opendes.contoso.com";
pub const TENANT_ADMINS: &str = "users.datalake.admins@opendes.contoso.com";
pub const LTAG: &str = "opendes-public-usa-dataset-1";

pub fn tenant_record() -> TenantRecord {
    TenantRecord {
        name: TENANT.to_string(),
        esd: ESD.to_string(),
        gcpid: "gcp-a".to_string(),
        default_acls: TENANT_ADMINS.to_string(),
    }
}

/// Dataset route below the test subproject.
pub fn dataset_uri(name: &str) -> String {
    format!("/v1/dataset/tenant/{TENANT}/subproject/{SUBPROJECT}/dataset/{name}")
}

pub fn subproject_uri() -> String {
    format!("/v1/subproject/tenant/{TENANT}/subproject/{SUBPROJECT}")
}

/// A router over in-memory journal and cache with filesystem blobs.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Server with authorization disabled and the test tenant registered.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let storage_path = temp_dir.path().join("blobs");

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem {
            path: storage_path.clone(),
            signing: config.storage.signing().clone(),
        };
        modifier(&mut config);

        let storage: Arc<dyn BlobStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );
        let journal: Arc<dyn Journal> = Arc::new(sdms_journal::MemoryJournal::new());
        journal
            .insert_tenant(&tenant_record())
            .await
            .expect("Failed to register tenant");

        let entitlements = Arc::new(ConfigEntitlements::from_config(&config.auth));
        let state = AppState::new(
            config,
            journal,
            storage,
            Arc::new(sdms_locker::MemoryCache::new()),
            entitlements,
        );
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Create the test subproject, carrying a legal tag.
    pub async fn with_subproject() -> Self {
        let server = Self::new().await;
        let (status, body) = server
            .send(
                "POST",
                &subproject_uri(),
                Some(serde_json::json!({ "ltag": LTAG })),
                &[],
            )
            .await;
        assert_eq!(status, StatusCode::OK, "subproject creation failed: {body}");
        server
    }

    /// Send a request, returning the status and the JSON body (`Null` when empty).
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let (status, bytes) = self.send_raw(method, uri, body, headers).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Send a request, returning the status and the raw body.
    pub async fn send_raw(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(v) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };
        self.call(builder.body(body).unwrap()).await
    }

    /// Send a prepared request.
    pub async fn call(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }
}
