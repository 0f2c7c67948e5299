//! Blob storage abstraction and backends for the seismic DMS.
//!
//! This crate provides:
//! - Buckets and objects behind the [`BlobStore`] trait
//! - Paginated listings with opaque continuation tokens
//! - Expiring signed URLs for direct upload and download
//! - Backends: in-memory and local filesystem

pub mod backends;
pub mod error;
pub mod signing;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, memory::MemoryBackend};
pub use error::{StorageError, StorageResult};
pub use signing::{SignedMethod, SignedUrl, UrlSigner};
pub use traits::{
    BlobStore, BucketOptions, ContinuationToken, ListingOptions, ListingPage, ObjectMeta,
};

use sdms_core::config::StorageConfig;
use std::sync::Arc;

/// Create a blob store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn BlobStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Memory { .. } => {
            tracing::warn!("using in-memory blob storage; objects are lost on restart");
            Ok(Arc::new(MemoryBackend::new()))
        }
        StorageConfig::Filesystem { path, .. } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use sdms_core::config::UrlSigningConfig;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            path: temp.path().join("store"),
            signing: UrlSigningConfig::default(),
        };

        let store = from_config(&config).await.unwrap();
        store
            .create_bucket("bucket-a", &BucketOptions::default())
            .await
            .unwrap();
        store
            .save_object("bucket-a", "hello.txt", Bytes::from_static(b"hi"))
            .await
            .unwrap();
        assert_eq!(store.head_object("bucket-a", "hello.txt").await.unwrap().size, 2);
    }

    #[tokio::test]
    async fn from_config_rejects_short_secret() {
        let config = StorageConfig::Memory {
            signing: UrlSigningConfig {
                secret: Some("short".to_string()),
                ..UrlSigningConfig::default()
            },
        };

        match from_config(&config).await {
            Ok(_) => panic!("expected error"),
            Err(StorageError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}
