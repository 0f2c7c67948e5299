//! Local filesystem blob storage backend.
//!
//! Each bucket is a directory under the root and each object a file inside
//! it. Writes go through a staging directory and are renamed into place.

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    BlobStore, BucketOptions, ContinuationToken, ListingOptions, ListingPage, ObjectMeta,
    paginate, validate_bucket, validate_object,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Staging directory for in-flight writes. Bucket names never start with `.`.
const STAGING_DIR: &str = ".staging";

/// Local filesystem blob store.
pub struct FilesystemBackend {
    root: PathBuf,
}

fn not_found(err: std::io::Error, what: impl FnOnce() -> StorageError) -> StorageError {
    if err.kind() == std::io::ErrorKind::NotFound {
        what()
    } else {
        StorageError::Io(err)
    }
}

impl FilesystemBackend {
    /// Create a new filesystem backend rooted at `root`.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(STAGING_DIR)).await?;
        Ok(Self { root })
    }

    fn bucket_path(&self, bucket: &str) -> StorageResult<PathBuf> {
        validate_bucket(bucket)?;
        Ok(self.root.join(bucket))
    }

    /// Full path of an object, with path traversal protection.
    async fn object_path(&self, bucket: &str, object: &str) -> StorageResult<PathBuf> {
        validate_bucket(bucket)?;
        validate_object(object)?;
        let root = self.root.clone();
        let key = format!("{bucket}/{object}");
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Resolve `key` under `root`, rejecting anything that escapes it via
    /// symlinks on the path or its nearest existing ancestor.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        let path = root.join(key);
        let root_canonical = root.canonicalize()?;

        let mut probe = path.as_path();
        loop {
            match std::fs::symlink_metadata(probe) {
                Ok(meta) => {
                    let canonical = probe.canonicalize().map_err(|e| {
                        if meta.file_type().is_symlink() {
                            StorageError::InvalidKey(format!("symlink target missing: {key}"))
                        } else {
                            StorageError::Io(e)
                        }
                    })?;
                    if !canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "resolved path escapes storage root: {key}"
                        )));
                    }
                    return Ok(path);
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    match probe.parent() {
                        Some(parent) => probe = parent,
                        None => return Ok(path),
                    }
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
        }
    }

    async fn require_bucket(&self, bucket: &str) -> StorageResult<PathBuf> {
        let path = self.bucket_path(bucket)?;
        if fs::try_exists(&path).await? {
            Ok(path)
        } else {
            Err(StorageError::BucketNotFound(bucket.to_string()))
        }
    }

    /// Write `data` to `path` via a staged temp file, fsync and rename.
    async fn write_atomic(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_path = self
            .root
            .join(STAGING_DIR)
            .join(format!(".tmp.{}", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
        }
        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// All object names in a bucket, sorted.
    async fn walk_bucket(&self, bucket_path: &Path) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut stack = vec![bucket_path.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                // file_type() does not follow symlinks; links are skipped.
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file()
                    && let Ok(rel) = path.strip_prefix(bucket_path)
                {
                    let key = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl BlobStore for FilesystemBackend {
    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self, _options), fields(backend = "filesystem"))]
    async fn create_bucket(&self, bucket: &str, _options: &BucketOptions) -> StorageResult<()> {
        let path = self.bucket_path(bucket)?;
        match fs::create_dir(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::BucketAlreadyExists(bucket.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete_bucket(&self, bucket: &str, force: bool) -> StorageResult<()> {
        let path = self.require_bucket(bucket).await?;
        if force {
            fs::remove_dir_all(&path).await?;
            return Ok(());
        }
        if !self.walk_bucket(&path).await?.is_empty() {
            return Err(StorageError::BucketNotEmpty(bucket.to_string()));
        }
        fs::remove_dir_all(&path).await?;
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        let path = self.bucket_path(bucket)?;
        Ok(fs::try_exists(&path).await?)
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn save_object(&self, bucket: &str, object: &str, data: Bytes) -> StorageResult<()> {
        self.require_bucket(bucket).await?;
        let path = self.object_path(bucket, object).await?;
        self.write_atomic(&path, &data).await
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_object(&self, bucket: &str, object: &str) -> StorageResult<Bytes> {
        self.require_bucket(bucket).await?;
        let path = self.object_path(bucket, object).await?;
        let data = fs::read(&path)
            .await
            .map_err(|e| not_found(e, || StorageError::NotFound(format!("{bucket}/{object}"))))?;
        Ok(Bytes::from(data))
    }

    async fn head_object(&self, bucket: &str, object: &str) -> StorageResult<ObjectMeta> {
        self.require_bucket(bucket).await?;
        let path = self.object_path(bucket, object).await?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| not_found(e, || StorageError::NotFound(format!("{bucket}/{object}"))))?;
        Ok(ObjectMeta {
            size: metadata.len(),
            last_modified: metadata.modified().ok().map(Into::into),
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete_object(&self, bucket: &str, object: &str) -> StorageResult<()> {
        self.require_bucket(bucket).await?;
        let path = self.object_path(bucket, object).await?;
        fs::remove_file(&path)
            .await
            .map_err(|e| not_found(e, || StorageError::NotFound(format!("{bucket}/{object}"))))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> StorageResult<u64> {
        let bucket_path = self.require_bucket(bucket).await?;
        let mut deleted = 0;
        for key in self.walk_bucket(&bucket_path).await? {
            if !key.starts_with(prefix) {
                continue;
            }
            match fs::remove_file(bucket_path.join(&key)).await {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(deleted)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_object: &str,
        dst_bucket: &str,
        dst_object: &str,
    ) -> StorageResult<()> {
        let data = self.get_object(src_bucket, src_object).await?;
        self.save_object(dst_bucket, dst_object, data).await
    }

    async fn list_objects(
        &self,
        bucket: &str,
        options: &ListingOptions,
        resume: Option<&ContinuationToken>,
    ) -> StorageResult<ListingPage> {
        let bucket_path = self.require_bucket(bucket).await?;
        let keys = self.walk_bucket(&bucket_path).await?;
        paginate(keys, options, resume)
    }

    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;
        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }
        Ok(())
    }
}
