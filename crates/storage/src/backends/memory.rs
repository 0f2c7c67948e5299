//! In-process blob storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    BlobStore, BucketOptions, ContinuationToken, ListingOptions, ListingPage, ObjectMeta,
    paginate, validate_bucket, validate_object,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use time::OffsetDateTime;
use tokio::sync::RwLock;

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    modified: OffsetDateTime,
}

type Bucket = BTreeMap<String, StoredObject>;

/// Blob store held in memory. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryBackend {
    buckets: RwLock<BTreeMap<String, Bucket>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing_bucket(bucket: &str) -> StorageError {
    StorageError::BucketNotFound(bucket.to_string())
}

#[async_trait]
impl BlobStore for MemoryBackend {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn create_bucket(&self, bucket: &str, _options: &BucketOptions) -> StorageResult<()> {
        validate_bucket(bucket)?;
        match self.buckets.write().await.entry(bucket.to_string()) {
            Entry::Occupied(_) => Err(StorageError::BucketAlreadyExists(bucket.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Bucket::new());
                Ok(())
            }
        }
    }

    async fn delete_bucket(&self, bucket: &str, force: bool) -> StorageResult<()> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets.get(bucket).ok_or_else(|| missing_bucket(bucket))?;
        if !force && !objects.is_empty() {
            return Err(StorageError::BucketNotEmpty(bucket.to_string()));
        }
        buckets.remove(bucket);
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        Ok(self.buckets.read().await.contains_key(bucket))
    }

    async fn save_object(&self, bucket: &str, object: &str, data: Bytes) -> StorageResult<()> {
        validate_object(object)?;
        let mut buckets = self.buckets.write().await;
        let objects = buckets.get_mut(bucket).ok_or_else(|| missing_bucket(bucket))?;
        objects.insert(
            object.to_string(),
            StoredObject {
                data,
                modified: OffsetDateTime::now_utc(),
            },
        );
        Ok(())
    }

    async fn get_object(&self, bucket: &str, object: &str) -> StorageResult<Bytes> {
        let buckets = self.buckets.read().await;
        let objects = buckets.get(bucket).ok_or_else(|| missing_bucket(bucket))?;
        objects
            .get(object)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::NotFound(format!("{bucket}/{object}")))
    }

    async fn head_object(&self, bucket: &str, object: &str) -> StorageResult<ObjectMeta> {
        let buckets = self.buckets.read().await;
        let objects = buckets.get(bucket).ok_or_else(|| missing_bucket(bucket))?;
        objects
            .get(object)
            .map(|o| ObjectMeta {
                size: o.data.len() as u64,
                last_modified: Some(o.modified),
            })
            .ok_or_else(|| StorageError::NotFound(format!("{bucket}/{object}")))
    }

    async fn delete_object(&self, bucket: &str, object: &str) -> StorageResult<()> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets.get_mut(bucket).ok_or_else(|| missing_bucket(bucket))?;
        objects
            .remove(object)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("{bucket}/{object}")))
    }

    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> StorageResult<u64> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets.get_mut(bucket).ok_or_else(|| missing_bucket(bucket))?;
        let before = objects.len();
        objects.retain(|name, _| !name.starts_with(prefix));
        Ok((before - objects.len()) as u64)
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_object: &str,
        dst_bucket: &str,
        dst_object: &str,
    ) -> StorageResult<()> {
        validate_object(dst_object)?;
        let mut buckets = self.buckets.write().await;
        let source = buckets
            .get(src_bucket)
            .ok_or_else(|| missing_bucket(src_bucket))?
            .get(src_object)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("{src_bucket}/{src_object}")))?;
        let objects = buckets
            .get_mut(dst_bucket)
            .ok_or_else(|| missing_bucket(dst_bucket))?;
        objects.insert(
            dst_object.to_string(),
            StoredObject {
                data: source.data,
                modified: OffsetDateTime::now_utc(),
            },
        );
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        options: &ListingOptions,
        resume: Option<&ContinuationToken>,
    ) -> StorageResult<ListingPage> {
        let buckets = self.buckets.read().await;
        let objects = buckets.get(bucket).ok_or_else(|| missing_bucket(bucket))?;
        paginate(objects.keys().cloned(), options, resume)
    }
}
