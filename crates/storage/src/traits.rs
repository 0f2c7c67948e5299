//! Blob storage trait definitions.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use time::OffsetDateTime;

/// Page size constraints for listing operations.
pub const DEFAULT_PAGE_SIZE: usize = 1000;
pub const MIN_PAGE_SIZE: usize = 1;
pub const MAX_PAGE_SIZE: usize = 10000;

/// Maximum size for continuation tokens (2 KB).
pub const MAX_TOKEN_SIZE: usize = 2048;

/// An opaque continuation token for resuming a listing.
///
/// Both local backends encode the last key returned; callers must treat the
/// token as opaque.
#[derive(Clone, PartialEq, Eq)]
pub struct ContinuationToken(Vec<u8>);

impl ContinuationToken {
    /// Create a token from raw bytes, rejecting anything over [`MAX_TOKEN_SIZE`].
    pub fn new(data: Vec<u8>) -> StorageResult<Self> {
        if data.len() > MAX_TOKEN_SIZE {
            return Err(StorageError::InvalidContinuationToken(format!(
                "continuation token too large: {} bytes (max: {MAX_TOKEN_SIZE})",
                data.len()
            )));
        }
        Ok(Self(data))
    }

    pub(crate) fn from_key(key: &str) -> StorageResult<Self> {
        Self::new(key.as_bytes().to_vec())
    }

    pub(crate) fn to_key(&self) -> StorageResult<String> {
        String::from_utf8(self.0.clone())
            .map_err(|e| StorageError::InvalidContinuationToken(e.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// URL-safe text form for query strings.
    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }

    pub fn from_base64(s: &str) -> StorageResult<Self> {
        // Reject before decoding; base64 grows by 4/3.
        const MAX_BASE64_INPUT: usize = MAX_TOKEN_SIZE * 2;
        if s.len() > MAX_BASE64_INPUT {
            return Err(StorageError::InvalidContinuationToken(format!(
                "continuation token base64 too large: {} bytes (max: {MAX_BASE64_INPUT})",
                s.len()
            )));
        }
        let data = URL_SAFE_NO_PAD.decode(s).map_err(|e| {
            StorageError::InvalidContinuationToken(format!(
                "invalid continuation token base64: {e}"
            ))
        })?;
        Self::new(data)
    }
}

impl std::fmt::Debug for ContinuationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ContinuationToken")
            .field(&"<redacted>")
            .finish()
    }
}

/// A single page of listing results.
#[derive(Clone, Debug)]
pub struct ListingPage {
    /// Object names in this page, in lexicographic order.
    pub keys: Vec<String>,
    /// Token for the next page; `None` on the last page.
    pub next_token: Option<ContinuationToken>,
}

/// Options for listing operations.
#[derive(Clone, Debug)]
pub struct ListingOptions {
    /// Only objects whose name starts with this prefix.
    pub prefix: String,
    /// Keys per page, clamped to `[MIN_PAGE_SIZE, MAX_PAGE_SIZE]`.
    pub page_size: usize,
}

impl ListingOptions {
    pub fn new(prefix: impl Into<String>, page_size: usize) -> Self {
        Self {
            prefix: prefix.into(),
            page_size,
        }
    }

    pub fn normalized_page_size(&self) -> usize {
        self.page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
    }
}

impl Default for ListingOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Placement hints for a new bucket. Local backends record nothing.
#[derive(Clone, Debug, Default)]
pub struct BucketOptions {
    pub storage_class: Option<String>,
    pub location: Option<String>,
}

/// Metadata about a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<OffsetDateTime>,
}

/// Bucket and object storage for dataset content.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Static identifier for logs (e.g., "memory", "filesystem").
    fn backend_name(&self) -> &'static str;

    /// Create a bucket. Fails with `BucketAlreadyExists` if present.
    async fn create_bucket(&self, bucket: &str, options: &BucketOptions) -> StorageResult<()>;

    /// Delete a bucket. Without `force` the bucket must be empty.
    async fn delete_bucket(&self, bucket: &str, force: bool) -> StorageResult<()>;

    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool>;

    /// Write an object atomically, replacing any previous content.
    async fn save_object(&self, bucket: &str, object: &str, data: Bytes) -> StorageResult<()>;

    async fn get_object(&self, bucket: &str, object: &str) -> StorageResult<Bytes>;

    async fn head_object(&self, bucket: &str, object: &str) -> StorageResult<ObjectMeta>;

    /// Delete an object. Fails with `NotFound` if absent.
    async fn delete_object(&self, bucket: &str, object: &str) -> StorageResult<()>;

    /// Delete every object under `prefix`. Returns the number removed.
    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> StorageResult<u64>;

    /// Copy one object, possibly across buckets.
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_object: &str,
        dst_bucket: &str,
        dst_object: &str,
    ) -> StorageResult<()>;

    /// List one page of object names.
    async fn list_objects(
        &self,
        bucket: &str,
        options: &ListingOptions,
        resume: Option<&ContinuationToken>,
    ) -> StorageResult<ListingPage>;

    /// Verify backend connectivity.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Bucket names: 3-63 of `[a-z0-9._-]`, starting with a letter or digit.
pub fn validate_bucket(bucket: &str) -> StorageResult<()> {
    let valid_len = (3..=63).contains(&bucket.len());
    let valid_start = bucket
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let valid_chars = bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '_'));
    if valid_len && valid_start && valid_chars && !bucket.contains("..") {
        Ok(())
    } else {
        Err(StorageError::InvalidBucket(bucket.to_string()))
    }
}

/// Object names are relative `/`-separated paths without empty or dot segments.
pub fn validate_object(object: &str) -> StorageResult<()> {
    if object.is_empty() || object.len() > 1024 {
        return Err(StorageError::InvalidKey(format!(
            "object name must be between 1 and 1024 bytes: {object:?}"
        )));
    }
    if object.contains('\0') || object.contains('\\') {
        return Err(StorageError::InvalidKey(format!(
            "object name contains forbidden characters: {object:?}"
        )));
    }
    if object
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(StorageError::InvalidKey(format!(
            "object name has empty or relative segments: {object:?}"
        )));
    }
    Ok(())
}

/// Slice `sorted` (lexicographic) into the page after `resume`.
pub(crate) fn paginate(
    sorted: impl IntoIterator<Item = String>,
    options: &ListingOptions,
    resume: Option<&ContinuationToken>,
) -> StorageResult<ListingPage> {
    let after = resume.map(ContinuationToken::to_key).transpose()?;
    let page_size = options.normalized_page_size();

    let mut remaining = sorted
        .into_iter()
        .filter(|k| k.starts_with(&options.prefix))
        .filter(|k| after.as_deref().is_none_or(|a| k.as_str() > a));

    let keys: Vec<String> = remaining.by_ref().take(page_size).collect();
    let next_token = match (remaining.next(), keys.last()) {
        (Some(_), Some(last)) => Some(ContinuationToken::from_key(last)?),
        _ => None,
    };
    Ok(ListingPage { keys, next_token })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuation_token_from_base64_rejects_oversized_input() {
        let huge_base64 = "A".repeat(5000);
        let err = ContinuationToken::from_base64(&huge_base64).unwrap_err();
        assert!(err.to_string().contains("base64 too large"));
    }

    #[test]
    fn test_continuation_token_from_base64_valid() {
        let token = ContinuationToken::from_key("a/b/c").unwrap();
        let decoded = ContinuationToken::from_base64(&token.to_base64()).unwrap();
        assert_eq!(decoded.to_key().unwrap(), "a/b/c");
    }

    #[test]
    fn test_bucket_names() {
        assert!(validate_bucket("ss-tenant-sub-0a1b").is_ok());
        assert!(validate_bucket("ab").is_err());
        assert!(validate_bucket("Upper").is_err());
        assert!(validate_bucket(".hidden").is_err());
        assert!(validate_bucket("a..b").is_err());
    }

    #[test]
    fn test_object_names() {
        assert!(validate_object("dataset/0.seg").is_ok());
        assert!(validate_object("/abs").is_err());
        assert!(validate_object("a//b").is_err());
        assert!(validate_object("a/../b").is_err());
        assert!(validate_object("").is_err());
    }

    #[test]
    fn test_paginate_resumes_after_token() {
        let keys: Vec<String> = ["a/1", "a/2", "a/3", "b/1"].iter().map(|s| s.to_string()).collect();
        let options = ListingOptions::new("a/", 2);

        let first = paginate(keys.clone(), &options, None).unwrap();
        assert_eq!(first.keys, vec!["a/1", "a/2"]);
        let token = first.next_token.unwrap();

        let second = paginate(keys, &options, Some(&token)).unwrap();
        assert_eq!(second.keys, vec!["a/3"]);
        assert!(second.next_token.is_none());
    }
}
