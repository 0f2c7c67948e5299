//! Distributed cache abstraction.

pub mod memory;
pub mod redis;

use crate::error::LockerResult;
use async_trait::async_trait;
use sdms_core::config::CacheConfig;
use std::sync::Arc;
use std::time::Duration;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

/// Shared key/value cache with expiry and an atomic ownership primitive.
///
/// Plain reads and writes carry no atomicity guarantee. `try_lock` and
/// `unlock` are atomic on a single key.
#[async_trait]
pub trait DistributedCache: Send + Sync {
    async fn get(&self, key: &str) -> LockerResult<Option<String>>;

    /// Store `value`, replacing any previous value and expiry.
    /// `None` stores the value without expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> LockerResult<()>;

    async fn delete(&self, key: &str) -> LockerResult<()>;

    /// Remaining lifetime of `key`. `None` when the key is missing or never expires.
    async fn ttl(&self, key: &str) -> LockerResult<Option<Duration>>;

    /// Set `resource` to `owner` only if it is absent. Returns whether the
    /// caller now owns it.
    async fn try_lock(&self, resource: &str, owner: &str, ttl: Duration) -> LockerResult<bool>;

    /// Delete `resource` only if it is still owned by `owner`.
    /// Returns whether anything was deleted.
    async fn unlock(&self, resource: &str, owner: &str) -> LockerResult<bool>;

    async fn health_check(&self) -> LockerResult<()>;

    /// Release connections. Called once by the host at shutdown.
    async fn disconnect(&self) -> LockerResult<()> {
        Ok(())
    }
}

/// Connect a cache from configuration.
pub async fn from_config(config: &CacheConfig) -> LockerResult<Arc<dyn DistributedCache>> {
    config
        .validate()
        .map_err(crate::error::LockerError::Cache)?;

    match config {
        CacheConfig::Memory => Ok(Arc::new(MemoryCache::new())),
        CacheConfig::Redis { url } => {
            let cache = RedisCache::connect(url).await?;
            Ok(Arc::new(cache))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn from_config_memory_ok() {
        let cache = from_config(&CacheConfig::Memory).await.unwrap();
        cache.set("k", "v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        cache.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn from_config_rejects_bad_redis_url() {
        let config = CacheConfig::Redis {
            url: "localhost:6379".to_string(),
        };
        match from_config(&config).await {
            Ok(_) => panic!("expected error"),
            Err(crate::error::LockerError::Cache(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}
