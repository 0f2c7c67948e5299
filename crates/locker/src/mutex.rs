//! Short-lived critical sections keyed by resource name.
//!
//! The mutex wraps the cache's atomic `try_lock` primitive:
//!
//! 1. Each attempt sets `mutex:{key}` to a random owner token if absent,
//!    with a TTL of a few seconds
//! 2. Failed attempts sleep `retry_delay` plus random jitter and retry
//! 3. Exhausting the retry budget fails with [`LockerError::Busy`]
//! 4. Release deletes the entry only while it still carries our token
//!
//! A holder that crashes leaves the entry to expire by TTL.

use crate::cache::DistributedCache;
use crate::error::{LockerError, LockerResult};
use crate::metrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Timing of mutex acquisition.
#[derive(Clone, Debug)]
pub struct MutexSettings {
    pub ttl: Duration,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub retry_jitter: Duration,
}

impl Default for MutexSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5),
            retry_count: 10,
            retry_delay: Duration::from_millis(200),
            retry_jitter: Duration::from_millis(200),
        }
    }
}

/// Cache key of the mutex guarding `key`.
pub fn mutex_key(key: &str) -> String {
    format!("mutex:{key}")
}

/// Distributed mutex over a shared cache.
#[derive(Clone)]
pub struct DistributedMutex {
    cache: Arc<dyn DistributedCache>,
    settings: MutexSettings,
}

impl DistributedMutex {
    pub fn new(cache: Arc<dyn DistributedCache>, settings: MutexSettings) -> Self {
        Self { cache, settings }
    }

    pub fn settings(&self) -> &MutexSettings {
        &self.settings
    }

    /// Take the mutex for `key`, retrying within the configured budget.
    pub async fn acquire(&self, key: &str) -> LockerResult<MutexGuard> {
        let resource = mutex_key(key);
        let owner = Uuid::new_v4().simple().to_string();

        for attempt in 1..=self.settings.retry_count {
            if self
                .cache
                .try_lock(&resource, &owner, self.settings.ttl)
                .await?
            {
                debug!(key = %key, attempt, "mutex acquired");
                return Ok(MutexGuard {
                    cache: Arc::clone(&self.cache),
                    resource,
                    owner,
                    released: false,
                });
            }

            metrics::MUTEX_RETRIES.inc();
            if attempt < self.settings.retry_count {
                tokio::time::sleep(self.settings.retry_delay + self.jitter()).await;
            }
        }

        metrics::MUTEX_TIMEOUTS.inc();
        debug!(key = %key, attempts = self.settings.retry_count, "mutex retry budget exhausted");
        Err(LockerError::Busy {
            key: key.to_string(),
        })
    }

    fn jitter(&self) -> Duration {
        let max = u64::try_from(self.settings.retry_jitter.as_millis()).unwrap_or(u64::MAX);
        if max == 0 {
            return Duration::ZERO;
        }
        // v4 uuids carry 122 random bits; the low 64 are enough here.
        let random = Uuid::new_v4().as_u128() as u64;
        Duration::from_millis(random % (max + 1))
    }
}

/// Ownership of a held mutex.
///
/// Call [`MutexGuard::release`] on every path. A guard dropped while still
/// held schedules its release on the current runtime.
pub struct MutexGuard {
    cache: Arc<dyn DistributedCache>,
    resource: String,
    owner: String,
    released: bool,
}

impl MutexGuard {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Release the mutex. Idempotent; failures are logged, never returned.
    pub async fn release(mut self) {
        self.do_release().await;
    }

    async fn do_release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match self.cache.unlock(&self.resource, &self.owner).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(resource = %self.resource, "mutex already expired before release");
            }
            Err(e) => {
                warn!(resource = %self.resource, error = %e, "failed to release mutex");
            }
        }
    }
}

impl Drop for MutexGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Outside a runtime the entry is left to expire.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let cache = Arc::clone(&self.cache);
        let resource = std::mem::take(&mut self.resource);
        let owner = std::mem::take(&mut self.owner);
        handle.spawn(async move {
            if let Err(e) = cache.unlock(&resource, &owner).await {
                warn!(resource = %resource, error = %e, "failed to release dropped mutex");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn settings(retry_count: u32) -> MutexSettings {
        MutexSettings {
            ttl: Duration::from_secs(5),
            retry_count,
            retry_delay: Duration::from_millis(50),
            retry_jitter: Duration::from_millis(10),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_and_release() {
        let cache: Arc<dyn DistributedCache> = Arc::new(MemoryCache::new());
        let mutex = DistributedMutex::new(Arc::clone(&cache), settings(3));

        let guard = mutex.acquire("t/s/d").await.unwrap();
        assert_eq!(guard.resource(), "mutex:t/s/d");
        assert!(cache.get("mutex:t/s/d").await.unwrap().is_some());

        guard.release().await;
        assert!(cache.get("mutex:t/s/d").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn contended_mutex_times_out_as_busy() {
        let cache: Arc<dyn DistributedCache> = Arc::new(MemoryCache::new());
        let mutex = DistributedMutex::new(cache, settings(3));

        let held = mutex.acquire("k").await.unwrap();
        let err = mutex.acquire("k").await.err().unwrap();
        assert!(matches!(err, LockerError::Busy { ref key } if key == "k"));
        assert!(err.is_locked());
        held.release().await;
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_gets_mutex_after_expiry() {
        let cache: Arc<dyn DistributedCache> = Arc::new(MemoryCache::new());
        let short = DistributedMutex::new(
            Arc::clone(&cache),
            MutexSettings {
                ttl: Duration::from_millis(120),
                ..settings(1)
            },
        );
        let patient = DistributedMutex::new(cache, settings(10));

        let abandoned = short.acquire("k").await.unwrap();
        std::mem::forget(abandoned);

        let guard = patient.acquire("k").await.unwrap();
        guard.release().await;
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let cache: Arc<dyn DistributedCache> = Arc::new(MemoryCache::new());
        let mutex = DistributedMutex::new(cache, settings(1));

        let a = mutex.acquire("a").await.unwrap();
        let b = mutex.acquire("b").await.unwrap();
        a.release().await;
        b.release().await;
    }

    #[tokio::test]
    async fn dropped_guard_releases() {
        let cache: Arc<dyn DistributedCache> = Arc::new(MemoryCache::new());
        let mutex = DistributedMutex::new(Arc::clone(&cache), settings(1));

        drop(mutex.acquire("k").await.unwrap());
        // Let the spawned release run.
        for _ in 0..10 {
            tokio::task::yield_now().await;
            if cache.get("mutex:k").await.unwrap().is_none() {
                break;
            }
        }
        assert!(cache.get("mutex:k").await.unwrap().is_none());
    }
}
