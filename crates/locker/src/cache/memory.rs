//! In-process cache backend.
//!
//! Expiry uses `tokio::time::Instant`, so tests running with a paused clock
//! can advance past TTLs deterministically.

use super::DistributedCache;
use crate::error::LockerResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Cache held in process memory. Only coordinates callers sharing the instance.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>, Instant) -> T) -> T {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        f(&mut entries, now)
    }
}

#[async_trait]
impl DistributedCache for MemoryCache {
    async fn get(&self, key: &str) -> LockerResult<Option<String>> {
        Ok(self.with_entries(|entries, _| entries.get(key).map(|e| e.value.clone())))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> LockerResult<()> {
        self.with_entries(|entries, now| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: ttl.map(|ttl| now + ttl),
                },
            );
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> LockerResult<()> {
        self.with_entries(|entries, _| {
            entries.remove(key);
        });
        Ok(())
    }

    async fn ttl(&self, key: &str) -> LockerResult<Option<Duration>> {
        Ok(self.with_entries(|entries, now| {
            entries
                .get(key)
                .and_then(|e| e.expires_at)
                .map(|at| at.saturating_duration_since(now))
        }))
    }

    async fn try_lock(&self, resource: &str, owner: &str, ttl: Duration) -> LockerResult<bool> {
        Ok(self.with_entries(|entries, now| {
            if entries.contains_key(resource) {
                return false;
            }
            entries.insert(
                resource.to_string(),
                Entry {
                    value: owner.to_string(),
                    expires_at: Some(now + ttl),
                },
            );
            true
        }))
    }

    async fn unlock(&self, resource: &str, owner: &str) -> LockerResult<bool> {
        Ok(self.with_entries(|entries, _| {
            if entries.get(resource).is_some_and(|e| e.value == owner) {
                entries.remove(resource);
                true
            } else {
                false
            }
        }))
    }

    async fn health_check(&self) -> LockerResult<()> {
        Ok(())
    }
}
