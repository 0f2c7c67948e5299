//! Dataset write locks and multi-session read locks.
//!
//! Every transition is a read-decide-write on the lock state entry, run
//! while holding the key's distributed mutex. The mutex is released before
//! the operation returns, whatever its outcome.
//!
//! ```text
//! Unlocked -> WriteLocked -> Unlocked
//! Unlocked -> ReadLocked(1) -> ReadLocked(n) -> ... -> Unlocked
//! ```

use crate::cache::DistributedCache;
use crate::error::{LockerError, LockerResult};
use crate::metrics;
use crate::mutex::{DistributedMutex, MutexSettings};
use crate::state::{LockState, LockStateStore};
use sdms_core::config::LockerConfig;
use sdms_core::ids;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Outcome of a lock or unlock call: the surviving holder id and holder count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockResult {
    pub id: Option<String>,
    pub cnt: u32,
}

impl LockResult {
    pub fn unlocked() -> Self {
        Self { id: None, cnt: 0 }
    }

    fn held(id: impl Into<String>, cnt: usize) -> Self {
        Self {
            id: Some(id.into()),
            cnt: u32::try_from(cnt).unwrap_or(u32::MAX),
        }
    }
}

/// Write lock taken for a registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteLockSession {
    pub key: String,
    pub wid: String,
    /// The caller presented the id already holding the lock.
    pub idempotent: bool,
}

/// Lock lifetimes and mutex timing.
#[derive(Clone, Debug)]
pub struct LockerSettings {
    pub write_lock_ttl: Duration,
    pub read_lock_ttl: Duration,
    pub mutex: MutexSettings,
}

impl Default for LockerSettings {
    fn default() -> Self {
        Self::from(&LockerConfig::default())
    }
}

impl From<&LockerConfig> for LockerSettings {
    fn from(config: &LockerConfig) -> Self {
        Self {
            write_lock_ttl: config.write_lock_ttl(),
            read_lock_ttl: config.read_lock_ttl(),
            mutex: MutexSettings {
                ttl: config.mutex_ttl(),
                retry_count: config.mutex_retry_count,
                retry_delay: config.mutex_retry_delay(),
                retry_jitter: config.mutex_retry_jitter(),
            },
        }
    }
}

fn well_formed(id: &str) -> bool {
    id.len() > 1
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

fn check_write_id(id: &str) -> LockerResult<()> {
    if well_formed(id) && ids::is_write_lock_id(id) {
        Ok(())
    } else {
        Err(LockerError::InvalidLockId(format!(
            "'{id}' is not a write lock id (expected 'W' prefix)"
        )))
    }
}

fn check_read_id(id: &str) -> LockerResult<()> {
    if well_formed(id) && ids::is_read_lock_id(id) {
        Ok(())
    } else {
        Err(LockerError::InvalidLockId(format!(
            "'{id}' is not a read lock id (expected 'R' prefix)"
        )))
    }
}

fn check_any_id(id: &str) -> LockerResult<()> {
    if well_formed(id) && (ids::is_write_lock_id(id) || ids::is_read_lock_id(id)) {
        Ok(())
    } else {
        Err(LockerError::InvalidLockId(format!(
            "'{id}' is not a lock id (expected 'W' or 'R' prefix)"
        )))
    }
}

fn conflict(key: &str, requested: &str, state: &LockState) -> LockerError {
    metrics::LOCK_CONFLICTS.with_label_values(&[requested]).inc();
    let reason = match state {
        LockState::WriteLocked { .. } => "the dataset is write locked by another session",
        LockState::ReadLocked { .. } => "the dataset is read locked by other sessions",
        LockState::Unlocked => "the dataset lock changed concurrently",
    };
    info!(key = %key, requested, holders = state.holders(), "lock request refused");
    LockerError::Locked {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Distributed dataset locker.
#[derive(Clone)]
pub struct Locker {
    mutex: DistributedMutex,
    store: LockStateStore,
    settings: LockerSettings,
}

impl Locker {
    pub fn new(cache: Arc<dyn DistributedCache>, settings: LockerSettings) -> Self {
        Self {
            mutex: DistributedMutex::new(Arc::clone(&cache), settings.mutex.clone()),
            store: LockStateStore::new(cache),
            settings,
        }
    }

    pub fn from_config(cache: Arc<dyn DistributedCache>, config: &LockerConfig) -> Self {
        Self::new(cache, LockerSettings::from(config))
    }

    pub fn settings(&self) -> &LockerSettings {
        &self.settings
    }

    /// Take a write lock for a registration.
    ///
    /// Presenting the id that already holds the lock yields an idempotent
    /// session without touching the entry.
    pub async fn create_write_lock(
        &self,
        key: &str,
        wid: Option<&str>,
    ) -> LockerResult<WriteLockSession> {
        if let Some(wid) = wid {
            check_write_id(wid)?;
        }
        let guard = self.mutex.acquire(key).await?;
        let result = self.create_write_lock_held(key, wid).await;
        guard.release().await;
        result
    }

    async fn create_write_lock_held(
        &self,
        key: &str,
        wid: Option<&str>,
    ) -> LockerResult<WriteLockSession> {
        match self.store.get(key).await? {
            LockState::Unlocked => {
                let id = wid.map_or_else(ids::make_write_lock_id, str::to_string);
                self.store
                    .set(
                        key,
                        &LockState::WriteLocked { id: id.clone() },
                        Some(self.settings.write_lock_ttl),
                    )
                    .await?;
                metrics::LOCKS_ACQUIRED.with_label_values(&["write"]).inc();
                debug!(key = %key, wid = %id, "write lock created");
                Ok(WriteLockSession {
                    key: key.to_string(),
                    wid: id,
                    idempotent: false,
                })
            }
            LockState::WriteLocked { id } if Some(id.as_str()) == wid => {
                debug!(key = %key, wid = %id, "write lock replayed");
                Ok(WriteLockSession {
                    key: key.to_string(),
                    wid: id,
                    idempotent: true,
                })
            }
            state => Err(conflict(key, "write", &state)),
        }
    }

    /// Finish a registration's write lock session.
    ///
    /// With `keep` the lock stays with its holder. Otherwise the entry is
    /// removed, provided it still carries the session's id.
    pub async fn remove_write_lock(
        &self,
        session: &WriteLockSession,
        keep: bool,
    ) -> LockerResult<()> {
        if keep {
            return Ok(());
        }
        let guard = self.mutex.acquire(&session.key).await?;
        let result = self.remove_write_lock_held(session).await;
        guard.release().await;
        result
    }

    async fn remove_write_lock_held(&self, session: &WriteLockSession) -> LockerResult<()> {
        match self.store.get(&session.key).await? {
            LockState::WriteLocked { id } if id == session.wid => {
                self.store.delete(&session.key).await?;
                metrics::LOCKS_RELEASED.inc();
                debug!(key = %session.key, wid = %id, "write lock removed");
            }
            _ => {
                debug!(key = %session.key, wid = %session.wid, "write lock already gone");
            }
        }
        Ok(())
    }

    /// Take or reaffirm a write lock.
    ///
    /// `wid` (falling back to `proposed`) is matched against an existing
    /// lock. On an unlocked key the new id is `wid` when it is a write id,
    /// else `proposed`, else a generated one.
    pub async fn acquire_write_lock(
        &self,
        key: &str,
        proposed: Option<&str>,
        wid: Option<&str>,
    ) -> LockerResult<LockResult> {
        if let Some(proposed) = proposed {
            check_write_id(proposed)?;
        }
        if let Some(wid) = wid {
            check_any_id(wid)?;
        }
        let guard = self.mutex.acquire(key).await?;
        let result = self.acquire_write_lock_held(key, proposed, wid).await;
        guard.release().await;
        result
    }

    async fn acquire_write_lock_held(
        &self,
        key: &str,
        proposed: Option<&str>,
        wid: Option<&str>,
    ) -> LockerResult<LockResult> {
        let requested = wid.or(proposed);
        match self.store.get(key).await? {
            LockState::Unlocked => {
                let id = wid
                    .filter(|id| ids::is_write_lock_id(id))
                    .or(proposed)
                    .map_or_else(ids::make_write_lock_id, str::to_string);
                self.store
                    .set(
                        key,
                        &LockState::WriteLocked { id: id.clone() },
                        Some(self.settings.write_lock_ttl),
                    )
                    .await?;
                metrics::LOCKS_ACQUIRED.with_label_values(&["write"]).inc();
                debug!(key = %key, wid = %id, "write lock acquired");
                Ok(LockResult::held(id, 1))
            }
            LockState::WriteLocked { id } if Some(id.as_str()) == requested => {
                debug!(key = %key, wid = %id, "write lock reaffirmed");
                Ok(LockResult::held(id, 1))
            }
            state => Err(conflict(key, "write", &state)),
        }
    }

    /// Join (or start) the reader list of `key`.
    ///
    /// A `wid` already in the list is an idempotent join. Any other `wid`
    /// is ignored and a fresh session is appended. A writer presenting its
    /// own write id is let through without a state change.
    pub async fn acquire_read_lock(
        &self,
        key: &str,
        proposed: Option<&str>,
        wid: Option<&str>,
    ) -> LockerResult<LockResult> {
        if let Some(proposed) = proposed {
            check_read_id(proposed)?;
        }
        if let Some(wid) = wid {
            check_any_id(wid)?;
        }
        let guard = self.mutex.acquire(key).await?;
        let result = self.acquire_read_lock_held(key, proposed, wid).await;
        guard.release().await;
        result
    }

    async fn acquire_read_lock_held(
        &self,
        key: &str,
        proposed: Option<&str>,
        wid: Option<&str>,
    ) -> LockerResult<LockResult> {
        match self.store.get(key).await? {
            LockState::Unlocked => {
                let id = proposed.map_or_else(ids::make_read_lock_id, str::to_string);
                self.store
                    .set(
                        key,
                        &LockState::ReadLocked {
                            ids: vec![id.clone()],
                        },
                        Some(self.settings.read_lock_ttl),
                    )
                    .await?;
                metrics::LOCKS_ACQUIRED.with_label_values(&["read"]).inc();
                debug!(key = %key, rid = %id, "read lock acquired");
                Ok(LockResult::held(id, 1))
            }
            LockState::ReadLocked { mut ids } => {
                if let Some(existing) = [wid, proposed]
                    .into_iter()
                    .flatten()
                    .find(|id| ids.iter().any(|held| held == id))
                {
                    debug!(key = %key, rid = %existing, readers = ids.len(), "read lock rejoined");
                    return Ok(LockResult::held(existing, ids.len()));
                }
                let id = proposed.map_or_else(ids::make_read_lock_id, str::to_string);
                ids.push(id.clone());
                let cnt = ids.len();
                self.store
                    .set(
                        key,
                        &LockState::ReadLocked { ids },
                        Some(self.settings.read_lock_ttl),
                    )
                    .await?;
                metrics::LOCKS_ACQUIRED.with_label_values(&["read"]).inc();
                debug!(key = %key, rid = %id, readers = cnt, "read lock joined");
                Ok(LockResult::held(id, cnt))
            }
            LockState::WriteLocked { id } if Some(id.as_str()) == wid => {
                debug!(key = %key, wid = %id, "writer read its own lock");
                Ok(LockResult::held(id, 1))
            }
            state => Err(conflict(key, "read", &state)),
        }
    }

    /// Release one holder, or every holder when `wid` is `None`.
    pub async fn unlock(&self, key: &str, wid: Option<&str>) -> LockerResult<LockResult> {
        let guard = self.mutex.acquire(key).await?;
        let result = self.unlock_held(key, wid).await;
        guard.release().await;
        result
    }

    async fn unlock_held(&self, key: &str, wid: Option<&str>) -> LockerResult<LockResult> {
        let not_found = |wid: &str| LockerError::NotFound {
            key: key.to_string(),
            wid: wid.to_string(),
        };

        match (self.store.get(key).await?, wid) {
            (LockState::Unlocked, _) => Ok(LockResult::unlocked()),
            (LockState::WriteLocked { id }, wid) => {
                if let Some(wid) = wid
                    && wid != id
                {
                    return Err(not_found(wid));
                }
                self.store.delete(key).await?;
                metrics::LOCKS_RELEASED.inc();
                debug!(key = %key, wid = %id, "write lock released");
                Ok(LockResult::unlocked())
            }
            (LockState::ReadLocked { ids }, None) => {
                self.store.delete(key).await?;
                metrics::LOCKS_RELEASED.inc();
                debug!(key = %key, readers = ids.len(), "read locks force released");
                Ok(LockResult::unlocked())
            }
            (LockState::ReadLocked { mut ids }, Some(wid)) => {
                let Some(pos) = ids.iter().position(|held| held == wid) else {
                    return Err(not_found(wid));
                };
                ids.remove(pos);
                metrics::LOCKS_RELEASED.inc();
                if ids.is_empty() {
                    self.store.delete(key).await?;
                    debug!(key = %key, rid = %wid, "last reader released");
                    return Ok(LockResult::unlocked());
                }
                let ttl = self
                    .store
                    .ttl(key)
                    .await?
                    .unwrap_or(self.settings.read_lock_ttl);
                let result = LockResult::held(ids[0].clone(), ids.len());
                self.store
                    .set(key, &LockState::ReadLocked { ids }, Some(ttl))
                    .await?;
                debug!(key = %key, rid = %wid, readers = result.cnt, "reader released");
                Ok(result)
            }
        }
    }

    /// Current lock state, read without the mutex.
    pub async fn get_lock(&self, key: &str) -> LockerResult<LockState> {
        self.store.get(key).await
    }

    pub fn is_write_lock(state: &LockState) -> bool {
        state.is_write_lock()
    }
}
