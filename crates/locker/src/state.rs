//! Lock state values and their cache encoding.
//!
//! On the wire a write lock is stored as its id (`W...`) and a reader list
//! as `rms:R...:R...`. Decoding happens here once; callers only ever see
//! [`LockState`].

use crate::cache::DistributedCache;
use crate::error::{LockerError, LockerResult};
use sdms_core::ids::{READ_LOCK_PREFIX, WRITE_LOCK_PREFIX};
use std::sync::Arc;
use std::time::Duration;

const READERS_MARKER: &str = "rms:";
const READERS_SEPARATOR: char = ':';

/// Lock held on a dataset key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    WriteLocked { id: String },
    /// Reader session ids in acquisition order. Never empty.
    ReadLocked { ids: Vec<String> },
}

impl LockState {
    pub fn is_write_lock(&self) -> bool {
        matches!(self, LockState::WriteLocked { .. })
    }

    pub fn is_unlocked(&self) -> bool {
        matches!(self, LockState::Unlocked)
    }

    /// Number of current holders.
    pub fn holders(&self) -> u32 {
        match self {
            LockState::Unlocked => 0,
            LockState::WriteLocked { .. } => 1,
            LockState::ReadLocked { ids } => u32::try_from(ids.len()).unwrap_or(u32::MAX),
        }
    }

    /// Holder ids for display, readers joined by `,`.
    pub fn sbit(&self) -> Option<String> {
        match self {
            LockState::Unlocked => None,
            LockState::WriteLocked { id } => Some(id.clone()),
            LockState::ReadLocked { ids } => Some(ids.join(",")),
        }
    }

    /// Encode for storage. `None` for [`LockState::Unlocked`], which has no entry.
    pub fn encode(&self) -> Option<String> {
        match self {
            LockState::Unlocked => None,
            LockState::WriteLocked { id } => Some(id.clone()),
            LockState::ReadLocked { ids } => {
                let sep = READERS_SEPARATOR.to_string();
                Some(format!("{READERS_MARKER}{}", ids.join(&sep)))
            }
        }
    }

    /// Decode a stored value.
    ///
    /// A bare `R...` id is accepted as a single-reader list.
    pub fn decode(key: &str, value: &str) -> LockerResult<Self> {
        let corrupt = || LockerError::CorruptState {
            key: key.to_string(),
            value: value.to_string(),
        };

        if let Some(rest) = value.strip_prefix(READERS_MARKER) {
            let ids: Vec<String> = rest
                .split(READERS_SEPARATOR)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
            if ids.is_empty() {
                return Ok(LockState::Unlocked);
            }
            if !ids.iter().all(|id| id.starts_with(READ_LOCK_PREFIX)) {
                return Err(corrupt());
            }
            return Ok(LockState::ReadLocked { ids });
        }
        if value.len() > 1 && value.starts_with(WRITE_LOCK_PREFIX) {
            return Ok(LockState::WriteLocked {
                id: value.to_string(),
            });
        }
        if value.len() > 1 && value.starts_with(READ_LOCK_PREFIX) {
            return Ok(LockState::ReadLocked {
                ids: vec![value.to_string()],
            });
        }
        Err(corrupt())
    }
}

/// Lock state entries in the shared cache.
///
/// Operations are plain cache calls. Read-modify-write sequences must run
/// under the key's [`DistributedMutex`](crate::mutex::DistributedMutex).
#[derive(Clone)]
pub struct LockStateStore {
    cache: Arc<dyn DistributedCache>,
}

impl LockStateStore {
    pub fn new(cache: Arc<dyn DistributedCache>) -> Self {
        Self { cache }
    }

    pub async fn get(&self, key: &str) -> LockerResult<LockState> {
        match self.cache.get(key).await? {
            Some(value) => LockState::decode(key, &value),
            None => Ok(LockState::Unlocked),
        }
    }

    /// Store `state`. Storing [`LockState::Unlocked`] deletes the entry.
    pub async fn set(&self, key: &str, state: &LockState, ttl: Option<Duration>) -> LockerResult<()> {
        match state.encode() {
            Some(value) => self.cache.set(key, &value, ttl).await,
            None => self.cache.delete(key).await,
        }
    }

    pub async fn delete(&self, key: &str) -> LockerResult<()> {
        self.cache.delete(key).await
    }

    pub async fn ttl(&self, key: &str) -> LockerResult<Option<Duration>> {
        self.cache.ttl(key).await
    }
}
