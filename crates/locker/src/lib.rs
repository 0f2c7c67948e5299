//! Distributed dataset locking for the seismic DMS.
//!
//! This crate provides:
//! - A shared cache abstraction with in-memory and Redis backends
//! - A distributed mutex built on the cache's atomic primitive
//! - The lock state store, decoding cache values into [`LockState`]
//! - The [`Locker`]: write locks and multi-session read locks per dataset

pub mod cache;
pub mod error;
pub mod locker;
pub mod metrics;
pub mod mutex;
pub mod state;

pub use cache::{DistributedCache, MemoryCache, RedisCache};
pub use error::{LockerError, LockerResult};
pub use locker::{LockResult, Locker, LockerSettings, WriteLockSession};
pub use mutex::{DistributedMutex, MutexGuard, MutexSettings};
pub use state::{LockState, LockStateStore};
