//! The journal trait.

use crate::error::JournalResult;
use crate::key::{Entity, Key};
use crate::query::{Query, QueryPage};
use async_trait::async_trait;

/// Namespaced key/value store for tenant, subproject and dataset records.
#[async_trait]
pub trait Journal: Send + Sync {
    /// Build a key. Backends may override to validate components.
    fn create_key(&self, namespace: &str, kind: &str, name: &str) -> Key {
        Key::new(namespace, kind, name)
    }

    /// Fetch an entity by key.
    async fn get(&self, key: &Key) -> JournalResult<Option<Entity>>;

    /// Insert or overwrite an entity.
    async fn save(&self, entity: &Entity) -> JournalResult<()>;

    /// Insert an entity, failing with `AlreadyExists` if the key is taken.
    async fn insert(&self, entity: &Entity) -> JournalResult<()>;

    /// Delete an entity. Returns whether it existed.
    async fn delete(&self, key: &Key) -> JournalResult<bool>;

    /// Run a query and return one page of results ordered by key name.
    async fn run_query(&self, query: &Query) -> JournalResult<QueryPage>;

    /// Check backend connectivity.
    async fn health_check(&self) -> JournalResult<()>;
}
