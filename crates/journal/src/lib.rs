//! Journal store abstraction and implementations for the seismic DMS.
//!
//! This crate provides the persistence layer for records:
//! - A namespaced key/value [`Journal`] with filtered, cursor-paged queries
//! - In-memory and SQLite backends
//! - Typed repositories for tenants, subprojects and datasets

pub mod error;
pub mod journal;
pub mod key;
pub mod memory;
pub mod query;
pub mod repos;
pub mod store;

pub use error::{JournalError, JournalResult};
pub use journal::Journal;
pub use key::{DATASETS_KIND, Entity, Key, SUBPROJECTS_KIND, TENANTS_KIND};
pub use memory::MemoryJournal;
pub use query::{Filter, FilterOp, Query, QueryPage};
pub use repos::{
    ContentMode, DatasetListing, DatasetPage, DatasetRepo, DirectoryContent, SubprojectRepo,
    TenantRepo,
};
pub use store::SqliteJournal;

use sdms_core::config::JournalConfig;
use std::sync::Arc;

/// Create a journal from configuration.
pub async fn from_config(config: &JournalConfig) -> JournalResult<Arc<dyn Journal>> {
    match config {
        JournalConfig::Memory => {
            tracing::warn!("using in-memory journal; records are lost on restart");
            Ok(Arc::new(MemoryJournal::new()) as Arc<dyn Journal>)
        }
        JournalConfig::Sqlite {
            path,
            max_connections,
        } => {
            let journal = SqliteJournal::new(path, *max_connections).await?;
            Ok(Arc::new(journal) as Arc<dyn Journal>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_sqlite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("journal.db");
        let config = JournalConfig::Sqlite {
            path: db_path.clone(),
            max_connections: 2,
        };

        let journal = from_config(&config).await.unwrap();
        journal.health_check().await.unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_from_config_memory() {
        let journal = from_config(&JournalConfig::Memory).await.unwrap();
        journal.health_check().await.unwrap();
    }
}
