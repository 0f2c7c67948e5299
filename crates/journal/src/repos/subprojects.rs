//! Subproject records, one namespace per tenant.

use super::drain;
use crate::error::{JournalError, JournalResult};
use crate::journal::Journal;
use crate::key::{Entity, Key, SUBPROJECTS_KIND};
use crate::query::Query;
use async_trait::async_trait;
use sdms_core::{SubprojectRecord, subproject_namespace};

fn subproject_key<J: Journal + ?Sized>(journal: &J, tenant: &str, name: &str) -> Key {
    journal.create_key(&subproject_namespace(tenant), SUBPROJECTS_KIND, name)
}

/// Repository for subprojects.
#[async_trait]
pub trait SubprojectRepo: Send + Sync {
    async fn get_subproject(
        &self,
        tenant: &str,
        name: &str,
    ) -> JournalResult<Option<SubprojectRecord>>;

    /// Insert or overwrite a subproject.
    async fn save_subproject(&self, subproject: &SubprojectRecord) -> JournalResult<()>;

    /// Insert a subproject, failing if the name is taken in its tenant.
    async fn insert_subproject(&self, subproject: &SubprojectRecord) -> JournalResult<()>;

    /// Delete a subproject record. Returns whether it existed.
    async fn delete_subproject(&self, tenant: &str, name: &str) -> JournalResult<bool>;

    async fn list_subprojects(&self, tenant: &str) -> JournalResult<Vec<SubprojectRecord>>;
}

#[async_trait]
impl<J: Journal + ?Sized> SubprojectRepo for J {
    async fn get_subproject(
        &self,
        tenant: &str,
        name: &str,
    ) -> JournalResult<Option<SubprojectRecord>> {
        let key = subproject_key(self, tenant, name);
        match self.get(&key).await? {
            Some(entity) => Ok(Some(entity.to_record()?)),
            None => Ok(None),
        }
    }

    async fn save_subproject(&self, subproject: &SubprojectRecord) -> JournalResult<()> {
        let key = subproject_key(self, &subproject.tenant, &subproject.name);
        self.save(&Entity::from_record(key, subproject)?).await
    }

    async fn insert_subproject(&self, subproject: &SubprojectRecord) -> JournalResult<()> {
        let key = subproject_key(self, &subproject.tenant, &subproject.name);
        self.insert(&Entity::from_record(key, subproject)?).await
    }

    async fn delete_subproject(&self, tenant: &str, name: &str) -> JournalResult<bool> {
        self.delete(&subproject_key(self, tenant, name)).await
    }

    async fn list_subprojects(&self, tenant: &str) -> JournalResult<Vec<SubprojectRecord>> {
        let query = Query::new(subproject_namespace(tenant), SUBPROJECTS_KIND);
        drain(self, query)
            .await?
            .iter()
            .map(|e| e.to_record::<SubprojectRecord>().map_err(JournalError::from))
            .collect()
    }
}
