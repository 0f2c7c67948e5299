//! Tenant records.

use super::drain;
use crate::error::{JournalError, JournalResult};
use crate::journal::Journal;
use crate::key::{Entity, Key, TENANTS_KIND};
use crate::query::Query;
use async_trait::async_trait;
use sdms_core::{STORE_NAMESPACE, TenantRecord};

fn tenant_key<J: Journal + ?Sized>(journal: &J, name: &str) -> Key {
    journal.create_key(STORE_NAMESPACE, TENANTS_KIND, name)
}

/// Repository for tenants.
#[async_trait]
pub trait TenantRepo: Send + Sync {
    async fn get_tenant(&self, name: &str) -> JournalResult<Option<TenantRecord>>;

    /// Insert or overwrite a tenant.
    async fn save_tenant(&self, tenant: &TenantRecord) -> JournalResult<()>;

    /// Insert a tenant, failing if one with the same name exists.
    async fn insert_tenant(&self, tenant: &TenantRecord) -> JournalResult<()>;

    async fn list_tenants(&self) -> JournalResult<Vec<TenantRecord>>;
}

#[async_trait]
impl<J: Journal + ?Sized> TenantRepo for J {
    async fn get_tenant(&self, name: &str) -> JournalResult<Option<TenantRecord>> {
        let key = tenant_key(self, name);
        match self.get(&key).await? {
            Some(entity) => Ok(Some(entity.to_record()?)),
            None => Ok(None),
        }
    }

    async fn save_tenant(&self, tenant: &TenantRecord) -> JournalResult<()> {
        let entity = Entity::from_record(tenant_key(self, &tenant.name), tenant)?;
        self.save(&entity).await
    }

    async fn insert_tenant(&self, tenant: &TenantRecord) -> JournalResult<()> {
        let entity = Entity::from_record(tenant_key(self, &tenant.name), tenant)?;
        self.insert(&entity).await
    }

    async fn list_tenants(&self) -> JournalResult<Vec<TenantRecord>> {
        let entities = drain(self, Query::new(STORE_NAMESPACE, TENANTS_KIND)).await?;
        entities
            .iter()
            .map(|e| e.to_record::<TenantRecord>().map_err(JournalError::from))
            .collect()
    }
}
