//! Tenant seeding at startup.

use anyhow::{Context, Result, bail};
use sdms_core::TenantRecord;
use sdms_journal::{Journal, JournalError, TenantRepo};

/// Register the configured tenants that do not exist yet.
///
/// Existing tenants are left untouched, so edits to a seeded tenant in the
/// configuration do not overwrite the stored record. Returns how many
/// tenants were inserted.
pub async fn seed_tenants(journal: &dyn Journal, tenants: &[TenantRecord]) -> Result<usize> {
    let mut inserted = 0;
    for tenant in tenants {
        if let Err(e) = tenant.validate() {
            bail!("invalid seeded tenant '{}': {e}", tenant.name);
        }
        match journal.insert_tenant(tenant).await {
            Ok(()) => {
                tracing::info!(tenant = %tenant.name, esd = %tenant.esd, "Seeded tenant");
                inserted += 1;
            }
            Err(JournalError::AlreadyExists(_)) => {
                tracing::debug!(tenant = %tenant.name, "Tenant already registered");
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to seed tenant '{}'", tenant.name));
            }
        }
    }
    Ok(inserted)
}
