//! Tenant, subproject and dataset services.
//!
//! Handlers parse requests and delegate here. Every service function takes
//! the shared [`AppState`] and the caller's identity, and returns
//! [`ApiResult`] so errors from the journal, locker and blob store surface
//! with their HTTP status.

pub mod dataset;
pub mod subproject;
pub mod tenant;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use sdms_core::{AccessPolicy, Acls, DatasetRecord, DatasetView, SubprojectRecord, TenantRecord};
use sdms_journal::{SubprojectRepo, TenantRepo};

pub(crate) async fn load_tenant(state: &AppState, tenant: &str) -> ApiResult<TenantRecord> {
    state
        .journal
        .get_tenant(tenant)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("tenant '{tenant}' does not exist")))
}

/// Load a tenant and one of its subprojects.
pub(crate) async fn load_context(
    state: &AppState,
    tenant: &str,
    subproject: &str,
) -> ApiResult<(TenantRecord, SubprojectRecord)> {
    let tenant_record = load_tenant(state, tenant).await?;
    let subproject_record = state
        .journal
        .get_subproject(tenant, subproject)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "subproject '{subproject}' does not exist in tenant '{tenant}'"
            ))
        })?;
    Ok((tenant_record, subproject_record))
}

/// ACLs governing a dataset. Dataset ACLs only count under the `dataset` policy.
pub(crate) fn dataset_acls<'a>(
    subproject: &'a SubprojectRecord,
    record: &'a DatasetRecord,
) -> &'a Acls {
    match (&record.acls, subproject.access_policy) {
        (Some(acls), AccessPolicy::Dataset) if !acls.is_empty() => acls,
        _ => &subproject.acls,
    }
}

pub(crate) fn decorate(view: DatasetView, tenant: &TenantRecord) -> DatasetView {
    view.with_decorated_ctag(&tenant.gcpid, tenant.data_partition())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdms_core::DatasetId;

    fn subproject(policy: AccessPolicy) -> SubprojectRecord {
        SubprojectRecord {
            tenant: "tenant-a".to_string(),
            name: "sub-b".to_string(),
            admin: "owner@contoso.com".to_string(),
            acls: Acls {
                admins: vec!["sub-admins@contoso.com".to_string()],
                viewers: vec!["sub-viewers@contoso.com".to_string()],
            },
            ltag: None,
            gcs_bucket: "ss-bucket".to_string(),
            storage_class: None,
            storage_location: None,
            access_policy: policy,
            enforce_key: false,
        }
    }

    #[test]
    fn test_dataset_acls_only_under_dataset_policy() {
        let id = DatasetId::new("tenant-a", "sub-b", "/x", "y.seg").unwrap();
        let mut record = DatasetRecord::new(&id, "owner@contoso.com");
        record.acls = Some(Acls {
            admins: vec!["ds-admins@contoso.com".to_string()],
            viewers: Vec::new(),
        });

        let uniform = subproject(AccessPolicy::Uniform);
        assert_eq!(dataset_acls(&uniform, &record), &uniform.acls);

        let per_dataset = subproject(AccessPolicy::Dataset);
        assert_eq!(
            dataset_acls(&per_dataset, &record).admins,
            vec!["ds-admins@contoso.com".to_string()]
        );

        record.acls = Some(Acls::default());
        assert_eq!(dataset_acls(&per_dataset, &record), &per_dataset.acls);
    }
}
