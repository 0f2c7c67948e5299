//! Subproject service.

use super::{load_context, load_tenant};
use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use sdms_core::ids::make_id;
use sdms_core::tenant::validate_resource_name;
use sdms_core::{AccessPolicy, Acls, SubprojectRecord};
use sdms_journal::{DatasetListing, DatasetRepo, SubprojectRepo};
use sdms_storage::BucketOptions;
use serde::Deserialize;
use std::slice;
use tracing::{info, warn};

/// Attempts at drawing an unused bucket name.
const BUCKET_NAME_ATTEMPTS: usize = 5;

/// Datasets read per page while relabelling legal tags.
const RELABEL_PAGE_SIZE: usize = 1000;

/// Body of a subproject creation.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CreateSubproject {
    /// Subproject admin; the caller when absent.
    pub admin: Option<String>,
    #[serde(default)]
    pub acls: Acls,
    pub ltag: Option<String>,
    pub storage_class: Option<String>,
    pub storage_location: Option<String>,
    #[serde(default)]
    pub access_policy: AccessPolicy,
}

/// Body of a subproject patch.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PatchSubproject {
    pub acls: Option<Acls>,
    pub access_policy: Option<AccessPolicy>,
    pub ltag: Option<String>,
    /// Also move datasets carrying the old legal tag to the new one.
    #[serde(default)]
    pub recursive: bool,
}

fn dedup(groups: &mut Vec<String>) {
    let mut seen = Vec::with_capacity(groups.len());
    groups.retain(|g| {
        if seen.contains(g) {
            false
        } else {
            seen.push(g.clone());
            true
        }
    });
}

async fn allocate_bucket(state: &AppState) -> ApiResult<String> {
    for _ in 0..BUCKET_NAME_ATTEMPTS {
        let bucket = format!("ss-{}", make_id(24));
        if !state.storage.bucket_exists(&bucket).await? {
            return Ok(bucket);
        }
    }
    Err(ApiError::Internal(
        "unable to generate a unique bucket name".to_string(),
    ))
}

/// Create a subproject and provision its bucket.
///
/// Generated admin and viewer data groups are appended to the given ACLs.
pub async fn create(
    state: &AppState,
    user: &AuthenticatedUser,
    tenant: &str,
    name: &str,
    input: CreateSubproject,
) -> ApiResult<SubprojectRecord> {
    validate_resource_name(name)?;
    let tenant_record = load_tenant(state, tenant).await?;
    state
        .authorizer
        .is_write_authorized(user, slice::from_ref(&tenant_record.default_acls), true)
        .await?;
    if state.journal.get_subproject(tenant, name).await?.is_some() {
        return Err(ApiError::AlreadyExists(format!(
            "subproject '{name}' already exists in tenant '{tenant}'"
        )));
    }

    let suffix = make_id(8);
    let mut acls = input.acls;
    acls.admins
        .push(SubprojectRecord::data_admin_group(&tenant_record, name, &suffix));
    acls.viewers
        .push(SubprojectRecord::data_viewer_group(&tenant_record, name, &suffix));
    dedup(&mut acls.admins);
    dedup(&mut acls.viewers);

    let bucket = allocate_bucket(state).await?;
    let options = BucketOptions {
        storage_class: input.storage_class.clone(),
        location: input.storage_location.clone(),
    };
    state.storage.create_bucket(&bucket, &options).await?;

    let record = SubprojectRecord {
        tenant: tenant.to_string(),
        name: name.to_string(),
        admin: input.admin.unwrap_or_else(|| user.email.clone()),
        acls,
        ltag: input.ltag,
        gcs_bucket: bucket,
        storage_class: input.storage_class,
        storage_location: input.storage_location,
        access_policy: input.access_policy,
        enforce_key: state.config.server.enforce_key,
    };
    if let Err(e) = state.journal.insert_subproject(&record).await {
        if let Err(cleanup) = state.storage.delete_bucket(&record.gcs_bucket, true).await {
            warn!(bucket = %record.gcs_bucket, error = %cleanup, "failed to remove bucket of failed subproject");
        }
        return Err(e.into());
    }
    info!(tenant, subproject = name, bucket = %record.gcs_bucket, "subproject created");
    Ok(record)
}

pub async fn get(
    state: &AppState,
    user: &AuthenticatedUser,
    tenant: &str,
    name: &str,
) -> ApiResult<SubprojectRecord> {
    let (_, record) = load_context(state, tenant, name).await?;
    state
        .authorizer
        .is_write_authorized(user, &record.acls.writers(), true)
        .await?;
    Ok(record)
}

/// List a tenant's subprojects. Restricted to tenant admins.
pub async fn list(
    state: &AppState,
    user: &AuthenticatedUser,
    tenant: &str,
) -> ApiResult<Vec<SubprojectRecord>> {
    let tenant_record = load_tenant(state, tenant).await?;
    state
        .authorizer
        .is_write_authorized(user, slice::from_ref(&tenant_record.default_acls), true)
        .await?;
    Ok(state.journal.list_subprojects(tenant).await?)
}

/// Patch ACLs, access policy and legal tag.
///
/// The policy cannot go back from `dataset` to `uniform`. A recursive legal
/// tag change moves every dataset still carrying the old tag.
pub async fn patch(
    state: &AppState,
    user: &AuthenticatedUser,
    tenant: &str,
    name: &str,
    input: PatchSubproject,
) -> ApiResult<SubprojectRecord> {
    if input.acls.is_none() && input.access_policy.is_none() && input.ltag.is_none() {
        return Err(ApiError::BadRequest(
            "the request does not contain any field to patch".to_string(),
        ));
    }
    let (_, mut record) = load_context(state, tenant, name).await?;
    state
        .authorizer
        .is_write_authorized(user, &record.acls.writers(), true)
        .await?;

    if let Some(policy) = input.access_policy {
        if record.access_policy == AccessPolicy::Dataset && policy == AccessPolicy::Uniform {
            return Err(ApiError::BadRequest(
                "access policy cannot be changed from dataset to uniform".to_string(),
            ));
        }
        record.access_policy = policy;
    }
    if let Some(mut acls) = input.acls {
        if acls.admins.is_empty() {
            return Err(ApiError::BadRequest(
                "a subproject needs at least one admin group".to_string(),
            ));
        }
        dedup(&mut acls.admins);
        dedup(&mut acls.viewers);
        record.acls = acls;
    }
    if let Some(ltag) = input.ltag
        && record.ltag.as_deref() != Some(ltag.as_str())
    {
        let previous = record.ltag.replace(ltag.clone());
        if input.recursive {
            let moved = relabel_datasets(state, tenant, name, previous.as_deref(), &ltag).await?;
            info!(tenant, subproject = name, moved, "dataset legal tags updated");
        }
    }

    state.journal.save_subproject(&record).await?;
    Ok(record)
}

async fn relabel_datasets(
    state: &AppState,
    tenant: &str,
    subproject: &str,
    previous: Option<&str>,
    ltag: &str,
) -> ApiResult<u64> {
    let mut listing = DatasetListing {
        limit: Some(RELABEL_PAGE_SIZE),
        ..DatasetListing::default()
    };
    let mut moved = 0;
    loop {
        let page = state
            .journal
            .list_datasets(tenant, subproject, &listing)
            .await?;
        for mut record in page.datasets {
            if record.ltag.as_deref() == previous {
                record.ltag = Some(ltag.to_string());
                record.touch_ctag();
                state.journal.save_dataset(&record).await?;
                moved += 1;
            }
        }
        match page.next_cursor {
            Some(cursor) => listing.cursor = Some(cursor),
            None => break,
        }
    }
    Ok(moved)
}

/// Delete a subproject, its dataset records and its bucket.
///
/// The bucket removal is best-effort and only logged on failure.
pub async fn delete(
    state: &AppState,
    user: &AuthenticatedUser,
    tenant: &str,
    name: &str,
) -> ApiResult<()> {
    let (_, record) = load_context(state, tenant, name).await?;
    state
        .authorizer
        .is_write_authorized(user, &record.acls.writers(), true)
        .await?;

    state.journal.delete_subproject(tenant, name).await?;
    let removed = state.journal.delete_all_datasets(tenant, name).await?;
    if let Err(e) = state.storage.delete_bucket(&record.gcs_bucket, true).await {
        warn!(bucket = %record.gcs_bucket, error = %e, "failed to delete subproject bucket");
    }
    info!(tenant, subproject = name, datasets = removed, "subproject deleted");
    Ok(())
}
