//! Dataset metadata service.
//!
//! Every mutation runs against the dataset's lock key. Registration takes
//! the write lock before touching the journal and releases it on failure;
//! patch, delete and gtag updates first check, advisorily, that nobody
//! holds the write lock. The lock state is attached to returned records as
//! `sbit` and `sbit_count`.

use super::{dataset_acls, decorate, load_context};
use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use futures::future::try_join_all;
use sdms_core::ids::is_write_lock_id;
use sdms_core::{AccessPolicy, Acls, DatasetId, DatasetRecord, DatasetView, SubprojectRecord, TenantRecord};
use sdms_journal::{ContentMode, DatasetListing, DatasetRepo};
use sdms_locker::{LockResult, LockState, WriteLockSession};
use sdms_storage::traits::validate_object;
use sdms_storage::{SignedMethod, SignedUrl};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Body of a dataset registration.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RegisterDataset {
    /// Legal tag; inherited from the subproject when absent.
    pub ltag: Option<String>,
    pub filemetadata: Option<Value>,
    pub metadata: Option<Value>,
    #[serde(default)]
    pub gtags: Vec<String>,
    #[serde(default)]
    pub readonly: bool,
    pub acls: Option<Acls>,
    pub storage_schema_record_type: Option<String>,
}

/// Body of a dataset patch. Absent fields are left unchanged.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PatchDataset {
    /// New dataset name, in the same directory.
    pub name: Option<String>,
    pub metadata: Option<Value>,
    pub filemetadata: Option<Value>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_modified_date: Option<OffsetDateTime>,
    pub readonly: Option<bool>,
    pub gtags: Option<Vec<String>>,
    pub ltag: Option<String>,
    pub acls: Option<Acls>,
    pub storage_schema_record_type: Option<String>,
}

impl PatchDataset {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.metadata.is_none()
            && self.filemetadata.is_none()
            && self.last_modified_date.is_none()
            && self.readonly.is_none()
            && self.gtags.is_none()
            && self.ltag.is_none()
            && self.acls.is_none()
            && self.storage_schema_record_type.is_none()
    }
}

/// One page of a subproject's datasets.
#[derive(Debug, Serialize)]
pub struct DatasetList {
    pub datasets: Vec<DatasetView>,
    pub next_page_cursor: Option<String>,
}

/// Datasets and sub-directories directly under a path.
#[derive(Debug, Serialize)]
pub struct ContentListing {
    pub datasets: Vec<String>,
    pub directories: Vec<String>,
}

/// What the caller may do with a dataset.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
}

fn with_lock(record: DatasetRecord, lock: &LockState) -> DatasetView {
    DatasetView {
        record,
        sbit: lock.sbit(),
        sbit_count: lock.holders(),
    }
}

fn with_result(record: DatasetRecord, result: LockResult) -> DatasetView {
    DatasetView {
        record,
        sbit: result.id,
        sbit_count: result.cnt,
    }
}

fn held_by(record: DatasetRecord, session: &WriteLockSession) -> DatasetView {
    DatasetView {
        record,
        sbit: Some(session.wid.clone()),
        sbit_count: 1,
    }
}

fn reject_dataset_acls(subproject: &SubprojectRecord, acls: Option<&Acls>) -> ApiResult<()> {
    if acls.is_some() && subproject.access_policy == AccessPolicy::Uniform {
        return Err(ApiError::BadRequest(format!(
            "subproject '{}' has a uniform access policy; dataset acls cannot be set",
            subproject.name
        )));
    }
    Ok(())
}

async fn fetch(state: &AppState, id: &DatasetId) -> ApiResult<DatasetRecord> {
    state
        .journal
        .get_dataset(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("dataset {id} does not exist")))
}

/// Refuse to mutate a write-locked dataset.
///
/// Advisory only: the lock may be taken right after this check.
async fn ensure_not_write_locked(state: &AppState, key: &str) -> ApiResult<()> {
    if state.skip_write_lock_check() {
        return Ok(());
    }
    if state.locker.get_lock(key).await?.is_write_lock() {
        return Err(ApiError::Locked(format!("{key} is write locked")));
    }
    Ok(())
}

/// Register a new dataset under a fresh write lock.
///
/// Presenting the id that already holds the lock on an existing record
/// replays the registration and returns the stored record; while that
/// registration has not written its record yet the replay is refused as
/// locked. On failure any record written here is deleted and the lock
/// released.
pub async fn register(
    state: &AppState,
    user: &AuthenticatedUser,
    id: &DatasetId,
    lock_id: Option<&str>,
    input: RegisterDataset,
) -> ApiResult<DatasetView> {
    let (tenant, subproject) = load_context(state, id.tenant(), id.subproject()).await?;
    reject_dataset_acls(&subproject, input.acls.as_ref())?;
    state
        .authorizer
        .is_write_authorized(user, &subproject.acls.writers(), true)
        .await?;

    let session = state.locker.create_write_lock(&id.lock_key(), lock_id).await?;
    if session.idempotent {
        // The lock belongs to the registration that created it; a replay
        // never writes and never releases it.
        return match state.journal.get_dataset(id).await? {
            Some(record) => {
                debug!(dataset = %id, wid = %session.wid, "registration replayed");
                Ok(decorate(held_by(record, &session), &tenant))
            }
            None => Err(ApiError::Locked(format!(
                "registration of {id} with lock {} is still in progress",
                session.wid
            ))),
        };
    }

    let mut written = false;
    match write_registration(state, user, id, &subproject, &session, input, &mut written).await {
        Ok(record) => {
            info!(dataset = %id, wid = %session.wid, "dataset registered");
            Ok(decorate(held_by(record, &session), &tenant))
        }
        Err(err) => {
            if written && let Err(e) = state.journal.delete_dataset(id).await {
                warn!(dataset = %id, error = %e, "failed to roll back dataset record");
            }
            if let Err(e) = state.locker.remove_write_lock(&session, false).await {
                warn!(dataset = %id, wid = %session.wid, error = %e, "failed to release registration lock");
            }
            Err(err)
        }
    }
}

async fn write_registration(
    state: &AppState,
    user: &AuthenticatedUser,
    id: &DatasetId,
    subproject: &SubprojectRecord,
    session: &WriteLockSession,
    input: RegisterDataset,
    written: &mut bool,
) -> ApiResult<DatasetRecord> {
    let ltag = input
        .ltag
        .filter(|l| !l.is_empty())
        .or_else(|| subproject.ltag.clone())
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "no legal tag given for {id} and subproject '{}' has none",
                subproject.name
            ))
        })?;
    if state.journal.dataset_exists(id).await? {
        return Err(ApiError::AlreadyExists(format!("dataset {id} already exists")));
    }

    let mut record = DatasetRecord::new(id, &user.email);
    record.ltag = Some(ltag);
    record.gcsurl = format!("{}/{}", subproject.gcs_bucket, Uuid::new_v4().simple());
    record.readonly = input.readonly;
    record.filemetadata = input.filemetadata;
    record.metadata = input.metadata;
    record.merge_gtags(input.gtags);
    record.acls = input.acls;
    record.storage_schema_record_type = input.storage_schema_record_type;

    state.journal.insert_dataset(&record).await?;
    *written = true;

    // The lock may have expired or been force released during the write.
    match state.locker.get_lock(&session.key).await? {
        LockState::WriteLocked { id: holder } if holder == session.wid => Ok(record),
        _ => Err(ApiError::Locked(format!(
            "write lock on {id} was lost during registration"
        ))),
    }
}

/// Get a dataset with its live lock state.
pub async fn get(
    state: &AppState,
    user: &AuthenticatedUser,
    id: &DatasetId,
) -> ApiResult<DatasetView> {
    let (tenant, subproject) = load_context(state, id.tenant(), id.subproject()).await?;
    let record = fetch(state, id).await?;
    state
        .authorizer
        .is_read_authorized(user, &dataset_acls(&subproject, &record).readers(), true)
        .await?;
    let lock = state.locker.get_lock(&id.lock_key()).await?;
    Ok(decorate(with_lock(record, &lock), &tenant))
}

/// Whether `ctag` is the dataset's current ctag, raw or decorated.
pub async fn check_ctag(state: &AppState, id: &DatasetId, ctag: &str) -> ApiResult<bool> {
    let (tenant, _) = load_context(state, id.tenant(), id.subproject()).await?;
    let record = fetch(state, id).await?;
    if record.ctag == ctag {
        return Ok(true);
    }
    let decorated = decorate(DatasetView::unlocked(record), &tenant);
    Ok(decorated.record.ctag == ctag)
}

/// List a subproject's datasets, one page at a time.
///
/// Listed records carry no lock state.
pub async fn list(
    state: &AppState,
    user: &AuthenticatedUser,
    tenant: &str,
    subproject: &str,
    listing: &DatasetListing,
) -> ApiResult<DatasetList> {
    let (tenant_record, subproject_record) = load_context(state, tenant, subproject).await?;
    state
        .authorizer
        .is_read_authorized(user, &subproject_record.acls.readers(), true)
        .await?;
    let page = state
        .journal
        .list_datasets(tenant, subproject, listing)
        .await?;
    let datasets = page
        .datasets
        .into_iter()
        .map(|record| decorate(DatasetView::unlocked(record), &tenant_record))
        .collect();
    Ok(DatasetList {
        datasets,
        next_page_cursor: page.next_cursor,
    })
}

pub async fn list_content(
    state: &AppState,
    user: &AuthenticatedUser,
    tenant: &str,
    subproject: &str,
    path: &str,
    mode: ContentMode,
) -> ApiResult<ContentListing> {
    let (_, subproject_record) = load_context(state, tenant, subproject).await?;
    state
        .authorizer
        .is_read_authorized(user, &subproject_record.acls.readers(), true)
        .await?;
    let path = sdms_core::dataset::normalize_path(path)?;
    let content = state
        .journal
        .list_content(tenant, subproject, &path, mode)
        .await?;
    Ok(ContentListing {
        datasets: content.datasets,
        directories: content.directories,
    })
}

/// Delete a dataset, its objects and its lock.
///
/// Deleting a missing dataset succeeds. Object cleanup is best-effort.
pub async fn delete(state: &AppState, user: &AuthenticatedUser, id: &DatasetId) -> ApiResult<()> {
    let (_, subproject) = load_context(state, id.tenant(), id.subproject()).await?;
    let key = id.lock_key();
    ensure_not_write_locked(state, &key).await?;
    let Some(record) = state.journal.get_dataset(id).await? else {
        debug!(dataset = %id, "delete of missing dataset");
        return Ok(());
    };
    state
        .authorizer
        .is_write_authorized(user, &dataset_acls(&subproject, &record).writers(), true)
        .await?;
    let (bucket, prefix) = record
        .storage_location()
        .ok_or_else(|| ApiError::Internal(format!("dataset {id} has no storage location")))?;

    state.journal.delete_dataset(id).await?;
    match state.storage.delete_prefix(bucket, &format!("{prefix}/")).await {
        Ok(removed) => debug!(dataset = %id, removed, "dataset objects removed"),
        Err(e) => warn!(dataset = %id, error = %e, "failed to remove dataset objects"),
    }
    state.locker.unlock(&key, None).await?;
    info!(dataset = %id, "dataset deleted");
    Ok(())
}

/// Patch a dataset.
///
/// An empty body with a lock id only closes that lock session. Otherwise the
/// given session, if any, is closed first and the fields are applied.
pub async fn patch(
    state: &AppState,
    user: &AuthenticatedUser,
    id: &DatasetId,
    wid: Option<&str>,
    input: Option<PatchDataset>,
) -> ApiResult<DatasetView> {
    let (tenant, subproject) = load_context(state, id.tenant(), id.subproject()).await?;
    let input = match (input.filter(|p| !p.is_empty()), wid) {
        (None, Some(wid)) => return close(state, user, id, &tenant, &subproject, wid).await,
        (input, _) => input.unwrap_or_default(),
    };
    reject_dataset_acls(&subproject, input.acls.as_ref())?;

    let key = id.lock_key();
    let mut record = fetch(state, id).await?;
    state
        .authorizer
        .is_write_authorized(user, &dataset_acls(&subproject, &record).writers(), true)
        .await?;
    let target = match input.name {
        Some(name) if name == id.name() => {
            return Err(ApiError::AlreadyExists(format!(
                "dataset {id} already has the name '{name}'"
            )));
        }
        Some(name) => Some(id.renamed(name)?),
        None => None,
    };
    if let Some(new_id) = &target
        && state.journal.dataset_exists(new_id).await?
    {
        return Err(ApiError::AlreadyExists(format!(
            "dataset {new_id} already exists"
        )));
    }

    // Validation precedes closing the caller's session.
    let closed = match wid {
        Some(wid) => Some(state.locker.unlock(&key, Some(wid)).await?),
        None => None,
    };
    ensure_not_write_locked(state, &key).await?;

    if let Some(metadata) = input.metadata {
        record.metadata = Some(metadata);
    }
    if let Some(filemetadata) = input.filemetadata {
        record.filemetadata = Some(filemetadata);
    }
    record.last_modified_date = input
        .last_modified_date
        .unwrap_or_else(OffsetDateTime::now_utc);
    if let Some(readonly) = input.readonly {
        record.readonly = readonly;
    }
    if let Some(gtags) = input.gtags.filter(|t| !t.is_empty()) {
        record.gtags = gtags;
    }
    if let Some(ltag) = input.ltag {
        record.ltag = Some(ltag);
    }
    if let Some(acls) = input.acls {
        record.acls = Some(acls);
    }
    if let Some(schema) = input.storage_schema_record_type {
        record.storage_schema_record_type = Some(schema);
    }
    record.touch_ctag();

    match &target {
        Some(new_id) => {
            record.name = new_id.name().to_string();
            state.journal.insert_dataset(&record).await?;
            state.journal.delete_dataset(id).await?;
            info!(dataset = %id, renamed = %new_id, "dataset renamed");
        }
        None => state.journal.save_dataset(&record).await?,
    }

    let view = match closed {
        Some(result) => with_result(record, result),
        None => {
            let current = target.as_ref().unwrap_or(id);
            let lock = state.locker.get_lock(&current.lock_key()).await?;
            with_lock(record, &lock)
        }
    };
    Ok(decorate(view, &tenant))
}

async fn close(
    state: &AppState,
    user: &AuthenticatedUser,
    id: &DatasetId,
    tenant: &TenantRecord,
    subproject: &SubprojectRecord,
    wid: &str,
) -> ApiResult<DatasetView> {
    let record = fetch(state, id).await?;
    let acls = dataset_acls(subproject, &record);
    if is_write_lock_id(wid) {
        let groups = acls.writers();
        state
            .authorizer
            .is_write_authorized(user, &groups, true)
            .await?;
    } else {
        let groups = acls.readers();
        state
            .authorizer
            .is_read_authorized(user, &groups, true)
            .await?;
    }
    let result = state.locker.unlock(&id.lock_key(), Some(wid)).await?;
    debug!(dataset = %id, wid, remaining = result.cnt, "lock session closed");
    Ok(decorate(with_result(record, result), tenant))
}

/// Open a dataset for writing or reading.
///
/// Read-only datasets cannot be opened for write and are opened for read
/// without taking a lock.
pub async fn lock(
    state: &AppState,
    user: &AuthenticatedUser,
    id: &DatasetId,
    open_for_write: bool,
    proposed: Option<&str>,
    wid: Option<&str>,
) -> ApiResult<DatasetView> {
    let (tenant, subproject) = load_context(state, id.tenant(), id.subproject()).await?;
    let record = fetch(state, id).await?;
    let acls = dataset_acls(&subproject, &record);
    if open_for_write {
        let groups = acls.writers();
        state
            .authorizer
            .is_write_authorized(user, &groups, true)
            .await?;
    } else {
        let groups = acls.readers();
        state
            .authorizer
            .is_read_authorized(user, &groups, true)
            .await?;
    }

    if record.readonly {
        if open_for_write {
            return Err(ApiError::BadRequest(format!(
                "dataset {id} is read-only and cannot be opened for write"
            )));
        }
        return Ok(decorate(DatasetView::unlocked(record), &tenant));
    }

    let key = id.lock_key();
    let result = if open_for_write {
        state.locker.acquire_write_lock(&key, proposed, wid).await?
    } else {
        state.locker.acquire_read_lock(&key, proposed, wid).await?
    };
    Ok(decorate(with_result(record, result), &tenant))
}

/// Force release every lock on a dataset.
///
/// Also clears the orphan lock of a registration that never wrote its record.
pub async fn unlock(state: &AppState, user: &AuthenticatedUser, id: &DatasetId) -> ApiResult<()> {
    let (_, subproject) = load_context(state, id.tenant(), id.subproject()).await?;
    let key = id.lock_key();
    let groups = match state.journal.get_dataset(id).await? {
        Some(record) => dataset_acls(&subproject, &record).writers(),
        None => {
            if state.locker.get_lock(&key).await?.is_unlocked() {
                return Err(ApiError::NotFound(format!("dataset {id} does not exist")));
            }
            subproject.acls.writers()
        }
    };
    state
        .authorizer
        .is_write_authorized(user, &groups, true)
        .await?;
    state.locker.unlock(&key, None).await?;
    info!(dataset = %id, "dataset force unlocked");
    Ok(())
}

/// Parse `/dir/.../name` entries of a bulk request, after checking read access.
async fn resolve_paths(
    state: &AppState,
    user: &AuthenticatedUser,
    tenant: &str,
    subproject: &str,
    paths: &[String],
) -> ApiResult<Vec<DatasetId>> {
    if paths.is_empty() {
        return Err(ApiError::BadRequest("no datasets given".to_string()));
    }
    let (_, subproject_record) = load_context(state, tenant, subproject).await?;
    state
        .authorizer
        .is_read_authorized(user, &subproject_record.acls.readers(), true)
        .await?;
    paths
        .iter()
        .map(|p| {
            let (dir, name) = p.rsplit_once('/').unwrap_or(("", p));
            DatasetId::new(tenant, subproject, dir, name).map_err(ApiError::from)
        })
        .collect()
}

pub async fn exists(
    state: &AppState,
    user: &AuthenticatedUser,
    tenant: &str,
    subproject: &str,
    paths: &[String],
) -> ApiResult<Vec<bool>> {
    let ids = resolve_paths(state, user, tenant, subproject, paths).await?;
    let found = try_join_all(ids.iter().map(|id| state.journal.dataset_exists(id))).await?;
    Ok(found)
}

/// Recorded sizes of the given datasets; -1 for missing or unsized ones.
pub async fn sizes(
    state: &AppState,
    user: &AuthenticatedUser,
    tenant: &str,
    subproject: &str,
    paths: &[String],
) -> ApiResult<Vec<i64>> {
    let ids = resolve_paths(state, user, tenant, subproject, paths).await?;
    let records = try_join_all(ids.iter().map(|id| state.journal.get_dataset(id))).await?;
    Ok(records
        .iter()
        .map(|r| r.as_ref().map_or(-1, DatasetRecord::size))
        .collect())
}

pub async fn permissions(
    state: &AppState,
    user: &AuthenticatedUser,
    id: &DatasetId,
) -> ApiResult<Permissions> {
    let (_, subproject) = load_context(state, id.tenant(), id.subproject()).await?;
    let record = fetch(state, id).await?;
    let acls = dataset_acls(&subproject, &record);
    let read = state
        .authorizer
        .is_read_authorized(user, &acls.readers(), false)
        .await?;
    let write = state
        .authorizer
        .is_write_authorized(user, &acls.writers(), false)
        .await?;
    Ok(Permissions {
        read,
        write,
        delete: write,
    })
}

/// Merge tags into a dataset's gtags.
pub async fn put_gtags(
    state: &AppState,
    user: &AuthenticatedUser,
    id: &DatasetId,
    gtags: Vec<String>,
) -> ApiResult<()> {
    if gtags.is_empty() {
        return Err(ApiError::BadRequest("no gtags given".to_string()));
    }
    let (_, subproject) = load_context(state, id.tenant(), id.subproject()).await?;
    ensure_not_write_locked(state, &id.lock_key()).await?;
    let mut record = fetch(state, id).await?;
    state
        .authorizer
        .is_write_authorized(user, &dataset_acls(&subproject, &record).writers(), true)
        .await?;
    record.merge_gtags(gtags);
    record.touch_ctag();
    state.journal.save_dataset(&record).await?;
    Ok(())
}

/// Issue a signed URL for one object under the dataset's storage prefix.
pub async fn signed_url(
    state: &AppState,
    user: &AuthenticatedUser,
    id: &DatasetId,
    method: SignedMethod,
    object: &str,
) -> ApiResult<SignedUrl> {
    let (_, subproject) = load_context(state, id.tenant(), id.subproject()).await?;
    let record = fetch(state, id).await?;
    let acls = dataset_acls(&subproject, &record);
    match method {
        SignedMethod::Upload => {
            let groups = acls.writers();
            state
                .authorizer
                .is_write_authorized(user, &groups, true)
                .await?;
            if record.readonly {
                return Err(ApiError::BadRequest(format!(
                    "dataset {id} is read-only"
                )));
            }
        }
        SignedMethod::Download => {
            let groups = acls.readers();
            state
                .authorizer
                .is_read_authorized(user, &groups, true)
                .await?;
        }
    }
    let (bucket, prefix) = record
        .storage_location()
        .ok_or_else(|| ApiError::Internal(format!("dataset {id} has no storage location")))?;
    let object = format!("{prefix}/{object}");
    validate_object(&object)?;
    Ok(state.signer.sign(method, bucket, &object))
}
