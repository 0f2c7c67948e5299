//! Dataset identity, lock keys and dataset records.

use crate::error::{Error, Result};
use crate::tenant::Acls;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use time::OffsetDateTime;

/// Scheme of a seismic store path.
pub const SDPATH_PREFIX: &str = "sd://";

/// ctag stored on records that predate ctag tracking.
pub const LEGACY_CTAG: &str = "0000000000000000";

/// Normalise a dataset directory path.
///
/// The result starts and ends with `/` and never contains empty, `.` or
/// `..` segments. The root directory is `/`.
pub fn normalize_path(path: &str) -> Result<String> {
    let mut out = String::from("/");
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return Err(Error::InvalidPath(format!(
                "'{path}' must not contain relative segments"
            )));
        }
        if segment.chars().any(|c| c.is_control()) {
            return Err(Error::InvalidPath(format!(
                "'{path}' contains control characters"
            )));
        }
        out.push_str(segment);
        out.push('/');
    }
    Ok(out)
}

/// Validate a dataset name.
pub fn validate_dataset_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 1024 {
        return Err(Error::InvalidName(format!(
            "dataset name must be between 1 and 1024 characters, got {}",
            name.len()
        )));
    }
    if name.contains('/') || name == "." || name == ".." {
        return Err(Error::InvalidName(format!("'{name}' is not a valid dataset name")));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(Error::InvalidName(format!("'{name}' contains control characters")));
    }
    Ok(())
}

/// Identity of a dataset: `(tenant, subproject, path, name)`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DatasetId {
    tenant: String,
    subproject: String,
    path: String,
    name: String,
}

impl DatasetId {
    /// Build an id, normalising the path and validating the name.
    pub fn new(
        tenant: impl Into<String>,
        subproject: impl Into<String>,
        path: &str,
        name: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        validate_dataset_name(&name)?;
        Ok(Self {
            tenant: tenant.into(),
            subproject: subproject.into(),
            path: normalize_path(path)?,
            name,
        })
    }

    /// Parse `sd://tenant/subproject/dir/.../name`.
    pub fn from_sdpath(sdpath: &str) -> Result<Self> {
        let rest = sdpath
            .strip_prefix(SDPATH_PREFIX)
            .ok_or_else(|| Error::InvalidSdPath(format!("'{sdpath}' must start with sd://")))?;
        let mut parts = rest.splitn(3, '/');
        let tenant = parts.next().filter(|s| !s.is_empty());
        let subproject = parts.next().filter(|s| !s.is_empty());
        let tail = parts.next().unwrap_or_default();
        let (Some(tenant), Some(subproject)) = (tenant, subproject) else {
            return Err(Error::InvalidSdPath(format!(
                "'{sdpath}' must name a tenant and a subproject"
            )));
        };
        let (dir, name) = match tail.rsplit_once('/') {
            Some((dir, name)) => (dir, name),
            None => ("", tail),
        };
        if name.is_empty() {
            return Err(Error::InvalidSdPath(format!("'{sdpath}' does not name a dataset")));
        }
        Self::new(tenant, subproject, dir, name)
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn subproject(&self) -> &str {
        &self.subproject
    }

    /// Directory path, always `/`-delimited on both ends.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key identifying this dataset in the lock cache.
    pub fn lock_key(&self) -> String {
        format!("{}/{}{}{}", self.tenant, self.subproject, self.path, self.name)
    }

    /// Name of this dataset's journal entry inside its subproject namespace.
    pub fn journal_name(&self) -> String {
        format!("{}{}", self.path, self.name)
    }

    /// Same dataset under a new name in the same directory.
    pub fn renamed(&self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_dataset_name(&name)?;
        Ok(Self {
            name,
            ..self.clone()
        })
    }

    pub fn to_sdpath(&self) -> String {
        format!(
            "{SDPATH_PREFIX}{}/{}{}{}",
            self.tenant, self.subproject, self.path, self.name
        )
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sdpath())
    }
}

impl fmt::Debug for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DatasetId({})", self.to_sdpath())
    }
}

fn default_ctag() -> String {
    LEGACY_CTAG.to_string()
}

/// Persisted dataset metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub tenant: String,
    pub subproject: String,
    pub path: String,
    pub name: String,
    /// Coherency tag, regenerated on every write.
    #[serde(default = "default_ctag")]
    pub ctag: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified_date: OffsetDateTime,
    /// `{bucket}/{prefix}` of the dataset's objects.
    #[serde(default)]
    pub gcsurl: String,
    #[serde(default)]
    pub ltag: Option<String>,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub filemetadata: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub gtags: Vec<String>,
    #[serde(default)]
    pub acls: Option<Acls>,
    #[serde(default)]
    pub storage_schema_record_type: Option<String>,
}

impl DatasetRecord {
    /// A fresh record for `id`, created now by `created_by`.
    pub fn new(id: &DatasetId, created_by: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            tenant: id.tenant().to_string(),
            subproject: id.subproject().to_string(),
            path: id.path().to_string(),
            name: id.name().to_string(),
            ctag: crate::ids::make_ctag(),
            created_by: created_by.into(),
            created_date: now,
            last_modified_date: now,
            gcsurl: String::new(),
            ltag: None,
            readonly: false,
            filemetadata: None,
            metadata: None,
            gtags: Vec::new(),
            acls: None,
            storage_schema_record_type: None,
        }
    }

    pub fn id(&self) -> Result<DatasetId> {
        DatasetId::new(&self.tenant, &self.subproject, &self.path, &self.name)
    }

    /// Split `gcsurl` into bucket and object prefix.
    pub fn storage_location(&self) -> Option<(&str, &str)> {
        let (bucket, prefix) = self.gcsurl.split_once('/')?;
        if bucket.is_empty() || prefix.is_empty() {
            return None;
        }
        Some((bucket, prefix))
    }

    /// Size recorded in `filemetadata.size`, or -1 when unknown.
    pub fn size(&self) -> i64 {
        self.filemetadata
            .as_ref()
            .and_then(|m| m.get("size"))
            .and_then(Value::as_i64)
            .unwrap_or(-1)
    }

    /// Regenerate the ctag after a mutation.
    pub fn touch_ctag(&mut self) {
        self.ctag = crate::ids::make_ctag();
    }

    /// Merge `tags` into `gtags`, skipping duplicates.
    pub fn merge_gtags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            let tag = tag.into();
            if !self.gtags.contains(&tag) {
                self.gtags.push(tag);
            }
        }
    }
}

/// A dataset as returned to clients: the record plus its live lock state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetView {
    #[serde(flatten)]
    pub record: DatasetRecord,
    /// Current lock id, or reader ids joined by `,`.
    pub sbit: Option<String>,
    /// Number of current lock holders.
    pub sbit_count: u32,
}

impl DatasetView {
    pub fn unlocked(record: DatasetRecord) -> Self {
        Self {
            record,
            sbit: None,
            sbit_count: 0,
        }
    }

    /// Decorate the ctag with the tenant's project and data partition.
    pub fn with_decorated_ctag(mut self, gcpid: &str, data_partition: &str) -> Self {
        self.record.ctag = format!("{}{gcpid};{data_partition}", self.record.ctag);
        self
    }
}
