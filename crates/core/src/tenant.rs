//! Tenant and subproject records.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix of generated data group names.
pub const DATA_GROUP_PREFIX: &str = "data.sdms";

/// Validate a tenant or subproject name.
///
/// Names are lowercase ASCII letters, digits and `-`, must start with a
/// letter and be at most 64 characters long.
pub fn validate_resource_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 {
        return Err(Error::InvalidName(format!(
            "'{name}' must be between 1 and 64 characters"
        )));
    }
    let mut chars = name.chars();
    if !chars.next().is_some_and(|c| c.is_ascii_lowercase()) {
        return Err(Error::InvalidName(format!(
            "'{name}' must start with a lowercase letter"
        )));
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err(Error::InvalidName(format!(
            "'{name}' may only contain lowercase letters, digits and '-'"
        )));
    }
    Ok(())
}

/// A tenant: the top of the resource hierarchy, bound to one data partition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub name: String,
    /// Entitlement service domain, `{data_partition}.{domain}`.
    pub esd: String,
    /// Cloud project id, appended to response ctags.
    pub gcpid: String,
    /// Group allowed to administer the tenant.
    pub default_acls: String,
}

impl TenantRecord {
    pub fn validate(&self) -> Result<()> {
        validate_resource_name(&self.name)?;
        if !self.esd.contains('.') {
            return Err(Error::InvalidName(format!(
                "esd '{}' must be of the form <partition>.<domain>",
                self.esd
            )));
        }
        Ok(())
    }

    /// Data partition id: the first label of the esd.
    pub fn data_partition(&self) -> &str {
        self.esd.split('.').next().unwrap_or(&self.esd)
    }
}

/// Which ACLs govern dataset access inside a subproject.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessPolicy {
    /// Only the subproject ACLs apply.
    #[default]
    Uniform,
    /// Datasets may carry their own ACLs.
    Dataset,
}

impl AccessPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessPolicy::Uniform => "uniform",
            AccessPolicy::Dataset => "dataset",
        }
    }
}

impl fmt::Display for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uniform" => Ok(AccessPolicy::Uniform),
            "dataset" => Ok(AccessPolicy::Dataset),
            other => Err(Error::InvalidAccessPolicy(other.to_string())),
        }
    }
}

/// Admin and viewer group lists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acls {
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub viewers: Vec<String>,
}

impl Acls {
    pub fn is_empty(&self) -> bool {
        self.admins.is_empty() && self.viewers.is_empty()
    }

    /// Groups granting read access. Admins are implicitly viewers.
    pub fn readers(&self) -> Vec<String> {
        let mut groups = self.viewers.clone();
        for admin in &self.admins {
            if !groups.contains(admin) {
                groups.push(admin.clone());
            }
        }
        groups
    }

    /// Groups granting write access.
    pub fn writers(&self) -> Vec<String> {
        self.admins.clone()
    }
}

/// A subproject: a bucket-backed container of datasets inside a tenant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubprojectRecord {
    pub tenant: String,
    pub name: String,
    /// Creator of the subproject.
    #[serde(default)]
    pub admin: String,
    #[serde(default)]
    pub acls: Acls,
    /// Legal tag inherited by datasets registered without one.
    #[serde(default)]
    pub ltag: Option<String>,
    #[serde(default)]
    pub gcs_bucket: String,
    #[serde(default)]
    pub storage_class: Option<String>,
    #[serde(default)]
    pub storage_location: Option<String>,
    #[serde(default)]
    pub access_policy: AccessPolicy,
    #[serde(default)]
    pub enforce_key: bool,
}

impl SubprojectRecord {
    /// Group email for generated subproject admins.
    pub fn data_admin_group(tenant: &TenantRecord, subproject: &str, suffix: &str) -> String {
        format!(
            "{DATA_GROUP_PREFIX}.{}.{subproject}.{suffix}.admin@{}",
            tenant.name, tenant.esd
        )
    }

    /// Group email for generated subproject viewers.
    pub fn data_viewer_group(tenant: &TenantRecord, subproject: &str, suffix: &str) -> String {
        format!(
            "{DATA_GROUP_PREFIX}.{}.{subproject}.{suffix}.viewer@{}",
            tenant.name, tenant.esd
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantRecord {
        TenantRecord {
            name: "tenant-a".to_string(),
            esd: "opendes.contoso.com".to_string(),
            gcpid: "gcp-project".to_string(),
            default_acls: "users.datalake.admins@opendes.contoso.com".to_string(),
        }
    }

    #[test]
    fn test_resource_name_rules() {
        assert!(validate_resource_name("tenant-a").is_ok());
        assert!(validate_resource_name("a1").is_ok());
        assert!(validate_resource_name("").is_err());
        assert!(validate_resource_name("1abc").is_err());
        assert!(validate_resource_name("Tenant").is_err());
        assert!(validate_resource_name("a/b").is_err());
        assert!(validate_resource_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_tenant_data_partition() {
        let t = tenant();
        assert!(t.validate().is_ok());
        assert_eq!(t.data_partition(), "opendes");
    }

    #[test]
    fn test_access_policy_parse() {
        assert_eq!("uniform".parse::<AccessPolicy>().unwrap(), AccessPolicy::Uniform);
        assert_eq!("dataset".parse::<AccessPolicy>().unwrap(), AccessPolicy::Dataset);
        assert!("other".parse::<AccessPolicy>().is_err());
        assert_eq!(AccessPolicy::default(), AccessPolicy::Uniform);
    }

    #[test]
    fn test_acls_readers_include_admins() {
        let acls = Acls {
            admins: vec!["a".to_string(), "b".to_string()],
            viewers: vec!["b".to_string(), "c".to_string()],
        };
        assert_eq!(acls.readers(), vec!["b", "c", "a"]);
        assert_eq!(acls.writers(), vec!["a", "b"]);
    }

    #[test]
    fn test_generated_group_names() {
        let t = tenant();
        assert_eq!(
            SubprojectRecord::data_admin_group(&t, "sub", "x1"),
            "data.sdms.tenant-a.sub.x1.admin@opendes.contoso.com"
        );
        assert_eq!(
            SubprojectRecord::data_viewer_group(&t, "sub", "x1"),
            "data.sdms.tenant-a.sub.x1.viewer@opendes.contoso.com"
        );
    }

    #[test]
    fn test_subproject_deserialize_defaults() {
        let json = r#"{"tenant":"t","name":"s"}"#;
        let sp: SubprojectRecord = serde_json::from_str(json).unwrap();
        assert_eq!(sp.access_policy, AccessPolicy::Uniform);
        assert!(sp.acls.is_empty());
        assert!(!sp.enforce_key);
    }
}
