//! Core domain types for the seismic DMS metadata service.
//!
//! This crate defines the data model shared by every other crate:
//! - Dataset identity, lock keys and dataset records
//! - Tenant and subproject records with their access policies
//! - Random identifiers (ctags, lock ids)
//! - Application configuration

pub mod config;
pub mod dataset;
pub mod error;
pub mod ids;
pub mod tenant;

pub use dataset::{DatasetId, DatasetRecord, DatasetView, SDPATH_PREFIX};
pub use error::{Error, Result};
pub use tenant::{AccessPolicy, Acls, SubprojectRecord, TenantRecord};

/// Journal namespace prefix shared by every record.
pub const STORE_NAMESPACE: &str = "seismic-store";

/// Journal namespace holding the datasets of one subproject.
pub fn dataset_namespace(tenant: &str, subproject: &str) -> String {
    format!("{STORE_NAMESPACE}-{tenant}-{subproject}")
}

/// Journal namespace holding the subprojects of one tenant.
pub fn subproject_namespace(tenant: &str) -> String {
    format!("{STORE_NAMESPACE}-{tenant}")
}
