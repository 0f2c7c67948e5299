//! Entity keys and entities.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind holding tenant records.
pub const TENANTS_KIND: &str = "tenants";

/// Kind holding subproject records.
pub const SUBPROJECTS_KIND: &str = "subprojects";

/// Kind holding dataset records.
pub const DATASETS_KIND: &str = "datasets";

/// Identity of a journal entity.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    pub namespace: String,
    pub kind: String,
    pub name: String,
}

impl Key {
    pub fn new(
        namespace: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({}/{}/{})", self.namespace, self.kind, self.name)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.kind, self.name)
    }
}

/// A key and its JSON payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub key: Key,
    pub data: Value,
}

impl Entity {
    pub fn new(key: Key, data: Value) -> Self {
        Self { key, data }
    }

    /// Build an entity from a serializable record.
    pub fn from_record<T: Serialize>(key: Key, record: &T) -> serde_json::Result<Self> {
        Ok(Self {
            key,
            data: serde_json::to_value(record)?,
        })
    }

    /// Decode the payload into a record.
    pub fn to_record<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.data)
    }
}
