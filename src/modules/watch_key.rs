// src/modules/watch_key.rs
use crate::error::{Result, WatchError};
use crate::modules::key_codec::{ENTRY_SEPARATOR, FIELD_SEPARATOR};
use std::fmt;

pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";

/// Identity of one watched configuration entry.
///
/// Two keys are equal when data id, group and tenant all match. The tenant
/// (namespace) may be empty; data id and group may not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchKey {
    data_id: String,
    group: String,
    tenant: String,
}

impl WatchKey {
    /// Builds a validated key. An empty `group` falls back to `DEFAULT_GROUP`.
    pub fn new(data_id: &str, group: &str, tenant: &str) -> Result<Self> {
        let group = if group.is_empty() { DEFAULT_GROUP } else { group };
        if data_id.is_empty() {
            return Err(WatchError::InvalidKey("data id must not be empty".to_string()));
        }
        for (name, value) in [("data id", data_id), ("group", group), ("tenant", tenant)] {
            if value.contains(FIELD_SEPARATOR) || value.contains(ENTRY_SEPARATOR) {
                return Err(WatchError::InvalidKey(format!(
                    "{} {:?} contains a reserved separator character",
                    name, value
                )));
            }
        }
        Ok(Self {
            data_id: data_id.to_string(),
            group: group.to_string(),
            tenant: tenant.to_string(),
        })
    }

    /// Key in `DEFAULT_GROUP` with no tenant.
    pub fn with_default_group(data_id: &str) -> Result<Self> {
        Self::new(data_id, DEFAULT_GROUP, "")
    }

    pub fn data_id(&self) -> &str {
        &self.data_id
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }
}

impl fmt::Display for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tenant.is_empty() {
            write!(f, "{}+{}", self.data_id, self.group)
        } else {
            write!(f, "{}+{}+{}", self.data_id, self.group, self.tenant)
        }
    }
}
