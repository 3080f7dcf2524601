//! Canonical empty inventory, used to seed and self-heal the backing file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::document::{Group, HostVars, InventoryDocument};

/// Cache file format version stored under [`RESERVED_VERSION_KEY`]
pub const CACHE_VERSION: u64 = 1;

/// The distinguished, non-deletable local control host
pub const LOCALHOST: &str = "localhost";

/// Mandatory group every host belongs to
pub const ALL_GROUP: &str = "all";

/// Groups that always exist and are never pruned
pub const DEFAULT_GROUPS: [&str; 2] = [ALL_GROUP, "subjects"];

/// localhost hostvar pointing back at the backing file
pub const RESERVED_FILE_KEY: &str = "invcachefile";

/// localhost hostvar carrying [`CACHE_VERSION`]
pub const RESERVED_VERSION_KEY: &str = "invcachevers";

/// Hostvars owned by the cache. Matching is exact.
pub const RESERVED_KEYS: [&str; 2] = [RESERVED_FILE_KEY, RESERVED_VERSION_KEY];

pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

pub fn is_default_group(name: &str) -> bool {
    DEFAULT_GROUPS.contains(&name)
}

/// Produces fresh default documents bound to one backing file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    cache_file: PathBuf,
}

impl Template {
    pub fn new(cache_file: impl Into<PathBuf>) -> Self {
        Self {
            cache_file: cache_file.into(),
        }
    }

    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    /// The reserved localhost hostvars, with their authoritative values
    pub fn reserved_hostvars(&self) -> HostVars {
        let mut vars = HostVars::new();
        vars.insert(
            RESERVED_FILE_KEY.to_string(),
            Value::String(self.cache_file.to_string_lossy().into_owned()),
        );
        vars.insert(RESERVED_VERSION_KEY.to_string(), Value::from(CACHE_VERSION));
        vars
    }

    /// A new empty inventory
    pub fn document(&self) -> InventoryDocument {
        let mut document = InventoryDocument::default();
        for name in DEFAULT_GROUPS {
            document.groups.insert(name.to_string(), Group::default());
        }
        if let Some(all) = document.groups.get_mut(ALL_GROUP) {
            all.hosts = BTreeSet::from([LOCALHOST.to_string()]);
        }
        document
            .meta
            .hostvars
            .insert(LOCALHOST.to_string(), self.reserved_hostvars());
        document
    }
}
