//! Inventory document model and its on-disk JSON encoding.
//!
//! The encoding is deterministic: every map is sorted, indentation is two
//! spaces and the text ends with a newline, so re-rendering an unchanged
//! document is byte-stable.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level key of the `_meta` section; never usable as a group name
pub const META_KEY: &str = "_meta";

/// Variables attached to a host or a group
pub type HostVars = Map<String, Value>;

/// A named set of hosts plus group-scoped variables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub hosts: BTreeSet<String>,
    pub vars: HostVars,
}

impl Group {
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.vars.is_empty()
    }
}

/// The reserved `_meta` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaSection {
    pub hostvars: BTreeMap<String, HostVars>,
}

/// Root of the backing file: groups by name plus `_meta`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryDocument {
    #[serde(rename = "_meta")]
    pub meta: MetaSection,
    #[serde(flatten)]
    pub groups: BTreeMap<String, Group>,
}

/// Why a backing file could not be decoded
#[derive(Debug)]
pub enum DecodeError {
    /// Empty, truncated or otherwise not JSON; recoverable
    Corrupt(serde_json::Error),
    /// Valid JSON of the wrong shape; never silently replaced
    Schema(serde_json::Error),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Corrupt(e) => write!(f, "unparseable JSON: {}", e),
            DecodeError::Schema(e) => write!(f, "unexpected structure: {}", e),
        }
    }
}

/// Decode backing file contents. Bytes that are not UTF-8 are corrupt.
pub fn decode(bytes: impl AsRef<[u8]>) -> Result<InventoryDocument, DecodeError> {
    serde_json::from_slice(bytes.as_ref()).map_err(|e| match e.classify() {
        serde_json::error::Category::Data => DecodeError::Schema(e),
        _ => DecodeError::Corrupt(e),
    })
}

/// Render a document in its canonical on-disk form
pub fn render(document: &InventoryDocument) -> serde_json::Result<String> {
    // Going through Value puts `_meta` in sorted position among the groups.
    let value = serde_json::to_value(document)?;
    let mut text = serde_json::to_string_pretty(&value)?;
    text.push('\n');
    Ok(text)
}
