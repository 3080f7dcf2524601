//! Cleaning caller-supplied hostvars.

use serde_json::Value;

use crate::document::HostVars;
use crate::{Result, StoreError};

/// Routing key inside supplied hostvars; names extra groups, never stored
pub const JOIN_GROUPS_KEY: &str = "join_groups";

/// Remove `join_groups` from `vars` and return the group names it held.
///
/// Accepts a list of names or a single name. Absent or `null` means none.
pub fn take_join_groups(vars: &mut HostVars) -> Result<Vec<String>> {
    match vars.remove(JOIN_GROUPS_KEY) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(name)) => Ok(vec![name]),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(name) => Ok(name),
                other => Err(StoreError::InvalidJoinGroups {
                    found: other.to_string(),
                }),
            })
            .collect(),
        Some(other) => Err(StoreError::InvalidJoinGroups {
            found: other.to_string(),
        }),
    }
}
