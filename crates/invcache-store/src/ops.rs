//! Host add/update/delete/query rules, applied to an in-memory document.
//!
//! These never touch the disk; [`crate::InvCache`] runs each of them inside a
//! lock scope and persists the result.

use std::collections::BTreeSet;

use crate::document::{HostVars, InventoryDocument, META_KEY};
use crate::hostvars::take_join_groups;
use crate::template::{
    is_default_group, is_reserved, Template, ALL_GROUP, DEFAULT_GROUPS, LOCALHOST,
};
use crate::{Result, StoreError};

/// A host's variables and the groups it belongs to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostEntry {
    pub hostvars: HostVars,
    pub groups: BTreeSet<String>,
}

impl HostEntry {
    fn found(self) -> Option<Self> {
        (!self.hostvars.is_empty() || !self.groups.is_empty()).then_some(self)
    }
}

impl InventoryDocument {
    /// Look up a host. `None` when it has neither hostvars nor groups.
    pub fn get_host(&self, hostname: &str) -> Option<HostEntry> {
        let groups = self
            .groups
            .iter()
            .filter(|(_, group)| group.hosts.contains(hostname))
            .map(|(name, _)| name.clone())
            .collect();
        let hostvars = self
            .meta
            .hostvars
            .get(hostname)
            .cloned()
            .unwrap_or_default();

        HostEntry { hostvars, groups }.found()
    }

    /// Replace everything known about `hostname`.
    ///
    /// `groups` of `None` (or empty) means the default groups; `localhost`
    /// defaults to `all` only. A `join_groups` entry in `hostvars` adds groups
    /// and is dropped. `all` is always joined. localhost's reserved keys are
    /// applied last and cannot be overridden. A group named `_meta` is
    /// rejected before anything changes.
    pub fn add_host(
        &mut self,
        template: &Template,
        hostname: &str,
        mut hostvars: HostVars,
        groups: Option<Vec<String>>,
    ) -> Result<HostEntry> {
        let joined = take_join_groups(&mut hostvars)?;

        let mut targets: BTreeSet<String> = match groups.filter(|g| !g.is_empty()) {
            Some(groups) => groups.into_iter().collect(),
            None if hostname == LOCALHOST => BTreeSet::from([ALL_GROUP.to_string()]),
            None => DEFAULT_GROUPS.iter().map(|g| g.to_string()).collect(),
        };
        targets.extend(joined);
        targets.insert(ALL_GROUP.to_string());
        if targets.contains(META_KEY) {
            return Err(StoreError::ReservedGroupName {
                name: META_KEY.to_string(),
            });
        }

        self.delete_host(hostname);

        if hostname == LOCALHOST {
            hostvars.extend(template.reserved_hostvars());
        }

        self.meta
            .hostvars
            .insert(hostname.to_string(), hostvars.clone());
        for name in &targets {
            self.groups
                .entry(name.clone())
                .or_default()
                .hosts
                .insert(hostname.to_string());
        }

        Ok(HostEntry {
            hostvars,
            groups: targets,
        })
    }

    /// Merge into an existing host, or add it.
    ///
    /// Supplied hostvars win over stored ones; supplied groups are joined in
    /// addition to the current ones, never instead of them.
    pub fn update_host(
        &mut self,
        template: &Template,
        hostname: &str,
        hostvars: HostVars,
        groups: Option<Vec<String>>,
    ) -> Result<HostEntry> {
        match self.get_host(hostname) {
            Some(existing) => {
                let mut merged = existing.hostvars;
                merged.extend(hostvars);
                let mut joined: Vec<String> = existing.groups.into_iter().collect();
                joined.extend(groups.unwrap_or_default());
                self.add_host(template, hostname, merged, Some(joined))
            }
            None => self.add_host(template, hostname, hostvars, groups),
        }
    }

    /// Remove a host and prune groups left empty.
    ///
    /// localhost is only stripped: its non-reserved hostvars and its
    /// memberships other than `all` go away. Returns what was removed.
    pub fn delete_host(&mut self, hostname: &str) -> Option<HostEntry> {
        let mut removed = HostEntry::default();

        if hostname == LOCALHOST {
            if let Some(vars) = self.meta.hostvars.get_mut(LOCALHOST) {
                let user_keys: Vec<String> =
                    vars.keys().filter(|k| !is_reserved(k)).cloned().collect();
                for key in user_keys {
                    if let Some(value) = vars.remove(&key) {
                        removed.hostvars.insert(key, value);
                    }
                }
            }
        } else if let Some(vars) = self.meta.hostvars.remove(hostname) {
            removed.hostvars = vars;
        }

        for (name, group) in self.groups.iter_mut() {
            if hostname == LOCALHOST && name == ALL_GROUP {
                continue;
            }
            if group.hosts.remove(hostname) {
                removed.groups.insert(name.clone());
            }
        }

        self.prune_groups();
        removed.found()
    }

    /// Drop non-default groups with no hosts and no vars
    pub fn prune_groups(&mut self) {
        self.groups
            .retain(|name, group| is_default_group(name) || !group.is_empty());
    }

    /// Distinct hosts other than localhost, across groups and hostvars
    pub fn host_count(&self) -> usize {
        let mut hosts: BTreeSet<&str> = self
            .groups
            .values()
            .flat_map(|group| group.hosts.iter().map(String::as_str))
            .collect();
        hosts.extend(self.meta.hostvars.keys().map(String::as_str));
        hosts.remove(LOCALHOST);
        hosts.len()
    }

    /// Restore structural invariants before a write: default groups exist,
    /// `all` holds localhost, localhost carries the reserved keys.
    pub fn enforce_invariants(&mut self, template: &Template) {
        for name in DEFAULT_GROUPS {
            self.groups.entry(name.to_string()).or_default();
        }
        if let Some(all) = self.groups.get_mut(ALL_GROUP) {
            all.hosts.insert(LOCALHOST.to_string());
        }
        self.meta
            .hostvars
            .entry(LOCALHOST.to_string())
            .or_default()
            .extend(template.reserved_hostvars());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::RESERVED_FILE_KEY;
    use serde_json::{json, Value};

    fn vars(value: Value) -> HostVars {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn groups(names: &[&str]) -> Option<Vec<String>> {
        Some(names.iter().map(|n| n.to_string()).collect())
    }

    fn fresh() -> (Template, InventoryDocument) {
        let template = Template::new("/tmp/test_invcache.json");
        let doc = template.document();
        (template, doc)
    }

    #[test]
    fn test_get_missing_host() {
        let (_, doc) = fresh();
        assert!(doc.get_host("anyhost").is_none());
    }

    #[test]
    fn test_get_localhost_from_template() {
        let (_, doc) = fresh();
        let entry = doc.get_host(LOCALHOST).unwrap();
        assert_eq!(entry.groups, set(&["all"]));
        assert!(entry.hostvars.contains_key(RESERVED_FILE_KEY));
    }

    #[test]
    fn test_add_default_groups() {
        let (template, mut doc) = fresh();
        let entry = doc
            .add_host(&template, "web1", vars(json!({"role": "web"})), None)
            .unwrap();
        assert_eq!(entry.groups, set(&["all", "subjects"]));
        assert_eq!(doc.get_host("web1").unwrap(), entry);
    }

    #[test]
    fn test_add_explicit_groups_forces_all() {
        let (template, mut doc) = fresh();
        doc.add_host(&template, "web1", HostVars::new(), groups(&["webservers"]))
            .unwrap();
        let entry = doc.get_host("web1").unwrap();
        assert_eq!(entry.groups, set(&["all", "webservers"]));
        assert!(entry.hostvars.is_empty());
    }

    #[test]
    fn test_add_empty_groups_means_default() {
        let (template, mut doc) = fresh();
        doc.add_host(&template, "web1", HostVars::new(), Some(Vec::new()))
            .unwrap();
        assert_eq!(doc.get_host("web1").unwrap().groups, set(&["all", "subjects"]));
    }

    #[test]
    fn test_add_join_groups_merged_not_stored() {
        let (template, mut doc) = fresh();
        doc.add_host(
            &template,
            "web1",
            vars(json!({"role": "web", "join_groups": ["webservers", "all"]})),
            None,
        )
        .unwrap();

        let entry = doc.get_host("web1").unwrap();
        assert_eq!(entry.groups, set(&["all", "subjects", "webservers"]));
        assert_eq!(Value::Object(entry.hostvars), json!({"role": "web"}));
    }

    #[test]
    fn test_add_bad_join_groups_leaves_document_untouched() {
        let (template, mut doc) = fresh();
        doc.add_host(&template, "web1", vars(json!({"a": 1})), None)
            .unwrap();
        let before = doc.clone();

        let err = doc
            .add_host(&template, "web1", vars(json!({"join_groups": 5})), None)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidJoinGroups { .. }));
        assert_eq!(doc, before);
    }

    #[test]
    fn test_meta_group_rejected_before_mutation() {
        let (template, mut doc) = fresh();
        doc.add_host(&template, "web1", vars(json!({"a": 1})), None)
            .unwrap();
        let before = doc.clone();

        let err = doc
            .add_host(&template, "web1", vars(json!({"join_groups": ["_meta"]})), None)
            .unwrap_err();
        assert!(matches!(err, StoreError::ReservedGroupName { .. }));
        assert_eq!(doc, before);

        let err = doc
            .update_host(&template, "web1", HostVars::new(), groups(&["_meta"]))
            .unwrap_err();
        assert!(matches!(err, StoreError::ReservedGroupName { .. }));
        assert_eq!(doc, before);
    }

    #[test]
    fn test_add_overwrites() {
        let (template, mut doc) = fresh();
        doc.add_host(&template, "web1", vars(json!({"a": 1})), groups(&["x"]))
            .unwrap();
        doc.add_host(&template, "web1", vars(json!({"b": 2})), groups(&["y"]))
            .unwrap();

        let entry = doc.get_host("web1").unwrap();
        assert_eq!(Value::Object(entry.hostvars), json!({"b": 2}));
        assert_eq!(entry.groups, set(&["all", "y"]));
        // x lost its only member
        assert!(!doc.groups.contains_key("x"));
    }

    #[test]
    fn test_add_localhost_keeps_reserved_values() {
        let (template, mut doc) = fresh();
        doc.add_host(
            &template,
            LOCALHOST,
            vars(json!({"invcachefile": "tampered", "invcachevers": 99, "foo": "bar"})),
            None,
        )
        .unwrap();

        let entry = doc.get_host(LOCALHOST).unwrap();
        assert_eq!(
            Value::Object(entry.hostvars),
            json!({"invcachefile": "/tmp/test_invcache.json", "invcachevers": 1, "foo": "bar"})
        );
        assert_eq!(entry.groups, set(&["all"]));
    }

    #[test]
    fn test_add_localhost_lookalike_keys_are_user_data() {
        let (template, mut doc) = fresh();
        doc.add_host(
            &template,
            LOCALHOST,
            vars(json!({"invcachefile_backup": "kept"})),
            None,
        )
        .unwrap();
        let removed = doc.delete_host(LOCALHOST).unwrap();
        assert_eq!(
            Value::Object(removed.hostvars),
            json!({"invcachefile_backup": "kept"})
        );
    }

    #[test]
    fn test_update_merges_vars_and_groups() {
        let (template, mut doc) = fresh();
        doc.add_host(
            &template,
            "web1",
            vars(json!({"role": "web", "port": 80})),
            groups(&["webservers"]),
        )
        .unwrap();

        doc.update_host(&template, "web1", vars(json!({"role": "lb"})), groups(&["edge"]))
            .unwrap();

        let entry = doc.get_host("web1").unwrap();
        assert_eq!(Value::Object(entry.hostvars), json!({"role": "lb", "port": 80}));
        assert_eq!(entry.groups, set(&["all", "edge", "webservers"]));
    }

    #[test]
    fn test_update_without_groups_keeps_membership() {
        let (template, mut doc) = fresh();
        doc.add_host(&template, "web1", HostVars::new(), groups(&["webservers"]))
            .unwrap();
        doc.update_host(&template, "web1", vars(json!({"x": 1})), None)
            .unwrap();
        assert_eq!(doc.get_host("web1").unwrap().groups, set(&["all", "webservers"]));
    }

    #[test]
    fn test_update_missing_host_adds() {
        let (template, mut doc) = fresh();
        let entry = doc
            .update_host(&template, "db1", vars(json!({"x": 1})), None)
            .unwrap();
        assert_eq!(entry.groups, set(&["all", "subjects"]));
        assert_eq!(doc.get_host("db1").unwrap(), entry);
    }

    #[test]
    fn test_update_join_groups() {
        let (template, mut doc) = fresh();
        doc.add_host(&template, "web1", HostVars::new(), None).unwrap();
        doc.update_host(
            &template,
            "web1",
            vars(json!({"join_groups": ["db"]})),
            None,
        )
        .unwrap();
        let entry = doc.get_host("web1").unwrap();
        assert_eq!(entry.groups, set(&["all", "db", "subjects"]));
        assert!(entry.hostvars.is_empty());
    }

    #[test]
    fn test_delete_returns_previous_and_prunes() {
        let (template, mut doc) = fresh();
        doc.add_host(&template, "web1", vars(json!({"role": "web"})), groups(&["webservers"]))
            .unwrap();

        let removed = doc.delete_host("web1").unwrap();
        assert_eq!(Value::Object(removed.hostvars), json!({"role": "web"}));
        assert_eq!(removed.groups, set(&["all", "webservers"]));

        assert!(doc.get_host("web1").is_none());
        assert!(!doc.groups.contains_key("webservers"));
        assert!(doc.groups.contains_key("all"));
        assert!(doc.groups.contains_key("subjects"));
    }

    #[test]
    fn test_delete_keeps_group_with_vars() {
        let (template, mut doc) = fresh();
        doc.add_host(&template, "web1", HostVars::new(), groups(&["webservers"]))
            .unwrap();
        if let Some(group) = doc.groups.get_mut("webservers") {
            group.vars.insert("http_port".into(), json!(8080));
        }

        doc.delete_host("web1");
        assert!(doc.groups["webservers"].hosts.is_empty());
    }

    #[test]
    fn test_delete_keeps_group_with_other_members() {
        let (template, mut doc) = fresh();
        doc.add_host(&template, "web1", HostVars::new(), groups(&["webservers"]))
            .unwrap();
        doc.add_host(&template, "web2", HostVars::new(), groups(&["webservers"]))
            .unwrap();

        doc.delete_host("web1");
        assert_eq!(doc.groups["webservers"].hosts, set(&["web2"]));
    }

    #[test]
    fn test_delete_missing_host() {
        let (_, mut doc) = fresh();
        let before = doc.clone();
        assert!(doc.delete_host("ghost").is_none());
        assert_eq!(doc, before);
    }

    #[test]
    fn test_delete_localhost_strips_only() {
        let (template, mut doc) = fresh();
        doc.add_host(
            &template,
            LOCALHOST,
            vars(json!({"foo": "bar"})),
            groups(&["control"]),
        )
        .unwrap();

        let removed = doc.delete_host(LOCALHOST).unwrap();
        assert_eq!(Value::Object(removed.hostvars), json!({"foo": "bar"}));
        assert_eq!(removed.groups, set(&["control"]));

        let entry = doc.get_host(LOCALHOST).unwrap();
        assert_eq!(entry.groups, set(&["all"]));
        assert_eq!(
            entry.hostvars.keys().collect::<Vec<_>>(),
            vec!["invcachefile", "invcachevers"]
        );
        assert!(!doc.groups.contains_key("control"));
    }

    #[test]
    fn test_delete_fresh_localhost_is_not_found() {
        let (_, mut doc) = fresh();
        assert!(doc.delete_host(LOCALHOST).is_none());
        assert!(doc.groups["all"].hosts.contains(LOCALHOST));
    }

    #[test]
    fn test_host_count_ignores_localhost() {
        let (template, mut doc) = fresh();
        assert_eq!(doc.host_count(), 0);
        doc.add_host(&template, "a", HostVars::new(), groups(&["g1", "g2"]))
            .unwrap();
        doc.add_host(&template, "b", HostVars::new(), None).unwrap();
        assert_eq!(doc.host_count(), 2);
        doc.delete_host("a");
        assert_eq!(doc.host_count(), 1);
    }

    #[test]
    fn test_enforce_invariants_repairs_structure() {
        let (template, _) = fresh();
        let mut doc = InventoryDocument::default();
        doc.enforce_invariants(&template);
        assert_eq!(doc, template.document());
    }
}
