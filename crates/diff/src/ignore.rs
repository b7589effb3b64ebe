//! Which ignore-difference rule applies to a group/kind.

use std::collections::BTreeMap;

use drydock_core::overrides::glob_match;
use drydock_core::{override_key, OverrideIgnoreDiff, ResourceIgnoreDifferences, ResourceOverride};

pub struct IgnoreDiffConfig<'a> {
    ignores: &'a [ResourceIgnoreDifferences],
    overrides: &'a BTreeMap<String, ResourceOverride>,
}

impl<'a> IgnoreDiffConfig<'a> {
    pub fn new(ignores: &'a [ResourceIgnoreDifferences], overrides: &'a BTreeMap<String, ResourceOverride>) -> Self {
        Self { ignores, overrides }
    }

    /// System override for the exact key wins; otherwise the first application rule with the
    /// same group and kind. Name and namespace do not narrow this lookup.
    pub fn has_ignore_difference(&self, group: &str, kind: &str) -> Option<OverrideIgnoreDiff> {
        if let Some(o) = self.overrides.get(&override_key(group, kind)) {
            return Some(o.ignore_differences.clone());
        }
        self.ignores.iter().find(|r| r.group == group && r.kind == kind).map(OverrideIgnoreDiff::from)
    }

    /// Instance-scoped lookup: rule group/kind may be globs, and a set name or namespace must match.
    pub fn has_ignore_difference_for(&self, group: &str, kind: &str, name: &str, namespace: &str) -> Option<OverrideIgnoreDiff> {
        if let Some(o) = self.overrides.get(&override_key(group, kind)) {
            return Some(o.ignore_differences.clone());
        }
        self.ignores
            .iter()
            .find(|r| {
                glob_match(&r.group, group)
                    && glob_match(&r.kind, kind)
                    && (r.name.is_empty() || r.name == name)
                    && (r.namespace.is_empty() || r.namespace == namespace)
            })
            .map(OverrideIgnoreDiff::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(group: &str, kind: &str, pointer: &str) -> ResourceIgnoreDifferences {
        ResourceIgnoreDifferences {
            group: group.into(),
            kind: kind.into(),
            json_pointers: vec![pointer.into()],
            ..Default::default()
        }
    }

    fn overrides(key: &str, pointer: &str) -> BTreeMap<String, ResourceOverride> {
        let mut o = ResourceOverride::default();
        o.ignore_differences.json_pointers.push(pointer.into());
        BTreeMap::from([(key.to_string(), o)])
    }

    #[test]
    fn override_wins_over_application_rule() {
        let ignores = vec![rule("apps", "Deployment", "/spec/replicas")];
        let ovr = overrides("apps/Deployment", "/spec/template");
        let idc = IgnoreDiffConfig::new(&ignores, &ovr);
        let got = idc.has_ignore_difference("apps", "Deployment").unwrap();
        assert_eq!(got.json_pointers, vec!["/spec/template"]);
    }

    #[test]
    fn first_matching_rule() {
        let ignores = vec![
            rule("apps", "StatefulSet", "/a"),
            ResourceIgnoreDifferences { name: "web".into(), ..rule("apps", "Deployment", "/b") },
            rule("apps", "Deployment", "/c"),
        ];
        let ovr = BTreeMap::new();
        let idc = IgnoreDiffConfig::new(&ignores, &ovr);
        assert_eq!(idc.has_ignore_difference("apps", "Deployment").unwrap().json_pointers, vec!["/b"]);
        assert_eq!(idc.has_ignore_difference_for("apps", "Deployment", "api", "").unwrap().json_pointers, vec!["/c"]);
        assert!(idc.has_ignore_difference("", "Service").is_none());
    }

    #[test]
    fn core_group_uses_bare_kind() {
        let ovr = overrides("Service", "/spec/clusterIP");
        let idc = IgnoreDiffConfig::new(&[], &ovr);
        assert!(idc.has_ignore_difference("", "Service").is_some());
        assert!(idc.has_ignore_difference("x.io", "Service").is_none());
    }

    #[test]
    fn instance_scope_globs() {
        let ignores = vec![ResourceIgnoreDifferences { namespace: "prod".into(), ..rule("*", "*", "/x") }];
        let ovr = BTreeMap::new();
        let idc = IgnoreDiffConfig::new(&ignores, &ovr);
        assert!(idc.has_ignore_difference_for("apps", "Deployment", "web", "prod").is_some());
        assert!(idc.has_ignore_difference_for("apps", "Deployment", "web", "dev").is_none());
        assert!(idc.has_ignore_difference("apps", "Deployment").is_none());
    }
}
