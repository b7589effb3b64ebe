//! Ignore rules and system-wide resource overrides.

use serde::{Deserialize, Deserializer, Serialize};

/// Per-application ignore rule; name and namespace narrow it to one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIgnoreDifferences {
    #[serde(default)]
    pub group: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub json_pointers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jq_path_expressions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub managed_fields_managers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideIgnoreDiff {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub json_pointers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jq_path_expressions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub managed_fields_managers: Vec<String>,
}

impl OverrideIgnoreDiff {
    pub fn is_empty(&self) -> bool {
        self.json_pointers.is_empty() && self.jq_path_expressions.is_empty() && self.managed_fields_managers.is_empty()
    }
}

impl From<&ResourceIgnoreDifferences> for OverrideIgnoreDiff {
    fn from(r: &ResourceIgnoreDifferences) -> Self {
        Self {
            json_pointers: r.json_pointers.clone(),
            jq_path_expressions: r.jq_path_expressions.clone(),
            managed_fields_managers: r.managed_fields_managers.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownTypeField {
    pub field: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// System-wide customization for one group/kind (or a glob such as `*/*`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOverride {
    #[serde(rename = "health.lua", default, skip_serializing_if = "String::is_empty")]
    pub health_lua: String,
    #[serde(rename = "health.lua.useOpenLibs", default)]
    pub use_open_libs: bool,
    #[serde(rename = "ignoreDifferences", default, deserialize_with = "ignore_diff_text_or_map")]
    pub ignore_differences: OverrideIgnoreDiff,
    #[serde(rename = "knownTypeFields", default, skip_serializing_if = "Vec::is_empty")]
    pub known_type_fields: Vec<KnownTypeField>,
}

/// `ignoreDifferences` may arrive as an embedded YAML string or as a plain map.
fn ignore_diff_text_or_map<'de, D: Deserializer<'de>>(d: D) -> Result<OverrideIgnoreDiff, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw { Text(String), Map(OverrideIgnoreDiff) }
    match Raw::deserialize(d)? {
        Raw::Map(m) => Ok(m),
        Raw::Text(s) => parse_ignore_diff(&s).map_err(serde::de::Error::custom),
    }
}

pub fn parse_ignore_diff(text: &str) -> Result<OverrideIgnoreDiff, serde_yaml::Error> {
    if text.trim().is_empty() { return Ok(OverrideIgnoreDiff::default()); }
    serde_yaml::from_str(text)
}

/// Key under which an override for `(group, kind)` is stored: bare kind for the core group.
pub fn override_key(group: &str, kind: &str) -> String {
    if group.is_empty() { kind.to_string() } else { format!("{group}/{kind}") }
}

/// Shell-style match (`*`, `?`, `[...]`); `*` also crosses `/`. A pattern that does not compile
/// only matches itself.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    match glob::Pattern::new(pattern) {
        Ok(p) => p.matches(text),
        Err(_) => pattern == text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_and_globs() {
        assert_eq!(override_key("", "Service"), "Service");
        assert_eq!(override_key("apps", "Deployment"), "apps/Deployment");
        assert!(glob_match("*/*", "apps/Deployment"));
        assert!(glob_match("*.io/*", "cert-manager.io/Certificate"));
        assert!(!glob_match("*/*", "Service"));
        assert!(glob_match("Serv?ce", "Service"));
        assert!(!glob_match("apps/*", "batch/Job"));
        assert!(glob_match("*", "networking.k8s.io/Ingress"));
        assert!(glob_match("[ab]pps/*", "apps/Deployment"));
        assert!(glob_match("[", "["));
        assert!(!glob_match("[", "apps"));
    }

    #[test]
    fn override_accepts_text_or_map() {
        let text: ResourceOverride = serde_yaml::from_str("ignoreDifferences: |\n  jsonPointers:\n  - /spec/replicas\n").unwrap();
        assert_eq!(text.ignore_differences.json_pointers, vec!["/spec/replicas"]);
        let map: ResourceOverride = serde_yaml::from_str(
            "ignoreDifferences:\n  jqPathExpressions: ['.spec']\nknownTypeFields:\n- field: spec.x\n  type: core/v1/Quantity\n",
        )
        .unwrap();
        assert_eq!(map.ignore_differences.jq_path_expressions, vec![".spec"]);
        assert_eq!(map.known_type_fields[0].type_name, "core/v1/Quantity");
    }
}
