//! Environment knobs and ConfigMap-style resource customizations.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::overrides::{parse_ignore_diff, KnownTypeField, ResourceOverride};

pub const DEFAULT_APP_LABEL_KEY: &str = "app.kubernetes.io/instance";
pub const KEY_RESOURCE_CUSTOMIZATIONS: &str = "resource.customizations";
pub const KEY_COMPARE_OPTIONS: &str = "resource.compareoptions";
const CRD_GROUP_KIND: &str = "apiextensions.k8s.io/CustomResourceDefinition";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingMethod {
    Label,
    #[default]
    Annotation,
    AnnotationAndLabel,
}

impl TrackingMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::Annotation => "annotation",
            Self::AnnotationAndLabel => "annotation+label",
        }
    }
}

impl std::fmt::Display for TrackingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl std::str::FromStr for TrackingMethod {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "label" => Ok(Self::Label),
            "annotation" => Ok(Self::Annotation),
            "annotation+label" => Ok(Self::AnnotationAndLabel),
            other => Err(anyhow!("unknown tracking method {other:?}")),
        }
    }
}

/// Which `/status` subtrees are ignored when diffing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgnoreStatusField {
    #[default]
    Crd,
    All,
    Off,
}

impl IgnoreStatusField {
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "" | "crd" => Self::Crd,
            "all" => Self::All,
            "off" | "none" | "false" => Self::Off,
            other => {
                warn!(value = %other, "unrecognized ignoreResourceStatusField; ignoring status for CustomResourceDefinitions");
                Self::Crd
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub app_label_key: String,
    pub tracking_method: TrackingMethod,
    pub controller_namespace: String,
    pub ignore_aggregated_roles: bool,
    pub ignore_resource_status_field: IgnoreStatusField,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_label_key: DEFAULT_APP_LABEL_KEY.to_string(),
            tracking_method: TrackingMethod::default(),
            controller_namespace: "drydock".to_string(),
            ignore_aggregated_roles: false,
            ignore_resource_status_field: IgnoreStatusField::default(),
        }
    }
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|s| matches!(s.as_str(), "1" | "true" | "yes" | "on"))
}

impl Settings {
    pub fn from_env() -> Self {
        let mut s = Self::default();
        if let Ok(v) = std::env::var("DRYDOCK_APP_LABEL_KEY") {
            if !v.is_empty() { s.app_label_key = v; }
        }
        if let Ok(v) = std::env::var("DRYDOCK_TRACKING_METHOD") {
            match v.parse::<TrackingMethod>() {
                Ok(m) => s.tracking_method = m,
                Err(e) => warn!(error = %e, "DRYDOCK_TRACKING_METHOD ignored"),
            }
        }
        if let Ok(v) = std::env::var("DRYDOCK_CONTROLLER_NAMESPACE") {
            if !v.is_empty() { s.controller_namespace = v; }
        }
        if let Some(b) = env_bool("DRYDOCK_IGNORE_AGGREGATED_ROLES") { s.ignore_aggregated_roles = b; }
        if let Ok(v) = std::env::var("DRYDOCK_IGNORE_RESOURCE_STATUS_FIELD") {
            s.ignore_resource_status_field = IgnoreStatusField::parse_lenient(&v);
        }
        s
    }

    /// Merge `resource.compareoptions` from a settings map, when present.
    pub fn with_compare_options(mut self, data: &BTreeMap<String, String>) -> Result<Self> {
        #[derive(Deserialize, Default)]
        #[serde(rename_all = "camelCase")]
        struct CompareOptions {
            ignore_aggregated_roles: Option<bool>,
            ignore_resource_status_field: Option<String>,
        }
        let Some(raw) = data.get(KEY_COMPARE_OPTIONS) else { return Ok(self) };
        let opts: CompareOptions = if raw.trim().is_empty() {
            CompareOptions::default()
        } else {
            serde_yaml::from_str(raw).with_context(|| format!("parse {KEY_COMPARE_OPTIONS}"))?
        };
        if let Some(b) = opts.ignore_aggregated_roles { self.ignore_aggregated_roles = b; }
        if let Some(s) = opts.ignore_resource_status_field {
            self.ignore_resource_status_field = IgnoreStatusField::parse_lenient(&s);
        }
        Ok(self)
    }
}

/// `<group>_<Kind>` becomes `group/Kind`; a bare kind stays as is; `all` becomes `*/*`.
fn split_key_to_override_key(group_kind: &str) -> Result<String> {
    if group_kind == "all" { return Ok("*/*".to_string()); }
    let parts: Vec<&str> = group_kind.split('_').collect();
    match parts.as_slice() {
        [g, k] => Ok(format!("{g}/{k}")),
        [k] if !k.is_empty() => Ok((*k).to_string()),
        _ => Err(anyhow!(
            "group kind should be in format resource.customizations.<type>.<group_kind> or resource.customizations.<type>.<kind>, got {group_kind:?}"
        )),
    }
}

fn add_ignore_pointer(overrides: &mut BTreeMap<String, ResourceOverride>, key: &str, pointer: &str) {
    overrides.entry(key.to_string()).or_default().ignore_differences.json_pointers.push(pointer.to_string());
}

/// Build the override map from a settings map: the embedded `resource.customizations` blob,
/// then split `resource.customizations.<type>.<group_kind>` keys, then the status-field policy.
pub fn resource_overrides_from_config(
    data: &BTreeMap<String, String>,
    status_policy: IgnoreStatusField,
) -> Result<BTreeMap<String, ResourceOverride>> {
    let mut overrides: BTreeMap<String, ResourceOverride> = BTreeMap::new();
    if let Some(blob) = data.get(KEY_RESOURCE_CUSTOMIZATIONS) {
        if !blob.trim().is_empty() {
            overrides = serde_yaml::from_str(blob).with_context(|| format!("parse {KEY_RESOURCE_CUSTOMIZATIONS}"))?;
        }
    }

    let prefix = format!("{KEY_RESOURCE_CUSTOMIZATIONS}.");
    for (k, v) in data.iter().filter(|(k, _)| k.starts_with(&prefix)) {
        let parts: Vec<&str> = k.splitn(4, '.').collect();
        if parts.len() < 4 { continue; }
        let key = split_key_to_override_key(parts[3])?;
        let entry = overrides.entry(key).or_default();
        match parts[2] {
            "health" => entry.health_lua = v.clone(),
            "useOpenLibs" => {
                entry.use_open_libs = v.trim().parse::<bool>().with_context(|| format!("parse {k}"))?;
            }
            "ignoreDifferences" => {
                entry.ignore_differences = parse_ignore_diff(v).with_context(|| format!("parse {k}"))?;
            }
            "knownTypeFields" => {
                let fields: Vec<KnownTypeField> = serde_yaml::from_str(v).with_context(|| format!("parse {k}"))?;
                entry.known_type_fields = fields;
            }
            other => return Err(anyhow!("resource customization type {other} not supported")),
        }
    }

    match status_policy {
        IgnoreStatusField::Crd => {
            add_ignore_pointer(&mut overrides, CRD_GROUP_KIND, "/status");
            add_ignore_pointer(&mut overrides, CRD_GROUP_KIND, "/spec/preserveUnknownFields");
        }
        IgnoreStatusField::All => {
            add_ignore_pointer(&mut overrides, "*/*", "/status");
            info!("ignoring status for all objects");
        }
        IgnoreStatusField::Off => {}
    }
    Ok(overrides)
}
