//! Drydock core types: resource documents, identities, health codes and diff rows.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub mod doc;
pub mod health;
pub mod overrides;
pub mod settings;

pub use doc::ResourceKey;
pub use health::{is_worse, HealthStatus, HealthStatusCode, ResourceStatus};
pub use overrides::{
    override_key, KnownTypeField, OverrideIgnoreDiff, ResourceIgnoreDifferences, ResourceOverride,
};
pub use settings::{Settings, TrackingMethod};

pub type Uid = [u8; 16];

/// Shorthand for the document representation used across crates.
pub type Json = serde_json::Value;

/// A resource key plus its stable uid, when the cluster assigned one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub key: ResourceKey,
    pub uid: Option<Uid>,
}

impl ResourceIdentity {
    pub fn from_doc(doc: &Json) -> Self {
        Self { key: ResourceKey::from_doc(doc), uid: doc::uid(doc) }
    }

    /// Two identities name the same resource if their keys agree or both carry the same uid.
    pub fn same_resource(&self, other: &ResourceIdentity) -> bool {
        if self.key == other.key { return true; }
        matches!((self.uid, other.uid), (Some(a), Some(b)) if a == b)
    }
}

/// Outcome of comparing one live/target pair. Both byte fields hold canonical JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub normalized_live: Vec<u8>,
    pub predicted_live: Vec<u8>,
    pub modified: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResultList {
    pub diffs: Vec<DiffResult>,
    pub modified: bool,
}

impl DiffResultList {
    pub fn push(&mut self, res: DiffResult) {
        self.modified |= res.modified;
        self.diffs.push(res);
    }
}

/// A previously computed diff row as persisted by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDiff {
    #[serde(default)]
    pub group: String,
    pub kind: String,
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub target_state: String,
    #[serde(default)]
    pub live_state: String,
    #[serde(default)]
    pub normalized_live_state: String,
    #[serde(default)]
    pub predicted_live_state: String,
    #[serde(default)]
    pub resource_version: String,
    #[serde(default)]
    pub modified: bool,
    #[serde(default)]
    pub hook: bool,
}

impl ResourceDiff {
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.group, &self.kind, &self.namespace, &self.name)
    }

    /// Build a cacheable row from a fresh result. `live` supplies the resource version.
    pub fn from_result(key: &ResourceKey, live: Option<&Json>, target: Option<&Json>, res: &DiffResult) -> Self {
        let text = |v: Option<&Json>| v.map(|j| j.to_string()).unwrap_or_else(|| "null".to_string());
        Self {
            group: key.group.clone(),
            kind: key.kind.clone(),
            namespace: key.namespace.clone(),
            name: key.name.clone(),
            target_state: text(target),
            live_state: text(live),
            normalized_live_state: String::from_utf8_lossy(&res.normalized_live).into_owned(),
            predicted_live_state: String::from_utf8_lossy(&res.predicted_live).into_owned(),
            resource_version: live.map(doc::resource_version).unwrap_or_default().to_string(),
            modified: res.modified,
            hook: live.map(doc::is_hook).unwrap_or(false),
        }
    }

    /// Convert the row back into a result, as used when the cache is reused.
    pub fn to_result(&self) -> DiffResult {
        DiffResult {
            normalized_live: self.normalized_live_state.as_bytes().to_vec(),
            predicted_live: self.predicted_live_state.as_bytes().to_vec(),
            modified: self.modified,
        }
    }
}

pub mod prelude {
    pub use super::{
        DiffResult, DiffResultList, HealthStatus, HealthStatusCode, Json, ResourceDiff, ResourceIdentity,
        ResourceKey, Uid,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(uid: &str, name: &str) -> Json {
        json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": name, "namespace": "ns", "uid": uid}})
    }

    #[test]
    fn same_resource_by_key_or_uid() {
        let a = ResourceIdentity::from_doc(&obj("6f1c3b9e-0c1a-4a5e-9d55-1a2b3c4d5e6f", "a"));
        let b = ResourceIdentity::from_doc(&obj("6f1c3b9e-0c1a-4a5e-9d55-1a2b3c4d5e6f", "renamed"));
        let c = ResourceIdentity::from_doc(&obj("00000000-0000-4000-8000-000000000001", "a"));
        let d = ResourceIdentity::from_doc(&obj("00000000-0000-4000-8000-000000000002", "other"));
        assert!(a.same_resource(&b));
        assert!(a.same_resource(&c));
        assert!(!c.same_resource(&d));
    }

    #[test]
    fn list_modified_is_or() {
        let mut l = DiffResultList::default();
        l.push(DiffResult::default());
        assert!(!l.modified);
        l.push(DiffResult { modified: true, ..Default::default() });
        l.push(DiffResult::default());
        assert!(l.modified);
        assert_eq!(l.diffs.len(), 3);
    }

    #[test]
    fn row_from_result_carries_resource_version() {
        let mut live = obj("6f1c3b9e-0c1a-4a5e-9d55-1a2b3c4d5e6f", "a");
        live["metadata"]["resourceVersion"] = json!("42");
        let key = ResourceKey::from_doc(&live);
        let res = DiffResult { normalized_live: b"{}".to_vec(), predicted_live: b"{}".to_vec(), modified: false };
        let row = ResourceDiff::from_result(&key, Some(&live), None, &res);
        assert_eq!(row.resource_version, "42");
        assert_eq!(row.target_state, "null");
        assert_eq!(row.key(), key);
        assert_eq!(row.to_result(), res);
    }
}
