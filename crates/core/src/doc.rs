//! Accessors over Kubernetes-style JSON documents.

use kube::core::GroupVersionKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::Uid;

pub const ANNOTATION_HOOK: &str = "drydock.dev/hook";
pub const ANNOTATION_HELM_HOOK: &str = "helm.sh/hook";
pub const ANNOTATION_IGNORE_HEALTHCHECK: &str = "drydock.dev/ignore-healthcheck";
pub const ANNOTATION_LAST_APPLIED: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Group/kind/namespace/name tuple used to index diff rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(group: &str, kind: &str, namespace: &str, name: &str) -> Self {
        Self { group: group.into(), kind: kind.into(), namespace: namespace.into(), name: name.into() }
    }

    pub fn from_doc(doc: &Json) -> Self {
        Self::new(group(doc), kind(doc), namespace(doc), name(doc))
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}/{}", self.group, self.kind, self.namespace, self.name)
    }
}

fn str_at<'a>(v: &'a Json, key: &str) -> &'a str {
    v.get(key).and_then(|x| x.as_str()).unwrap_or("")
}

fn meta_str<'a>(doc: &'a Json, key: &str) -> &'a str {
    doc.get("metadata").map(|m| str_at(m, key)).unwrap_or("")
}

pub fn api_version(doc: &Json) -> &str { str_at(doc, "apiVersion") }
pub fn kind(doc: &Json) -> &str { str_at(doc, "kind") }
pub fn name(doc: &Json) -> &str { meta_str(doc, "name") }
pub fn namespace(doc: &Json) -> &str { meta_str(doc, "namespace") }
pub fn resource_version(doc: &Json) -> &str { meta_str(doc, "resourceVersion") }

/// Split an apiVersion into `(group, version)`; the core group is `""`.
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((g, v)) => (g, v),
        None => ("", api_version),
    }
}

pub fn group(doc: &Json) -> &str { split_api_version(api_version(doc)).0 }

pub fn gvk(doc: &Json) -> GroupVersionKind {
    let (g, v) = split_api_version(api_version(doc));
    GroupVersionKind::gvk(g, v, kind(doc))
}

pub fn deletion_timestamp(doc: &Json) -> Option<&str> {
    doc.get("metadata").and_then(|m| m.get("deletionTimestamp")).and_then(|v| v.as_str())
}

pub fn uid(doc: &Json) -> Option<Uid> {
    let s = meta_str(doc, "uid");
    uuid::Uuid::parse_str(s).ok().map(|u| *u.as_bytes())
}

pub fn label<'a>(doc: &'a Json, key: &str) -> Option<&'a str> {
    doc.get("metadata")?.get("labels")?.get(key)?.as_str()
}

pub fn annotation<'a>(doc: &'a Json, key: &str) -> Option<&'a str> {
    doc.get("metadata")?.get("annotations")?.get(key)?.as_str()
}

/// Mutable access to `metadata.<section>`, creating it when missing. `None` if `doc` is not an object.
fn section_mut<'a>(doc: &'a mut Json, section: &str) -> Option<&'a mut Map<String, Json>> {
    let meta = doc.as_object_mut()?.entry("metadata").or_insert_with(|| Json::Object(Map::new()));
    if !meta.is_object() { *meta = Json::Object(Map::new()); }
    let sec = meta.as_object_mut()?.entry(section).or_insert_with(|| Json::Object(Map::new()));
    if !sec.is_object() { *sec = Json::Object(Map::new()); }
    sec.as_object_mut()
}

pub fn set_label(doc: &mut Json, key: &str, value: &str) -> bool {
    section_mut(doc, "labels").map(|m| { m.insert(key.into(), Json::String(value.into())); }).is_some()
}

pub fn set_annotation(doc: &mut Json, key: &str, value: &str) -> bool {
    section_mut(doc, "annotations").map(|m| { m.insert(key.into(), Json::String(value.into())); }).is_some()
}

fn remove_from(doc: &mut Json, section: &str, key: &str) {
    let Some(sec) = doc.get_mut("metadata").and_then(|m| m.get_mut(section)).and_then(|s| s.as_object_mut()) else {
        return;
    };
    sec.remove(key);
    if sec.is_empty() {
        if let Some(meta) = doc.get_mut("metadata").and_then(|m| m.as_object_mut()) {
            meta.remove(section);
        }
    }
}

pub fn remove_label(doc: &mut Json, key: &str) { remove_from(doc, "labels", key) }

/// Hook types declared on a resource, drydock annotation first, then helm.
pub fn hook_types(doc: &Json) -> Option<Vec<String>> {
    let raw = annotation(doc, ANNOTATION_HOOK).or_else(|| annotation(doc, ANNOTATION_HELM_HOOK))?;
    Some(raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
}

/// A hook carries at least one declared hook type.
pub fn is_hook(doc: &Json) -> bool {
    hook_types(doc).map(|t| !t.is_empty()).unwrap_or(false)
}

/// Hook annotation present without a type, or the health check opt-out set to "true".
pub fn is_ignored(doc: &Json) -> bool {
    if matches!(hook_types(doc), Some(t) if t.is_empty()) { return true; }
    annotation(doc, ANNOTATION_IGNORE_HEALTHCHECK) == Some("true")
}
