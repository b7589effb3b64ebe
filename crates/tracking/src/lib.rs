//! Drydock resource tracking: which application owns a live resource, and how that is recorded.
//!
//! Ownership is stored either in a label (`<key>: <app>`), in the `drydock.dev/tracking-id`
//! annotation (`<app>:<group>/<kind>:<namespace>/<name>`), or in both.

#![forbid(unsafe_code)]

use drydock_core::doc;
use drydock_core::{Json, ResourceKey};
use tracing::debug;

pub use drydock_core::TrackingMethod;

pub const ANNOTATION_TRACKING_ID: &str = "drydock.dev/tracking-id";
const LABEL_VALUE_MAX: usize = 63;
const NAMESPACE_DELIMITER: char = '_';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackingError {
    #[error("invalid tracking value {0:?}: expected <app>:<group>/<kind>:<namespace>/<name>")]
    InvalidValue(String),
    #[error("value {value:?} for label {key} exceeds {LABEL_VALUE_MAX} characters")]
    LabelTooLong { key: String, value: String },
    #[error("document is not an object")]
    NotAnObject,
}

/// Parsed form of the tracking annotation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AppInstanceValue {
    pub application_name: String,
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl AppInstanceValue {
    pub fn new(application_name: &str, key: &ResourceKey) -> Self {
        Self {
            application_name: application_name.to_string(),
            group: key.group.clone(),
            kind: key.kind.clone(),
            namespace: key.namespace.clone(),
            name: key.name.clone(),
        }
    }

    pub fn parse(value: &str) -> Result<Self, TrackingError> {
        let invalid = || TrackingError::InvalidValue(value.to_string());
        let parts: Vec<&str> = value.split(':').collect();
        let [app, gk, nn] = parts.as_slice() else { return Err(invalid()) };
        let (group, kind) = gk.split_once('/').ok_or_else(invalid)?;
        let (namespace, name) = nn.split_once('/').ok_or_else(invalid)?;
        if kind.contains('/') || name.contains('/') { return Err(invalid()); }
        Ok(Self {
            application_name: app.to_string(),
            group: group.to_string(),
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    pub fn is_child_app(&self) -> bool { !self.application_name.is_empty() }

    pub fn resource_key(&self) -> ResourceKey {
        ResourceKey::new(&self.group, &self.kind, &self.namespace, &self.name)
    }
}

impl std::fmt::Display for AppInstanceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}/{}:{}/{}", self.application_name, self.group, self.kind, self.namespace, self.name)
    }
}

/// Application name with the namespace it lives in, encoded as `<namespace>_<app>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceName {
    pub namespace: String,
    pub name: String,
}

impl InstanceName {
    /// No delimiter means the application lives in the controller's namespace.
    pub fn parse(value: &str, controller_namespace: &str) -> Self {
        match value.split_once(NAMESPACE_DELIMITER) {
            Some((ns, name)) => Self { namespace: ns.to_string(), name: name.to_string() },
            None => Self { namespace: controller_namespace.to_string(), name: value.to_string() },
        }
    }

    pub fn encode(&self, controller_namespace: &str) -> String {
        if self.namespace.is_empty() || self.namespace == controller_namespace {
            self.name.clone()
        } else {
            format!("{}{}{}", self.namespace, NAMESPACE_DELIMITER, self.name)
        }
    }
}

fn strip_namespace(app: &str) -> String {
    InstanceName::parse(app, "").name
}

fn annotation_value(doc: &Json) -> Option<AppInstanceValue> {
    let raw = doc::annotation(doc, ANNOTATION_TRACKING_ID)?;
    match AppInstanceValue::parse(raw) {
        Ok(v) => Some(v),
        Err(e) => {
            debug!(resource = %ResourceKey::from_doc(doc), error = %e, "unparseable tracking annotation");
            None
        }
    }
}

/// Owning application name, or `""` when the document is untracked.
pub fn get_app_name(doc: &Json, label_key: &str, method: TrackingMethod) -> String {
    let from_label = || doc::label(doc, label_key).map(strip_namespace);
    let from_annotation = || annotation_value(doc).map(|v| strip_namespace(&v.application_name));
    let name = match method {
        TrackingMethod::Label => from_label(),
        TrackingMethod::Annotation => from_annotation(),
        TrackingMethod::AnnotationAndLabel => from_label().or_else(from_annotation),
    };
    name.unwrap_or_default()
}

/// Full tracking identity. With the label method it is synthesized from the document itself.
pub fn get_app_instance_value(doc: &Json, label_key: &str, method: TrackingMethod) -> Option<AppInstanceValue> {
    let synthesize = |app: &str| AppInstanceValue::new(app, &ResourceKey::from_doc(doc));
    match method {
        TrackingMethod::Label => doc::label(doc, label_key).map(synthesize),
        TrackingMethod::Annotation => annotation_value(doc),
        TrackingMethod::AnnotationAndLabel => match (doc::label(doc, label_key), annotation_value(doc)) {
            (Some(label), Some(v)) if v.application_name == label => Some(v),
            (Some(label), _) => Some(synthesize(label)),
            (None, v) => v,
        },
    }
}

/// Stamp ownership onto `doc`. `owned` overrides the identity recorded in the annotation.
pub fn set_app_instance(
    doc: &mut Json,
    label_key: &str,
    app_name: &str,
    owned: Option<&ResourceKey>,
    method: TrackingMethod,
) -> Result<(), TrackingError> {
    if !doc.is_object() { return Err(TrackingError::NotAnObject); }
    let set_label = |doc: &mut Json| {
        if app_name.len() > LABEL_VALUE_MAX {
            return Err(TrackingError::LabelTooLong { key: label_key.to_string(), value: app_name.to_string() });
        }
        doc::set_label(doc, label_key, app_name);
        Ok(())
    };
    let set_annotation = |doc: &mut Json| {
        let key = owned.cloned().unwrap_or_else(|| ResourceKey::from_doc(doc));
        let value = AppInstanceValue::new(app_name, &key).to_string();
        doc::set_annotation(doc, ANNOTATION_TRACKING_ID, &value);
    };
    match method {
        TrackingMethod::Label => set_label(doc)?,
        TrackingMethod::Annotation => set_annotation(doc),
        TrackingMethod::AnnotationAndLabel => {
            set_label(doc)?;
            set_annotation(doc);
        }
    }
    Ok(())
}

/// Migrate a live object from label tracking to annotation tracking before diffing, so that the
/// switch alone never shows up as drift. Runs the same way under every tracking method.
pub fn normalize(
    desired: Option<&Json>,
    live: Option<&mut Json>,
    label_key: &str,
    _method: TrackingMethod,
) -> Result<(), TrackingError> {
    let (Some(desired), Some(live)) = (desired, live) else { return Ok(()) };
    if doc::label(live, label_key).is_none() { return Ok(()); }
    let Some(annotation) = doc::annotation(desired, ANNOTATION_TRACKING_ID) else { return Ok(()) };
    if !doc::set_annotation(live, ANNOTATION_TRACKING_ID, annotation) {
        return Err(TrackingError::NotAnObject);
    }
    if doc::label(desired, label_key).is_none() {
        doc::remove_label(live, label_key);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const KEY: &str = "app.kubernetes.io/instance";

    #[test]
    fn parse_and_format_are_inverse() {
        let raw = "guestbook:apps/Deployment:default/web";
        let v = AppInstanceValue::parse(raw).unwrap();
        assert_eq!(v.group, "apps");
        assert_eq!(v.name, "web");
        assert_eq!(v.to_string(), raw);
        let core = AppInstanceValue::parse("ns_app:/Service:default/svc").unwrap();
        assert_eq!(core.group, "");
        assert_eq!(core.to_string(), "ns_app:/Service:default/svc");
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["", "app", "app:apps/Deployment", "app:Deployment:ns/name", "app:apps/Deployment:name", "a:b/c:d/e:f"] {
            assert!(AppInstanceValue::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn instance_name_defaults_to_controller_namespace() {
        let n = InstanceName::parse("guestbook", "drydock");
        assert_eq!((n.namespace.as_str(), n.name.as_str()), ("drydock", "guestbook"));
        let n = InstanceName::parse("team-a_guestbook", "drydock");
        assert_eq!((n.namespace.as_str(), n.name.as_str()), ("team-a", "guestbook"));
        assert_eq!(n.encode("drydock"), "team-a_guestbook");
        assert_eq!(InstanceName::parse("guestbook", "drydock").encode("drydock"), "guestbook");
    }

    #[test]
    fn child_app() {
        assert!(AppInstanceValue::parse("a:/Service:ns/x").unwrap().is_child_app());
        assert!(!AppInstanceValue::parse(":/Service:ns/x").unwrap().is_child_app());
    }

    #[test]
    fn label_too_long() {
        let mut d = json!({"metadata": {"name": "x"}});
        let long = "a".repeat(64);
        let err = set_app_instance(&mut d, KEY, &long, None, TrackingMethod::Label).unwrap_err();
        assert!(matches!(err, TrackingError::LabelTooLong { .. }));
        assert!(set_app_instance(&mut d, KEY, &long, None, TrackingMethod::Annotation).is_ok());
    }

    #[test]
    fn not_an_object() {
        let mut d = json!([1, 2]);
        assert_eq!(set_app_instance(&mut d, KEY, "a", None, TrackingMethod::Label), Err(TrackingError::NotAnObject));
    }
}
