use drydock_tracking::{
    get_app_instance_value, get_app_name, normalize, set_app_instance, TrackingMethod, ANNOTATION_TRACKING_ID,
};
use serde_json::{json, Value as Json};

const KEY: &str = "app.kubernetes.io/instance";

fn deploy(name: &str) -> Json {
    json!({"apiVersion": "apps/v1", "kind": "Deployment", "metadata": {"name": name, "namespace": "default"}})
}

#[test]
fn label_moves_to_annotation() {
    let mut live = deploy("web");
    live["metadata"]["labels"] = json!({KEY: "guestbook"});
    let mut desired = deploy("web");
    desired["metadata"]["annotations"] = json!({ANNOTATION_TRACKING_ID: "guestbook:apps/Deployment:default/web"});

    normalize(Some(&desired), Some(&mut live), KEY, TrackingMethod::Annotation).unwrap();
    assert_eq!(live["metadata"]["annotations"][ANNOTATION_TRACKING_ID], "guestbook:apps/Deployment:default/web");
    assert!(live["metadata"].get("labels").is_none());
}

#[test]
fn label_kept_when_desired_declares_it() {
    let mut live = deploy("web");
    live["metadata"]["labels"] = json!({KEY: "guestbook", "tier": "web"});
    let mut desired = deploy("web");
    desired["metadata"]["labels"] = json!({KEY: "guestbook"});
    desired["metadata"]["annotations"] = json!({ANNOTATION_TRACKING_ID: "guestbook:apps/Deployment:default/web"});

    normalize(Some(&desired), Some(&mut live), KEY, TrackingMethod::AnnotationAndLabel).unwrap();
    assert_eq!(live["metadata"]["labels"][KEY], "guestbook");
    assert_eq!(live["metadata"]["annotations"][ANNOTATION_TRACKING_ID], "guestbook:apps/Deployment:default/web");
}

#[test]
fn normalize_is_noop_when_a_side_is_missing() {
    let mut live = deploy("web");
    live["metadata"]["labels"] = json!({KEY: "guestbook"});
    let before = live.clone();
    let mut desired = deploy("web");
    desired["metadata"]["annotations"] = json!({ANNOTATION_TRACKING_ID: "guestbook:apps/Deployment:default/web"});

    normalize(None, Some(&mut live), KEY, TrackingMethod::Annotation).unwrap();
    assert_eq!(live, before);
    normalize(Some(&desired), None, KEY, TrackingMethod::Annotation).unwrap();
}

#[test]
fn switch_to_label_refreshes_stale_annotation() {
    let mut live = deploy("web");
    live["metadata"]["labels"] = json!({KEY: "guestbook"});
    live["metadata"]["annotations"] = json!({ANNOTATION_TRACKING_ID: "old-app:apps/Deployment:default/web"});
    let mut desired = deploy("web");
    desired["metadata"]["labels"] = json!({KEY: "guestbook"});
    desired["metadata"]["annotations"] = json!({ANNOTATION_TRACKING_ID: "guestbook:apps/Deployment:default/web"});

    normalize(Some(&desired), Some(&mut live), KEY, TrackingMethod::Label).unwrap();
    assert_eq!(live["metadata"], desired["metadata"]);
    assert_eq!(get_app_name(&live, KEY, TrackingMethod::Label), "guestbook");
}

#[test]
fn label_method_still_drops_undeclared_label() {
    let mut live = deploy("web");
    live["metadata"]["labels"] = json!({KEY: "guestbook"});
    let mut desired = deploy("web");
    desired["metadata"]["annotations"] = json!({ANNOTATION_TRACKING_ID: "guestbook:apps/Deployment:default/web"});

    normalize(Some(&desired), Some(&mut live), KEY, TrackingMethod::Label).unwrap();
    assert!(live["metadata"].get("labels").is_none());
    assert_eq!(live["metadata"]["annotations"][ANNOTATION_TRACKING_ID], "guestbook:apps/Deployment:default/web");
}

#[test]
fn round_trip_each_method() {
    for method in [TrackingMethod::Label, TrackingMethod::Annotation, TrackingMethod::AnnotationAndLabel] {
        let mut d = deploy("web");
        set_app_instance(&mut d, KEY, "guestbook", None, method).unwrap();
        assert_eq!(get_app_name(&d, KEY, method), "guestbook", "{method}");
        let v = get_app_instance_value(&d, KEY, method).unwrap();
        assert_eq!(v.application_name, "guestbook");
        assert_eq!((v.group.as_str(), v.kind.as_str(), v.name.as_str()), ("apps", "Deployment", "web"));
    }
}

#[test]
fn namespaced_app_name_is_stripped() {
    let mut d = deploy("web");
    set_app_instance(&mut d, KEY, "team-a_guestbook", None, TrackingMethod::Annotation).unwrap();
    assert_eq!(d["metadata"]["annotations"][ANNOTATION_TRACKING_ID], "team-a_guestbook:apps/Deployment:default/web");
    assert_eq!(get_app_name(&d, KEY, TrackingMethod::Annotation), "guestbook");
}

#[test]
fn owned_identity_overrides_document() {
    let mut d = deploy("web");
    let owner = drydock_core::ResourceKey::new("apps", "Deployment", "prod", "frontend");
    set_app_instance(&mut d, KEY, "guestbook", Some(&owner), TrackingMethod::Annotation).unwrap();
    let v = get_app_instance_value(&d, KEY, TrackingMethod::Annotation).unwrap();
    assert_eq!(v.resource_key(), owner);
}

#[test]
fn label_authoritative_under_both() {
    let mut d = deploy("web");
    d["metadata"]["labels"] = json!({KEY: "from-label"});
    d["metadata"]["annotations"] = json!({ANNOTATION_TRACKING_ID: "from-annotation:apps/Deployment:default/web"});
    assert_eq!(get_app_name(&d, KEY, TrackingMethod::AnnotationAndLabel), "from-label");
    assert_eq!(get_app_name(&d, KEY, TrackingMethod::Annotation), "from-annotation");
    assert_eq!(get_app_name(&deploy("x"), KEY, TrackingMethod::AnnotationAndLabel), "");
}
