//! Live versus desired comparison, producing the normalized live state and the live state
//! predicted after applying the desired manifest.

use std::sync::Arc;

use drydock_core::doc::{self, ANNOTATION_LAST_APPLIED};
use drydock_core::{DiffResult, DiffResultList, Json};
use serde_json::Map;
use tracing::{debug, error};

use crate::normalize::{builtin, Normalizer};
use crate::DiffError;

#[derive(Clone, Default)]
pub struct DiffOptions {
    pub normalizer: Option<Arc<dyn Normalizer>>,
    pub ignore_aggregated_roles: bool,
}

pub fn normalize(obj: &mut Json, opts: &DiffOptions) {
    builtin::normalize(obj, opts.ignore_aggregated_roles);
    if let Some(n) = &opts.normalizer {
        if let Err(e) = n.normalize(obj) {
            error!(resource = %drydock_core::ResourceKey::from_doc(obj), error = %e, "failed to normalize");
        }
    }
}

/// Compare one desired (`config`) and one live document. At least one must be present.
pub fn diff(config: Option<&Json>, live: Option<&Json>, opts: &DiffOptions) -> Result<DiffResult, DiffError> {
    let config = config.map(|c| {
        let mut c = c.clone();
        normalize(&mut c, opts);
        c
    });
    let live = live.map(|l| {
        let mut l = l.clone();
        normalize(&mut l, opts);
        l
    });

    if let (Some(cfg), Some(lv)) = (config.as_ref(), live.as_ref()) {
        match last_applied(lv) {
            Ok(Some(mut orig)) => {
                normalize(&mut orig, opts);
                return three_way_diff(&orig, cfg, lv);
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "failed to read last applied configuration; using two-way diff"),
        }
    }
    two_way_diff(config.as_ref(), live.as_ref())
}

/// Pairwise diff over aligned arrays.
pub fn diff_array(configs: &[Option<Json>], lives: &[Option<Json>], opts: &DiffOptions) -> Result<DiffResultList, DiffError> {
    if configs.len() != lives.len() { return Err(DiffError::LengthMismatch); }
    let mut out = DiffResultList::default();
    for (c, l) in configs.iter().zip(lives) {
        out.push(diff(c.as_ref(), l.as_ref(), opts)?);
    }
    Ok(out)
}

fn last_applied(live: &Json) -> Result<Option<Json>, DiffError> {
    let Some(raw) = doc::annotation(live, ANNOTATION_LAST_APPLIED) else { return Ok(None) };
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|e| DiffError::Compute(format!("failed to parse {ANNOTATION_LAST_APPLIED} in {}: {e}", doc::name(live))))
}

pub fn two_way_diff(config: Option<&Json>, live: Option<&Json>) -> Result<DiffResult, DiffError> {
    match (config, live) {
        (Some(c), Some(l)) => three_way_diff(c, c, l),
        (None, Some(l)) => Ok(DiffResult { normalized_live: serde_json::to_vec(l)?, predicted_live: b"null".to_vec(), modified: false }),
        (Some(c), None) => Ok(DiffResult { normalized_live: b"null".to_vec(), predicted_live: serde_json::to_vec(c)?, modified: true }),
        (None, None) => Err(DiffError::Compute("both live and config are null objects".into())),
    }
}

pub fn three_way_diff(orig: &Json, config: &Json, live: &Json) -> Result<DiffResult, DiffError> {
    let orig = remove_namespace_annotation(orig);
    let config = remove_namespace_annotation(config);
    let current = remove_fields(&orig, live);
    let patch = three_way_merge_patch(&orig, &config, &current);
    let mut predicted = live.clone();
    json_patch::merge(&mut predicted, &patch);
    let live_bytes = serde_json::to_vec(live)?;
    let predicted_bytes = serde_json::to_vec(&predicted)?;
    Ok(DiffResult { modified: live_bytes != predicted_bytes, normalized_live: live_bytes, predicted_live: predicted_bytes })
}

/// Drop `metadata.namespace` and an empty or null annotations map.
fn remove_namespace_annotation(obj: &Json) -> Json {
    let mut obj = obj.clone();
    if let Some(meta) = obj.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        meta.remove("namespace");
        let empty = match meta.get("annotations") {
            Some(Json::Null) => true,
            Some(Json::Object(a)) => a.is_empty(),
            _ => false,
        };
        if empty { meta.remove("annotations"); }
    }
    obj
}

/// Keep only the parts of `live` that `config` also declares. Extra trailing list items stay.
pub fn remove_fields(config: &Json, live: &Json) -> Json {
    match (config, live) {
        (Json::Object(c), Json::Object(l)) => {
            let mut out = Map::new();
            for (k, cv) in c {
                if let Some(lv) = l.get(k) {
                    out.insert(k.clone(), if lv.is_null() { Json::Null } else { remove_fields(cv, lv) });
                }
            }
            Json::Object(out)
        }
        (Json::Array(c), Json::Array(l)) => Json::Array(
            l.iter()
                .enumerate()
                .map(|(i, lv)| match c.get(i) {
                    Some(cv) if !lv.is_null() => remove_fields(cv, lv),
                    _ => lv.clone(),
                })
                .collect(),
        ),
        _ => live.clone(),
    }
}

/// RFC 7386 patch turning `a` into `b`.
fn create_merge_patch(a: &Json, b: &Json) -> Json {
    let (Json::Object(am), Json::Object(bm)) = (a, b) else { return b.clone() };
    let mut p = Map::new();
    for (k, bv) in bm {
        match am.get(k) {
            Some(av) if av == bv => {}
            Some(av @ Json::Object(_)) if bv.is_object() => {
                let sub = create_merge_patch(av, bv);
                if sub.as_object().map_or(true, |m| !m.is_empty()) { p.insert(k.clone(), sub); }
            }
            _ => { p.insert(k.clone(), bv.clone()); }
        }
    }
    for k in am.keys() {
        if !bm.contains_key(k) { p.insert(k.clone(), Json::Null); }
    }
    Json::Object(p)
}

/// Keep only nulls (deletions) or drop them (changes). Explicit empty maps count as values.
fn filter_nulls(m: &Map<String, Json>, keep_nulls: bool) -> Map<String, Json> {
    let mut out = Map::new();
    for (k, v) in m {
        match v {
            Json::Null => { if keep_nulls { out.insert(k.clone(), Json::Null); } }
            Json::Object(sub) if sub.is_empty() => { if !keep_nulls { out.insert(k.clone(), v.clone()); } }
            Json::Object(sub) => {
                let f = filter_nulls(sub, keep_nulls);
                if !f.is_empty() { out.insert(k.clone(), Json::Object(f)); }
            }
            other => { if !keep_nulls { out.insert(k.clone(), other.clone()); } }
        }
    }
    out
}

/// Changes from `current` to `config`, plus deletions of keys that were in `orig` and are gone
/// from `config`.
fn three_way_merge_patch(orig: &Json, config: &Json, current: &Json) -> Json {
    let as_map = |v: Json| match v {
        Json::Object(m) => m,
        _ => Map::new(),
    };
    let delta = filter_nulls(&as_map(create_merge_patch(current, config)), false);
    let deletions = filter_nulls(&as_map(create_merge_patch(orig, config)), true);
    let mut patch = Json::Object(deletions);
    json_patch::merge(&mut patch, &Json::Object(delta));
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deploy(replicas: i64) -> Json {
        json!({"apiVersion": "apps/v1", "kind": "Deployment", "metadata": {"name": "web", "namespace": "default"},
            "spec": {"replicas": replicas, "template": {"spec": {"containers": [{"name": "a", "image": "nginx"}]}}}})
    }

    fn parsed(bytes: &[u8]) -> Json { serde_json::from_slice(bytes).unwrap() }

    #[test]
    fn identical_is_unmodified() {
        let r = diff(Some(&deploy(2)), Some(&deploy(2)), &DiffOptions::default()).unwrap();
        assert!(!r.modified);
        assert_eq!(r.normalized_live, r.predicted_live);
    }

    #[test]
    fn server_defaults_are_not_drift() {
        let mut live = deploy(2);
        live["metadata"]["uid"] = json!("abc");
        live["metadata"]["resourceVersion"] = json!("7");
        live["spec"]["strategy"] = json!({"type": "RollingUpdate"});
        live["spec"]["template"]["spec"]["containers"][0]["imagePullPolicy"] = json!("Always");
        live["status"] = json!({"replicas": 2});
        let r = diff(Some(&deploy(2)), Some(&live), &DiffOptions::default()).unwrap();
        assert!(!r.modified);
    }

    #[test]
    fn changed_field_predicted() {
        let r = diff(Some(&deploy(3)), Some(&deploy(2)), &DiffOptions::default()).unwrap();
        assert!(r.modified);
        assert_eq!(parsed(&r.predicted_live)["spec"]["replicas"], 3);
        assert_eq!(parsed(&r.normalized_live)["spec"]["replicas"], 2);
    }

    #[test]
    fn create_and_delete() {
        let create = diff(Some(&deploy(1)), None, &DiffOptions::default()).unwrap();
        assert!(create.modified);
        assert_eq!(create.normalized_live, b"null");
        let delete = diff(None, Some(&deploy(1)), &DiffOptions::default()).unwrap();
        assert!(!delete.modified);
        assert_eq!(delete.predicted_live, b"null");
        assert!(diff(None, None, &DiffOptions::default()).is_err());
    }

    #[test]
    fn last_applied_removes_dropped_fields() {
        let mut last = deploy(2);
        last["spec"]["paused"] = json!(true);
        let mut live = deploy(2);
        live["spec"]["paused"] = json!(true);
        live["metadata"]["annotations"] = json!({ANNOTATION_LAST_APPLIED: last.to_string()});
        let r = diff(Some(&deploy(2)), Some(&live), &DiffOptions::default()).unwrap();
        assert!(r.modified);
        assert!(parsed(&r.predicted_live)["spec"].get("paused").is_none());

        // Without last-applied the extra live field is not ours to delete.
        let mut plain = deploy(2);
        plain["spec"]["paused"] = json!(true);
        assert!(!diff(Some(&deploy(2)), Some(&plain), &DiffOptions::default()).unwrap().modified);
    }

    #[test]
    fn bad_last_applied_falls_back() {
        let mut live = deploy(2);
        live["metadata"]["annotations"] = json!({ANNOTATION_LAST_APPLIED: "{not json"});
        let r = diff(Some(&deploy(2)), Some(&live), &DiffOptions::default()).unwrap();
        assert!(!r.modified);
    }

    #[test]
    fn array_mismatch() {
        let err = diff_array(&[None], &[], &DiffOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "left and right arrays have mismatched lengths");
    }
}
