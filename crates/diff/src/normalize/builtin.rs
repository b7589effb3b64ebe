//! Normalizations applied to every document regardless of configured rules.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use drydock_core::doc;
use drydock_core::Json;
use serde_json::Map;
use tracing::debug;

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

pub fn normalize(obj: &mut Json, ignore_aggregated_roles: bool) {
    if let Some(meta) = obj.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        meta.remove("creationTimestamp");
    }
    let group = doc::group(obj).to_string();
    let kind = doc::kind(obj).to_string();
    match (group.as_str(), kind.as_str()) {
        ("", "Secret") => normalize_secret(obj),
        (RBAC_GROUP, "Role") | (RBAC_GROUP, "ClusterRole") => normalize_role(obj, ignore_aggregated_roles),
        ("", "Endpoints") => normalize_endpoints(obj),
        _ => {}
    }
}

/// Fold `stringData` into base64 `data`; null data values become empty strings.
pub fn normalize_secret(obj: &mut Json) {
    let Some(map) = obj.as_object_mut() else { return };
    if let Some(Json::Object(string_data)) = map.remove("stringData") {
        let data = map.entry("data").or_insert_with(|| Json::Object(Map::new()));
        if !data.is_object() { *data = Json::Object(Map::new()); }
        if let Some(data) = data.as_object_mut() {
            for (k, v) in string_data {
                let encoded = match v {
                    Json::String(s) => Json::String(STANDARD.encode(s.as_bytes())),
                    other => other,
                };
                data.insert(k, encoded);
            }
        }
    }
    if let Some(data) = map.get_mut("data").and_then(|d| d.as_object_mut()) {
        for v in data.values_mut() {
            if v.is_null() { *v = Json::String(String::new()); }
        }
    }
}

/// Empty rules become null; aggregated roles drop their rules entirely when requested.
pub fn normalize_role(obj: &mut Json, ignore_aggregated_roles: bool) {
    let name = doc::name(obj).to_string();
    let Some(map) = obj.as_object_mut() else { return };
    if ignore_aggregated_roles {
        match map.get("aggregationRule") {
            Some(Json::Object(_)) => { map.insert("rules".into(), Json::Null); }
            Some(_) => debug!(role = %name, "malformed aggregationRule; leaving rules untouched"),
            None => {}
        }
    }
    if matches!(map.get("rules"), Some(Json::Array(rules)) if rules.is_empty()) {
        map.insert("rules".into(), Json::Null);
    }
}

fn sort_key(v: &Json) -> String { v.to_string() }

/// Default port protocols to TCP and put subsets, addresses and ports in a stable order.
pub fn normalize_endpoints(obj: &mut Json) {
    let Some(subsets) = obj.get_mut("subsets").and_then(|s| s.as_array_mut()) else { return };
    for subset in subsets.iter_mut() {
        let Some(s) = subset.as_object_mut() else { continue };
        if let Some(ports) = s.get_mut("ports").and_then(|p| p.as_array_mut()) {
            for port in ports.iter_mut() {
                if let Some(p) = port.as_object_mut() {
                    let missing = p.get("protocol").and_then(|v| v.as_str()).map_or(true, str::is_empty);
                    if missing { p.insert("protocol".into(), Json::String("TCP".into())); }
                }
            }
            ports.sort_by_key(sort_key);
        }
        for field in ["addresses", "notReadyAddresses"] {
            if let Some(addrs) = s.get_mut(field).and_then(|a| a.as_array_mut()) {
                addrs.sort_by(|a, b| {
                    let ip = |v: &Json| v.get("ip").and_then(|i| i.as_str()).unwrap_or("").to_string();
                    ip(a).cmp(&ip(b)).then_with(|| sort_key(a).cmp(&sort_key(b)))
                });
            }
        }
    }
    subsets.sort_by_key(sort_key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn creation_timestamp_dropped() {
        let mut d = json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "a", "creationTimestamp": null}});
        normalize(&mut d, false);
        assert_eq!(d["metadata"], json!({"name": "a"}));
    }

    #[test]
    fn secret_string_data() {
        let mut d = json!({"apiVersion": "v1", "kind": "Secret", "stringData": {"user": "admin"}, "data": {"empty": null, "pw": "cHc="}});
        normalize(&mut d, false);
        assert!(d.get("stringData").is_none());
        assert_eq!(d["data"], json!({"user": "YWRtaW4=", "empty": "", "pw": "cHc="}));
    }

    #[test]
    fn roles() {
        let mut empty = json!({"apiVersion": "rbac.authorization.k8s.io/v1", "kind": "Role", "rules": []});
        normalize(&mut empty, false);
        assert_eq!(empty["rules"], Json::Null);

        let agg = json!({"apiVersion": "rbac.authorization.k8s.io/v1", "kind": "ClusterRole",
            "aggregationRule": {"clusterRoleSelectors": []}, "rules": [{"verbs": ["get"]}]});
        let mut kept = agg.clone();
        normalize(&mut kept, false);
        assert_eq!(kept["rules"], json!([{"verbs": ["get"]}]));
        let mut dropped = agg;
        normalize(&mut dropped, true);
        assert_eq!(dropped["rules"], Json::Null);
    }

    #[test]
    fn endpoints_are_ordered() {
        let mut a = json!({"apiVersion": "v1", "kind": "Endpoints", "subsets": [
            {"addresses": [{"ip": "10.0.0.2"}, {"ip": "10.0.0.1"}], "ports": [{"port": 80}]},
            {"addresses": [{"ip": "10.0.0.0"}], "ports": [{"port": 443, "protocol": "TCP"}]}
        ]});
        let mut b = json!({"apiVersion": "v1", "kind": "Endpoints", "subsets": [
            {"addresses": [{"ip": "10.0.0.0"}], "ports": [{"port": 443}]},
            {"addresses": [{"ip": "10.0.0.1"}, {"ip": "10.0.0.2"}], "ports": [{"port": 80, "protocol": "TCP"}]}
        ]});
        normalize(&mut a, false);
        normalize(&mut b, false);
        assert_eq!(a, b);
    }
}
