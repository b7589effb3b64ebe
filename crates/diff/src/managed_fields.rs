//! Fields owned by trusted field managers in the live object take precedence over the target.
//!
//! Each trusted `metadata.managedFields[].fieldsV1` set is walked against live and target; owned
//! leaves (and owned subtrees the target does not declare) are copied from live into the target,
//! so that writes by those managers never register as drift.

use anyhow::{anyhow, Result};
use drydock_core::Json;
use serde_json::Map;
use tracing::debug;

pub fn normalize(live: &Json, target: &mut Json, trusted_managers: &[String]) -> Result<()> {
    let Some(entries) = live.get("metadata").and_then(|m| m.get("managedFields")).and_then(|m| m.as_array()) else {
        return Ok(());
    };
    for entry in entries {
        let manager = entry.get("manager").and_then(|m| m.as_str()).unwrap_or("");
        if !trusted_managers.iter().any(|t| t == manager) { continue; }
        let fields_type = entry.get("fieldsType").and_then(|t| t.as_str()).unwrap_or("FieldsV1");
        if fields_type != "FieldsV1" {
            return Err(anyhow!("unsupported managed fields type {fields_type:?} for manager {manager}"));
        }
        let Some(fields) = entry.get("fieldsV1").and_then(|f| f.as_object()) else { continue };
        debug!(manager = %manager, "applying trusted manager fields");
        apply(fields, live, target)?;
    }
    Ok(())
}

fn is_leaf(set: &Json) -> bool {
    set.as_object().map_or(true, |m| m.keys().all(|k| k == "."))
}

fn key_matches(item: &Json, key: &Map<String, Json>) -> bool {
    key.iter().all(|(k, v)| item.get(k) == Some(v))
}

fn apply(fields: &Map<String, Json>, live: &Json, target: &mut Json) -> Result<()> {
    for (path, sub) in fields {
        if path == "." { continue; }
        let (prefix, body) = path.split_at(path.find(':').map_or(0, |i| i + 1));
        match prefix {
            "f:" => {
                let (Some(live_child), Some(target_map)) = (live.get(body), target.as_object_mut()) else { continue };
                match target_map.get_mut(body) {
                    Some(target_child) if !is_leaf(sub) => {
                        if let Some(set) = sub.as_object() { apply(set, live_child, target_child)?; }
                    }
                    _ => { target_map.insert(body.to_string(), live_child.clone()); }
                }
            }
            "k:" => {
                let key: Map<String, Json> = serde_json::from_str(body)
                    .map_err(|e| anyhow!("invalid managed fields key {body:?}: {e}"))?;
                let Some(live_item) = live.as_array().and_then(|a| a.iter().find(|i| key_matches(i, &key))) else { continue };
                let Some(target_items) = target.as_array_mut() else { continue };
                match target_items.iter_mut().find(|i| key_matches(i, &key)) {
                    Some(target_item) if !is_leaf(sub) => {
                        if let Some(set) = sub.as_object() { apply(set, live_item, target_item)?; }
                    }
                    Some(target_item) => *target_item = live_item.clone(),
                    None => target_items.push(live_item.clone()),
                }
            }
            "v:" => {
                let value: Json = serde_json::from_str(body)
                    .map_err(|e| anyhow!("invalid managed fields value {body:?}: {e}"))?;
                let in_live = live.as_array().map_or(false, |a| a.contains(&value));
                if let (true, Some(target_items)) = (in_live, target.as_array_mut()) {
                    if !target_items.contains(&value) { target_items.push(value); }
                }
            }
            "i:" => {
                let idx: usize = body.parse().map_err(|_| anyhow!("invalid managed fields index {body:?}"))?;
                let (Some(live_item), Some(target_item)) = (live.get(idx), target.get_mut(idx)) else { continue };
                match sub.as_object() {
                    Some(set) if !is_leaf(sub) => apply(set, live_item, target_item)?,
                    _ => *target_item = live_item.clone(),
                }
            }
            _ => return Err(anyhow!("unknown managed fields path element {path:?}")),
        }
    }
    Ok(())
}
