use std::collections::BTreeMap;

use anyhow::anyhow;
use drydock_core::doc;
use drydock_core::overrides::glob_match;
use drydock_core::{Json, ResourceIgnoreDifferences, ResourceOverride};
use tracing::{trace, warn};

use super::Normalizer;
use crate::jq::JqPath;
use crate::DiffError;

/// An RFC 6901 pointer split into its parent pointer and the escaped last token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    parent: String,
    last: String,
}

impl Pointer {
    pub fn parse(ptr: &str) -> Result<Self, DiffError> {
        if !ptr.starts_with('/') {
            return Err(DiffError::Normalizer(format!("invalid JSON pointer {ptr:?}: must start with '/'")));
        }
        let (parent, last) = ptr.rsplit_once('/').unwrap_or(("", ptr));
        Ok(Self { parent: parent.to_string(), last: last.replace("~1", "/").replace("~0", "~") })
    }

    /// Remove the referenced value; `false` when it does not exist.
    pub fn remove(&self, doc: &mut Json) -> bool {
        match doc.pointer_mut(&self.parent) {
            Some(Json::Object(map)) => map.remove(&self.last).is_some(),
            Some(Json::Array(items)) => match self.last.parse::<usize>() {
                Ok(i) if i < items.len() => {
                    items.remove(i);
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }
}

struct Patch {
    group: String,
    kind: String,
    name: String,
    namespace: String,
    pointers: Vec<Pointer>,
    jq: Vec<JqPath>,
}

impl Patch {
    fn matches(&self, obj: &Json) -> bool {
        glob_match(&self.group, doc::group(obj))
            && glob_match(&self.kind, doc::kind(obj))
            && (self.name.is_empty() || self.name == doc::name(obj))
            && (self.namespace.is_empty() || self.namespace == doc::namespace(obj))
    }
}

/// Removes ignored fields declared by application rules and system overrides.
pub struct IgnoreNormalizer {
    patches: Vec<Patch>,
}

fn split_override_key(key: &str) -> (String, String) {
    match key.split_once('/') {
        Some((g, k)) => (g.to_string(), k.to_string()),
        None => (String::new(), key.to_string()),
    }
}

impl IgnoreNormalizer {
    pub fn new(
        ignores: &[ResourceIgnoreDifferences],
        overrides: &BTreeMap<String, ResourceOverride>,
    ) -> Result<Self, DiffError> {
        let mut rules: Vec<ResourceIgnoreDifferences> = ignores.to_vec();
        for (key, o) in overrides {
            let ig = &o.ignore_differences;
            if ig.json_pointers.is_empty() && ig.jq_path_expressions.is_empty() { continue; }
            let (group, kind) = split_override_key(key);
            rules.push(ResourceIgnoreDifferences {
                group,
                kind,
                json_pointers: ig.json_pointers.clone(),
                jq_path_expressions: ig.jq_path_expressions.clone(),
                ..Default::default()
            });
        }

        let mut patches = Vec::with_capacity(rules.len());
        for r in rules {
            let pointers = r.json_pointers.iter().map(|p| Pointer::parse(p)).collect::<Result<Vec<_>, _>>()?;
            let jq = r
                .jq_path_expressions
                .iter()
                .map(|e| JqPath::compile(e).map_err(|e| DiffError::Normalizer(e.to_string())))
                .collect::<Result<Vec<_>, _>>()?;
            patches.push(Patch { group: r.group, kind: r.kind, name: r.name, namespace: r.namespace, pointers, jq });
        }
        Ok(Self { patches })
    }

    pub fn is_empty(&self) -> bool { self.patches.is_empty() }
}

impl Normalizer for IgnoreNormalizer {
    fn normalize(&self, obj: &mut Json) -> anyhow::Result<()> {
        if !obj.is_object() { return Err(anyhow!("cannot normalize a non-object document")); }
        for p in self.patches.iter() {
            if !p.matches(obj) { continue; }
            for ptr in &p.pointers {
                if !ptr.remove(obj) {
                    trace!(parent = %ptr.parent, key = %ptr.last, "ignore pointer not present");
                }
            }
            for jq in &p.jq {
                match jq.delete(obj) {
                    Ok(changed) => trace!(expr = %jq.source(), changed, "applied jq ignore"),
                    Err(e) => warn!(expr = %jq.source(), name = %doc::name(obj), error = %e, "jq ignore rule skipped"),
                }
            }
        }
        Ok(())
    }
}
