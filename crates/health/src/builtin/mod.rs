//! Built-in per-kind health checks. Each reads the document through its typed `k8s-openapi` form.

use anyhow::{anyhow, Result};
use drydock_core::Json;
use serde::de::DeserializeOwned;

pub mod apps;
pub mod batch;
pub mod crd;
pub mod kinds;
pub mod pod;

pub const APPLICATION_GROUP: &str = "drydock.dev";
pub const APPLICATION_KIND: &str = "Application";

/// Typed view of `obj`. The type tag is dropped first so older API versions of the same kind
/// (`extensions/v1beta1`, `networking.k8s.io/v1beta1`) read through the current struct.
pub(crate) fn typed<T: DeserializeOwned>(obj: &Json) -> Result<T> {
    let mut body = obj.clone();
    if let Some(map) = body.as_object_mut() {
        map.remove("apiVersion");
        map.remove("kind");
    }
    serde_json::from_value(body)
        .map_err(|e| anyhow!("failed to convert {} to {}: {e}", drydock_core::doc::kind(obj), std::any::type_name::<T>()))
}
