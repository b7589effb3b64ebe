//! Custom resources read from their status shape only.

use anyhow::{anyhow, Result};
use drydock_core::{HealthStatus, HealthStatusCode, Json};
use serde::Deserialize;

/// Child applications report their own aggregate under `status.health`.
pub fn application(obj: &Json) -> Result<HealthStatus> {
    let health = obj.get("status").and_then(|s| s.get("health"));
    let status = health.and_then(|h| h.get("status")).and_then(|s| s.as_str()).unwrap_or("");
    let message = health.and_then(|h| h.get("message")).and_then(|m| m.as_str()).unwrap_or("");
    if status.is_empty() {
        return Ok(HealthStatus::new(HealthStatusCode::Unknown, message));
    }
    let code = status.parse::<HealthStatusCode>().map_err(|e| anyhow!("application {}: {e}", drydock_core::doc::name(obj)))?;
    Ok(HealthStatus::new(code, message))
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowStatus {
    #[serde(default)]
    phase: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct Workflow {
    #[serde(default)]
    status: WorkflowStatus,
}

pub fn workflow(obj: &Json) -> Result<HealthStatus> {
    let wf: Workflow = serde_json::from_value(obj.clone())?;
    let code = match wf.status.phase.as_str() {
        "Pending" | "Running" => HealthStatusCode::Progressing,
        "Failed" | "Error" => HealthStatusCode::Degraded,
        _ => HealthStatusCode::Healthy,
    };
    Ok(HealthStatus::new(code, wf.status.message))
}
