use anyhow::Result;
use drydock_core::{HealthStatus, HealthStatusCode, Json};
use k8s_openapi::api::batch::v1::Job;

use super::typed;

/// A `Failed` condition wins over `Complete`; without either the job is still running.
pub fn job(obj: &Json) -> Result<HealthStatus> {
    let job: Job = typed(obj)?;
    let mut failed = None;
    let mut complete = None;
    for c in job.status.and_then(|s| s.conditions).unwrap_or_default() {
        match c.type_.as_str() {
            "Failed" => failed = Some(c.message.unwrap_or_default()),
            "Complete" => complete = Some(c.message.unwrap_or_default()),
            _ => {}
        }
    }
    Ok(match (failed, complete) {
        (Some(msg), _) => HealthStatus::degraded(msg),
        (None, Some(msg)) => HealthStatus::new(HealthStatusCode::Healthy, msg),
        (None, None) => HealthStatus::progressing(""),
    })
}
