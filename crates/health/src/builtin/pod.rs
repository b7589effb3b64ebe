use anyhow::Result;
use drydock_core::{HealthStatus, HealthStatusCode, Json};
use k8s_openapi::api::core::v1::{ContainerStatus, Pod};

use super::typed;

fn is_failing_wait(reason: &str) -> bool {
    reason.starts_with("Err") || reason.ends_with("Error") || reason.ends_with("BackOff")
}

fn fail_message(ctr: &ContainerStatus) -> Option<String> {
    let t = ctr.state.as_ref()?.terminated.as_ref()?;
    if let Some(msg) = t.message.as_deref().filter(|m| !m.is_empty()) {
        return Some(msg.to_string());
    }
    if t.reason.as_deref() == Some("OOMKilled") {
        return Some("OOMKilled".to_string());
    }
    (t.exit_code != 0).then(|| format!("container {:?} failed with exit code {}", ctr.name, t.exit_code))
}

/// Pods that always restart are checked for crash loops and pull failures before their phase.
/// Finite pods (`OnFailure`, `Never`) are usually hooks and stay Progressing while they run.
pub fn pod(obj: &Json) -> Result<HealthStatus> {
    let pod: Pod = typed(obj)?;
    let restart = pod.spec.as_ref().and_then(|s| s.restart_policy.clone()).unwrap_or_else(|| "Always".to_string());
    let status = pod.status.unwrap_or_default();
    let containers = status.container_statuses.unwrap_or_default();
    let message = status.message.unwrap_or_default();

    if restart == "Always" {
        let waiting: Vec<String> = containers
            .iter()
            .filter_map(|c| c.state.as_ref()?.waiting.as_ref())
            .filter(|w| w.reason.as_deref().map_or(false, is_failing_wait))
            .map(|w| w.message.clone().unwrap_or_default())
            .collect();
        if !waiting.is_empty() {
            return Ok(HealthStatus::degraded(waiting.join(", ")));
        }
    }

    let phase = status.phase.unwrap_or_default();
    Ok(match phase.as_str() {
        "Pending" => HealthStatus::progressing(message),
        "Succeeded" => HealthStatus::new(HealthStatusCode::Healthy, message),
        "Failed" => {
            if !message.is_empty() {
                return Ok(HealthStatus::degraded(message));
            }
            let init = status.init_container_statuses.unwrap_or_default();
            let msg = init.iter().chain(containers.iter()).find_map(fail_message).unwrap_or_default();
            HealthStatus::degraded(msg)
        }
        "Running" => match restart.as_str() {
            "Always" => {
                let ready = status
                    .conditions
                    .iter()
                    .flatten()
                    .any(|c| c.type_ == "Ready" && c.status == "True");
                if ready {
                    HealthStatus::new(HealthStatusCode::Healthy, message)
                } else if containers.iter().any(|c| {
                    c.last_state.as_ref().and_then(|s| s.terminated.as_ref()).is_some()
                }) {
                    HealthStatus::degraded(message)
                } else {
                    HealthStatus::progressing(message)
                }
            }
            _ => HealthStatus::progressing(message),
        },
        _ => HealthStatus::new(HealthStatusCode::Unknown, message),
    })
}
