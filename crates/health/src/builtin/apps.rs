//! Workload controllers. Rollout checks follow `kubectl rollout status`.

use anyhow::Result;
use drydock_core::{HealthStatus, HealthStatusCode, Json};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};

use super::typed;

fn generation(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> i64 {
    meta.generation.unwrap_or(0)
}

pub fn deployment(obj: &Json) -> Result<HealthStatus> {
    let d: Deployment = typed(obj)?;
    let spec = d.spec.unwrap_or_default();
    let status = d.status.unwrap_or_default();
    if spec.paused.unwrap_or(false) {
        return Ok(HealthStatus::new(HealthStatusCode::Suspended, "Deployment is paused"));
    }
    if generation(&d.metadata) > status.observed_generation.unwrap_or(0) {
        return Ok(HealthStatus::progressing(
            "Waiting for rollout to finish: observed deployment generation less than desired generation",
        ));
    }

    let deadline_exceeded = status
        .conditions
        .iter()
        .flatten()
        .any(|c| c.type_ == "Progressing" && c.reason.as_deref() == Some("ProgressDeadlineExceeded"));
    if deadline_exceeded {
        let name = d.metadata.name.unwrap_or_default();
        return Ok(HealthStatus::degraded(format!("Deployment {name:?} exceeded its progress deadline")));
    }

    let updated = status.updated_replicas.unwrap_or(0);
    let replicas = status.replicas.unwrap_or(0);
    let available = status.available_replicas.unwrap_or(0);
    if let Some(want) = spec.replicas {
        if updated < want {
            return Ok(HealthStatus::progressing(format!(
                "Waiting for rollout to finish: {updated} out of {want} new replicas have been updated..."
            )));
        }
    }
    if replicas > updated {
        return Ok(HealthStatus::progressing(format!(
            "Waiting for rollout to finish: {} old replicas are pending termination...",
            replicas - updated
        )));
    }
    if available < updated {
        return Ok(HealthStatus::progressing(format!(
            "Waiting for rollout to finish: {available} of {updated} updated replicas are available..."
        )));
    }
    Ok(HealthStatus::healthy())
}

pub fn stateful_set(obj: &Json) -> Result<HealthStatus> {
    let s: StatefulSet = typed(obj)?;
    let spec = s.spec.unwrap_or_default();
    let status = s.status.unwrap_or_default();
    let observed = status.observed_generation.unwrap_or(0);
    if observed == 0 || generation(&s.metadata) > observed {
        return Ok(HealthStatus::progressing("Waiting for statefulset spec update to be observed..."));
    }
    let ready = status.ready_replicas.unwrap_or(0);
    let updated = status.updated_replicas.unwrap_or(0);
    if let Some(want) = spec.replicas {
        if ready < want {
            return Ok(HealthStatus::progressing(format!("Waiting for {} pods to be ready...", want - ready)));
        }
    }

    let strategy = spec.update_strategy.unwrap_or_default();
    if strategy.type_.as_deref() == Some("RollingUpdate") {
        if let Some(rolling) = strategy.rolling_update {
            if let (Some(want), Some(partition)) = (spec.replicas, rolling.partition) {
                if updated < want - partition {
                    return Ok(HealthStatus::progressing(format!(
                        "Waiting for partitioned roll out to finish: {updated} out of {} new pods have been updated...",
                        want - partition
                    )));
                }
            }
            return Ok(HealthStatus::new(
                HealthStatusCode::Healthy,
                format!("partitioned roll out complete: {updated} new pods have been updated..."),
            ));
        }
    }

    let update_rev = status.update_revision.unwrap_or_default();
    let current_rev = status.current_revision.unwrap_or_default();
    if update_rev != current_rev {
        return Ok(HealthStatus::progressing(format!(
            "waiting for statefulset rolling update to complete {updated} pods at revision {update_rev}..."
        )));
    }
    Ok(HealthStatus::new(
        HealthStatusCode::Healthy,
        format!(
            "statefulset rolling update complete {} pods at revision {current_rev}...",
            status.current_replicas.unwrap_or(0)
        ),
    ))
}

pub fn daemon_set(obj: &Json) -> Result<HealthStatus> {
    let d: DaemonSet = typed(obj)?;
    let status = d.status.unwrap_or_default();
    let name = d.metadata.name.clone().unwrap_or_default();
    if generation(&d.metadata) > status.observed_generation.unwrap_or(0) {
        return Ok(HealthStatus::progressing(
            "Waiting for rollout to finish: observed daemon set generation less than desired generation",
        ));
    }
    let desired = status.desired_number_scheduled;
    let updated = status.updated_number_scheduled.unwrap_or(0);
    let available = status.number_available.unwrap_or(0);
    if updated < desired {
        return Ok(HealthStatus::progressing(format!(
            "Waiting for daemon set {name:?} rollout to finish: {updated} out of {desired} new pods have been updated..."
        )));
    }
    if available < desired {
        return Ok(HealthStatus::progressing(format!(
            "Waiting for daemon set {name:?} rollout to finish: {available} of {desired} updated pods are available..."
        )));
    }
    Ok(HealthStatus::healthy())
}

pub fn replica_set(obj: &Json) -> Result<HealthStatus> {
    let r: ReplicaSet = typed(obj)?;
    let spec = r.spec.unwrap_or_default();
    let status = r.status.unwrap_or_default();
    if generation(&r.metadata) > status.observed_generation.unwrap_or(0) {
        return Ok(HealthStatus::progressing(
            "Waiting for rollout to finish: observed replica set generation less than desired generation",
        ));
    }
    let failure = status.conditions.iter().flatten().find(|c| c.type_ == "ReplicaFailure" && c.status == "True");
    if let Some(c) = failure {
        return Ok(HealthStatus::degraded(c.message.clone().unwrap_or_default()));
    }
    let available = status.available_replicas.unwrap_or(0);
    if let Some(want) = spec.replicas {
        if available < want {
            return Ok(HealthStatus::progressing(format!(
                "Waiting for rollout to finish: {available} out of {want} new replicas are available..."
            )));
        }
    }
    Ok(HealthStatus::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deploy(status: Json) -> Json {
        json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "web", "generation": 2},
            "spec": {"replicas": 3, "selector": {"matchLabels": {"app": "web"}}, "template": {"spec": {"containers": [{"name": "web"}]}}},
            "status": status,
        })
    }

    #[test]
    fn deployment_states() {
        let h = deployment(&deploy(json!({"observedGeneration": 2, "replicas": 3, "updatedReplicas": 3, "availableReplicas": 3}))).unwrap();
        assert_eq!(h.status, HealthStatusCode::Healthy);

        let h = deployment(&deploy(json!({"observedGeneration": 1}))).unwrap();
        assert_eq!(h.status, HealthStatusCode::Progressing);
        assert!(h.message.contains("generation"));

        let h = deployment(&deploy(json!({"observedGeneration": 2, "replicas": 4, "updatedReplicas": 3, "availableReplicas": 3}))).unwrap();
        assert_eq!(h.message, "Waiting for rollout to finish: 1 old replicas are pending termination...");

        let h = deployment(&deploy(json!({"observedGeneration": 2, "replicas": 3, "updatedReplicas": 3, "availableReplicas": 2}))).unwrap();
        assert_eq!(h.message, "Waiting for rollout to finish: 2 of 3 updated replicas are available...");

        let h = deployment(&deploy(json!({"observedGeneration": 2, "conditions": [
            {"type": "Progressing", "status": "False", "reason": "ProgressDeadlineExceeded"}
        ]}))).unwrap();
        assert_eq!(h.status, HealthStatusCode::Degraded);
    }

    #[test]
    fn paused_deployment_is_suspended() {
        let mut d = deploy(json!({}));
        d["spec"]["paused"] = json!(true);
        assert_eq!(deployment(&d).unwrap().status, HealthStatusCode::Suspended);
    }

    fn sts(spec_extra: Json, status: Json) -> Json {
        let mut spec = json!({"replicas": 3, "serviceName": "db", "selector": {}, "template": {}});
        if let (Some(s), Some(extra)) = (spec.as_object_mut(), spec_extra.as_object()) {
            s.extend(extra.clone());
        }
        json!({"apiVersion": "apps/v1", "kind": "StatefulSet", "metadata": {"name": "db", "generation": 1}, "spec": spec, "status": status})
    }

    #[test]
    fn statefulset_states() {
        let h = stateful_set(&sts(json!({}), json!({"replicas": 3}))).unwrap();
        assert_eq!(h.message, "Waiting for statefulset spec update to be observed...");

        let h = stateful_set(&sts(json!({}), json!({"replicas": 3, "observedGeneration": 1, "readyReplicas": 1}))).unwrap();
        assert_eq!(h.message, "Waiting for 2 pods to be ready...");

        let partitioned = json!({"updateStrategy": {"type": "RollingUpdate", "rollingUpdate": {"partition": 2}}});
        let h = stateful_set(&sts(partitioned.clone(), json!({"replicas": 3, "observedGeneration": 1, "readyReplicas": 3}))).unwrap();
        assert_eq!(h.status, HealthStatusCode::Progressing);
        let h = stateful_set(&sts(partitioned, json!({"replicas": 3, "observedGeneration": 1, "readyReplicas": 3, "updatedReplicas": 1}))).unwrap();
        assert_eq!(h.status, HealthStatusCode::Healthy);
        assert!(h.message.starts_with("partitioned roll out complete"));

        let h = stateful_set(&sts(json!({}), json!({"replicas": 3, "observedGeneration": 1, "readyReplicas": 3,
            "currentRevision": "db-1", "updateRevision": "db-2", "updatedReplicas": 1}))).unwrap();
        assert_eq!(h.status, HealthStatusCode::Progressing);
        let h = stateful_set(&sts(json!({}), json!({"replicas": 3, "observedGeneration": 1, "readyReplicas": 3,
            "currentRevision": "db-2", "updateRevision": "db-2", "currentReplicas": 3}))).unwrap();
        assert_eq!(h.message, "statefulset rolling update complete 3 pods at revision db-2...");
    }

    #[test]
    fn daemonset_and_replicaset() {
        let ds = |updated: i32, available: i32| json!({
            "apiVersion": "apps/v1", "kind": "DaemonSet", "metadata": {"name": "agent", "generation": 1},
            "status": {"observedGeneration": 1, "currentNumberScheduled": 2, "desiredNumberScheduled": 2,
                "numberMisscheduled": 0, "numberReady": available, "updatedNumberScheduled": updated, "numberAvailable": available}
        });
        assert_eq!(daemon_set(&ds(2, 2)).unwrap().status, HealthStatusCode::Healthy);
        assert!(daemon_set(&ds(1, 2)).unwrap().message.contains("1 out of 2 new pods"));
        assert!(daemon_set(&ds(2, 1)).unwrap().message.contains("1 of 2 updated pods"));

        let rs = |status: Json| json!({
            "apiVersion": "apps/v1", "kind": "ReplicaSet", "metadata": {"name": "web-1"},
            "spec": {"replicas": 2, "selector": {}}, "status": status
        });
        assert_eq!(replica_set(&rs(json!({"replicas": 2, "availableReplicas": 2}))).unwrap().status, HealthStatusCode::Healthy);
        assert_eq!(replica_set(&rs(json!({"replicas": 2, "availableReplicas": 1}))).unwrap().status, HealthStatusCode::Progressing);
        let h = replica_set(&rs(json!({"replicas": 0, "conditions": [
            {"type": "ReplicaFailure", "status": "True", "message": "quota exceeded"}
        ]}))).unwrap();
        assert_eq!(h, HealthStatus::degraded("quota exceeded"));
    }

    #[test]
    fn conversion_error_surfaces() {
        let bad = json!({"apiVersion": "apps/v1", "kind": "Deployment", "spec": {"replicas": "three"}});
        assert!(deployment(&bad).is_err());
    }
}
