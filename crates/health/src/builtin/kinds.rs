//! Service, storage and networking kinds.

use anyhow::Result;
use drydock_core::{HealthStatus, HealthStatusCode, Json};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1::APIService;

use super::typed;

pub fn service(obj: &Json) -> Result<HealthStatus> {
    let svc: Service = typed(obj)?;
    let is_lb = svc.spec.as_ref().and_then(|s| s.type_.as_deref()) == Some("LoadBalancer");
    if !is_lb {
        return Ok(HealthStatus::healthy());
    }
    let assigned = svc
        .status
        .and_then(|s| s.load_balancer)
        .and_then(|lb| lb.ingress)
        .map_or(false, |i| !i.is_empty());
    Ok(if assigned { HealthStatus::healthy() } else { HealthStatus::progressing("") })
}

pub fn pvc(obj: &Json) -> Result<HealthStatus> {
    let claim: PersistentVolumeClaim = typed(obj)?;
    let phase = claim.status.and_then(|s| s.phase).unwrap_or_default();
    let code = match phase.as_str() {
        "Bound" => HealthStatusCode::Healthy,
        "Pending" => HealthStatusCode::Progressing,
        "Lost" => HealthStatusCode::Degraded,
        _ => HealthStatusCode::Unknown,
    };
    Ok(HealthStatus::new(code, ""))
}

pub fn ingress(obj: &Json) -> Result<HealthStatus> {
    let ing: Ingress = typed(obj)?;
    let assigned = ing
        .status
        .and_then(|s| s.load_balancer)
        .and_then(|lb| lb.ingress)
        .map_or(false, |i| !i.is_empty());
    Ok(if assigned { HealthStatus::healthy() } else { HealthStatus::progressing("") })
}

pub fn api_service(obj: &Json) -> Result<HealthStatus> {
    let svc: APIService = typed(obj)?;
    let conditions = svc.status.and_then(|s| s.conditions).unwrap_or_default();
    let Some(c) = conditions.iter().find(|c| c.type_ == "Available") else {
        return Ok(HealthStatus::progressing("Waiting to be processed"));
    };
    let message = format!("{}: {}", c.reason.as_deref().unwrap_or(""), c.message.as_deref().unwrap_or(""));
    let code = if c.status == "True" { HealthStatusCode::Healthy } else { HealthStatusCode::Progressing };
    Ok(HealthStatus::new(code, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn load_balancer_waits_for_ingress() {
        let mut svc = json!({"apiVersion": "v1", "kind": "Service", "metadata": {"name": "lb"}, "spec": {"type": "LoadBalancer"}});
        assert_eq!(service(&svc).unwrap().status, HealthStatusCode::Progressing);
        svc["status"] = json!({"loadBalancer": {"ingress": [{"ip": "10.0.0.1"}]}});
        assert_eq!(service(&svc).unwrap().status, HealthStatusCode::Healthy);
        let cluster_ip = json!({"apiVersion": "v1", "kind": "Service", "metadata": {"name": "c"}, "spec": {"type": "ClusterIP"}});
        assert_eq!(service(&cluster_ip).unwrap().status, HealthStatusCode::Healthy);
    }

    #[test]
    fn pvc_phases() {
        for (phase, want) in [
            ("Bound", HealthStatusCode::Healthy),
            ("Pending", HealthStatusCode::Progressing),
            ("Lost", HealthStatusCode::Degraded),
            ("Weird", HealthStatusCode::Unknown),
        ] {
            let claim = json!({"apiVersion": "v1", "kind": "PersistentVolumeClaim", "metadata": {"name": "data"}, "status": {"phase": phase}});
            assert_eq!(pvc(&claim).unwrap().status, want, "{phase}");
        }
    }

    #[test]
    fn ingress_reads_old_api_versions() {
        let ing = json!({"apiVersion": "extensions/v1beta1", "kind": "Ingress", "metadata": {"name": "web"},
            "status": {"loadBalancer": {"ingress": [{"hostname": "lb.example.com"}]}}});
        assert_eq!(ingress(&ing).unwrap().status, HealthStatusCode::Healthy);
        let pending = json!({"apiVersion": "networking.k8s.io/v1", "kind": "Ingress", "metadata": {"name": "web"}});
        assert_eq!(ingress(&pending).unwrap().status, HealthStatusCode::Progressing);
    }

    #[test]
    fn api_service_availability() {
        let base = |conditions: Json| json!({"apiVersion": "apiregistration.k8s.io/v1", "kind": "APIService",
            "metadata": {"name": "v1beta1.metrics.k8s.io"}, "status": {"conditions": conditions}});
        let h = api_service(&base(json!([{"type": "Available", "status": "True", "reason": "Passed", "message": "all checks passed"}]))).unwrap();
        assert_eq!(h, HealthStatus::new(HealthStatusCode::Healthy, "Passed: all checks passed"));
        let h = api_service(&base(json!([{"type": "Available", "status": "False", "reason": "MissingEndpoints"}]))).unwrap();
        assert_eq!(h.status, HealthStatusCode::Progressing);
        let h = api_service(&base(json!([]))).unwrap();
        assert_eq!(h.message, "Waiting to be processed");
    }
}
