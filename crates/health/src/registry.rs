use anyhow::Result;
use drydock_core::{HealthStatus, Json};
use rustc_hash::FxHashMap;

use crate::builtin;

/// Pure health check for one kind. Errors mean the document could not be read as that kind.
pub type HealthFn = fn(&Json) -> Result<HealthStatus>;

/// `(group, kind)` to health check. Built explicitly; there is no global registration.
#[derive(Clone, Default)]
pub struct HealthRegistry {
    funcs: FxHashMap<(String, String), HealthFn>,
}

impl HealthRegistry {
    pub fn new() -> Self { Self::default() }

    /// Registry with every built-in check.
    pub fn builtin() -> Self {
        let mut r = Self::new();
        for group in ["apps", "extensions"] {
            r.register(group, "Deployment", builtin::apps::deployment);
            r.register(group, "StatefulSet", builtin::apps::stateful_set);
            r.register(group, "DaemonSet", builtin::apps::daemon_set);
            r.register(group, "ReplicaSet", builtin::apps::replica_set);
        }
        r.register("batch", "Job", builtin::batch::job);
        r.register("", "Pod", builtin::pod::pod);
        r.register("", "Service", builtin::kinds::service);
        r.register("", "PersistentVolumeClaim", builtin::kinds::pvc);
        r.register("extensions", "Ingress", builtin::kinds::ingress);
        r.register("networking.k8s.io", "Ingress", builtin::kinds::ingress);
        r.register("apiregistration.k8s.io", "APIService", builtin::kinds::api_service);
        r.register(builtin::APPLICATION_GROUP, builtin::APPLICATION_KIND, builtin::crd::application);
        r.register("argoproj.io", "Workflow", builtin::crd::workflow);
        r
    }

    /// Adds or replaces the check for a group/kind.
    pub fn register(&mut self, group: &str, kind: &str, f: HealthFn) {
        self.funcs.insert((group.to_string(), kind.to_string()), f);
    }

    pub fn get(&self, group: &str, kind: &str) -> Option<HealthFn> {
        self.funcs.get(&(group.to_string(), kind.to_string())).copied()
    }

    pub fn len(&self) -> usize { self.funcs.len() }
    pub fn is_empty(&self) -> bool { self.funcs.is_empty() }
}

impl std::fmt::Debug for HealthRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.funcs.keys().map(|(g, k)| format!("{g}/{k}")).collect();
        keys.sort();
        f.debug_struct("HealthRegistry").field("kinds", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drydock_core::HealthStatusCode;

    #[test]
    fn builtin_covers_both_ingress_groups() {
        let r = HealthRegistry::builtin();
        assert!(r.get("extensions", "Ingress").is_some());
        assert!(r.get("networking.k8s.io", "Ingress").is_some());
        assert!(r.get("", "ConfigMap").is_none());
        assert!(r.get("apps", "Pod").is_none());
    }

    #[test]
    fn register_replaces() {
        fn always_suspended(_: &Json) -> Result<HealthStatus> {
            Ok(HealthStatus::new(HealthStatusCode::Suspended, "frozen"))
        }
        let mut r = HealthRegistry::builtin();
        let before = r.len();
        r.register("", "Service", always_suspended);
        assert_eq!(r.len(), before);
        let f = r.get("", "Service").unwrap();
        assert_eq!(f(&serde_json::json!({})).unwrap().status, HealthStatusCode::Suspended);
    }
}
