//! Drydock health: per-resource health verdicts and the application aggregate.
//!
//! Lookup order for one resource: pending deletion, a configured health script, the built-in
//! check for its group/kind, then the generic `status.status` shape. Resources matching none of
//! these have no health and do not count toward the aggregate.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use drydock_core::doc;
use drydock_core::{is_worse, HealthStatus, HealthStatusCode, Json, ResourceOverride, ResourceStatus};
use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};

pub mod builtin;
pub mod registry;
pub mod script;

pub use registry::{HealthFn, HealthRegistry};
pub use script::{HealthScriptEvaluator, LuaHealthEvaluator, ScriptOverrides};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HealthError {
    #[error("resource statuses ({statuses}) and live objects ({lives}) have mismatched lengths")]
    LengthMismatch { statuses: usize, lives: usize },
}

/// Health verdicts for live objects. Holds no mutable state and can be shared between threads.
#[derive(Clone)]
pub struct HealthAssessor {
    registry: HealthRegistry,
    scripts: ScriptOverrides,
    evaluator: Arc<dyn HealthScriptEvaluator>,
}

impl Default for HealthAssessor {
    fn default() -> Self { Self::new(HealthRegistry::builtin(), BTreeMap::new()) }
}

impl HealthAssessor {
    pub fn new(registry: HealthRegistry, overrides: BTreeMap<String, ResourceOverride>) -> Self {
        Self { registry, scripts: ScriptOverrides::new(overrides), evaluator: Arc::new(LuaHealthEvaluator::default()) }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn HealthScriptEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn registry(&self) -> &HealthRegistry { &self.registry }

    /// `None` when the kind has no notion of health.
    pub fn get_resource_health(&self, obj: &Json) -> Option<HealthStatus> {
        if doc::deletion_timestamp(obj).is_some() {
            return Some(HealthStatus::progressing("Pending deletion"));
        }
        let gvk = doc::gvk(obj);
        let (group, kind) = (gvk.group.as_str(), gvk.kind.as_str());

        if let Some((script, open_libs)) = self.scripts.script_for(group, kind) {
            counter!("health_script_eval_total", 1u64);
            match self.evaluator.evaluate(script, obj, open_libs) {
                Ok(Some(h)) => return Some(h),
                Ok(None) => debug!(group = %group, kind = %kind, "health script gave no verdict"),
                Err(e) => return Some(unknown(obj, e)),
            }
        }

        if let Some(f) = self.registry.get(group, kind) {
            return Some(f(obj).unwrap_or_else(|e| unknown(obj, e)));
        }
        generic_status(obj)
    }

    /// Writes each resource's health into `statuses` and returns the application's aggregate.
    pub fn set_application_health(&self, statuses: &mut [ResourceStatus], lives: &[Option<Json>]) -> Result<HealthStatus, HealthError> {
        self.set_application_health_filtered(statuses, lives, |_| true)
    }

    /// As [`Self::set_application_health`], assessing only live objects accepted by `filter`.
    /// Rejected objects keep their previous health and are left out of the aggregate.
    pub fn set_application_health_filtered(
        &self,
        statuses: &mut [ResourceStatus],
        lives: &[Option<Json>],
        filter: impl Fn(&Json) -> bool,
    ) -> Result<HealthStatus, HealthError> {
        if statuses.len() != lives.len() {
            return Err(HealthError::LengthMismatch { statuses: statuses.len(), lives: lives.len() });
        }
        let mut app = HealthStatus::healthy();
        for (status, live) in statuses.iter_mut().zip(lives) {
            let health = match live {
                None => Some(HealthStatus::new(HealthStatusCode::Missing, "")),
                Some(obj) if filter(obj) => self.get_resource_health(obj),
                Some(_) => None,
            };
            let Some(health) = health else { continue };
            let excluded = live.as_ref().map_or(false, |obj| excluded_from_aggregate(obj, &health));
            if !excluded && is_worse(app.status, health.status) {
                app.status = health.status;
            }
            status.health = Some(health);
        }
        Ok(app)
    }
}

fn unknown(obj: &Json, e: anyhow::Error) -> HealthStatus {
    counter!("health_unknown_total", 1u64);
    warn!(kind = %doc::kind(obj), name = %doc::name(obj), error = %e, "health check failed");
    HealthStatus::new(HealthStatusCode::Unknown, e.to_string())
}

/// Hooks, ignored resources and child applications that have not reported yet.
fn excluded_from_aggregate(obj: &Json, health: &HealthStatus) -> bool {
    if doc::is_hook(obj) || doc::is_ignored(obj) {
        return true;
    }
    doc::group(obj) == builtin::APPLICATION_GROUP
        && doc::kind(obj) == builtin::APPLICATION_KIND
        && matches!(health.status, HealthStatusCode::Missing | HealthStatusCode::Unknown)
}

/// Kinds without a dedicated check that still expose `status.status`.
fn generic_status(obj: &Json) -> Option<HealthStatus> {
    let status = obj.get("status")?;
    let code = match status.get("status")?.as_str()? {
        "Pending" | "Running" => HealthStatusCode::Progressing,
        "Successful" => HealthStatusCode::Healthy,
        "Failed" | "Error" => HealthStatusCode::Degraded,
        "Inconclusive" => HealthStatusCode::Suspended,
        _ => return None,
    };
    let message = status.get("message").and_then(|m| m.as_str()).unwrap_or("");
    Some(HealthStatus::new(code, message))
}
