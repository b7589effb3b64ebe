use anyhow::{anyhow, Result};
use drydock_core::ResourceDiff;
use rustc_hash::FxHashMap;

/// Read access to previously computed diff rows of an application.
pub trait AppStateCache: Send + Sync {
    fn get_app_managed_resources(&self, app_name: &str) -> Result<Vec<ResourceDiff>>;
}

/// Snapshot of cached rows handed in by the caller.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStateCache {
    apps: FxHashMap<String, Vec<ResourceDiff>>,
}

impl InMemoryStateCache {
    pub fn new() -> Self { Self::default() }

    pub fn with_app(mut self, app_name: &str, rows: Vec<ResourceDiff>) -> Self {
        self.insert(app_name, rows);
        self
    }

    pub fn insert(&mut self, app_name: &str, rows: Vec<ResourceDiff>) {
        self.apps.insert(app_name.to_string(), rows);
    }
}

impl AppStateCache for InMemoryStateCache {
    fn get_app_managed_resources(&self, app_name: &str) -> Result<Vec<ResourceDiff>> {
        self.apps.get(app_name).cloned().ok_or_else(|| anyhow!("cache miss for application {app_name}"))
    }
}
