use std::collections::BTreeMap;
use std::sync::Arc;

use drydock_core::{ResourceIgnoreDifferences, ResourceOverride, Settings, TrackingMethod};
use tracing::Span;

use crate::cache::AppStateCache;
use crate::DiffError;

/// Validated inputs of a diff run. Build one with [`DiffConfigBuilder`].
#[derive(Clone)]
pub struct DiffConfig {
    ignores: Vec<ResourceIgnoreDifferences>,
    overrides: BTreeMap<String, ResourceOverride>,
    app_label_key: String,
    tracking_method: TrackingMethod,
    app_name: String,
    no_cache: bool,
    state_cache: Option<Arc<dyn AppStateCache>>,
    ignore_aggregated_roles: bool,
    span: Span,
}

impl DiffConfig {
    pub fn ignores(&self) -> &[ResourceIgnoreDifferences] { &self.ignores }
    pub fn overrides(&self) -> &BTreeMap<String, ResourceOverride> { &self.overrides }
    pub fn app_label_key(&self) -> &str { &self.app_label_key }
    pub fn tracking_method(&self) -> TrackingMethod { self.tracking_method }
    pub fn app_name(&self) -> &str { &self.app_name }
    pub fn no_cache(&self) -> bool { self.no_cache }
    pub fn state_cache(&self) -> Option<&Arc<dyn AppStateCache>> { self.state_cache.as_ref() }
    pub fn ignore_aggregated_roles(&self) -> bool { self.ignore_aggregated_roles }
    pub fn span(&self) -> &Span { &self.span }

    pub fn validate(&self) -> Result<(), DiffError> {
        if !self.no_cache {
            if self.app_name.is_empty() {
                return Err(DiffError::Config("AppName can not be empty when the cache is enabled".into()));
            }
            if self.state_cache.is_none() {
                return Err(DiffError::Config("StateCache can not be unset when the cache is enabled".into()));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for DiffConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffConfig")
            .field("ignores", &self.ignores.len())
            .field("overrides", &self.overrides.len())
            .field("app_label_key", &self.app_label_key)
            .field("tracking_method", &self.tracking_method)
            .field("app_name", &self.app_name)
            .field("no_cache", &self.no_cache)
            .field("state_cache", &self.state_cache.is_some())
            .field("ignore_aggregated_roles", &self.ignore_aggregated_roles)
            .finish()
    }
}

#[derive(Default)]
pub struct DiffConfigBuilder {
    ignores: Option<Vec<ResourceIgnoreDifferences>>,
    overrides: Option<BTreeMap<String, ResourceOverride>>,
    tracking: Option<(String, TrackingMethod)>,
    app_name: String,
    no_cache: bool,
    state_cache: Option<Arc<dyn AppStateCache>>,
    ignore_aggregated_roles: bool,
    span: Option<Span>,
}

impl DiffConfigBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn with_diff_settings(
        mut self,
        ignores: Vec<ResourceIgnoreDifferences>,
        overrides: BTreeMap<String, ResourceOverride>,
        ignore_aggregated_roles: bool,
    ) -> Self {
        self.ignores = Some(ignores);
        self.overrides = Some(overrides);
        self.ignore_aggregated_roles = ignore_aggregated_roles;
        self
    }

    pub fn with_tracking(mut self, app_label_key: &str, method: TrackingMethod) -> Self {
        self.tracking = Some((app_label_key.to_string(), method));
        self
    }

    /// Tracking key, method and role aggregation taken from process settings.
    pub fn with_settings(self, settings: &Settings) -> Self {
        let aggregated = settings.ignore_aggregated_roles;
        let mut b = self.with_tracking(&settings.app_label_key, settings.tracking_method);
        b.ignore_aggregated_roles = aggregated;
        b
    }

    pub fn with_no_cache(mut self) -> Self {
        self.no_cache = true;
        self.state_cache = None;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn AppStateCache>, app_name: &str) -> Self {
        self.no_cache = false;
        self.state_cache = Some(cache);
        self.app_name = app_name.to_string();
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> Result<DiffConfig, DiffError> {
        let ignores = self.ignores.ok_or_else(|| DiffError::Config("ResourceIgnoreDifferences can not be unset".into()))?;
        let overrides = self.overrides.ok_or_else(|| DiffError::Config("ResourceOverrides can not be unset".into()))?;
        let (app_label_key, tracking_method) =
            self.tracking.ok_or_else(|| DiffError::Config("tracking method can not be unset".into()))?;
        let cfg = DiffConfig {
            ignores,
            overrides,
            app_label_key,
            tracking_method,
            app_name: self.app_name,
            no_cache: self.no_cache,
            state_cache: self.state_cache,
            ignore_aggregated_roles: self.ignore_aggregated_roles,
            span: self.span.unwrap_or_else(Span::current),
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryStateCache;

    fn base() -> DiffConfigBuilder {
        DiffConfigBuilder::new()
            .with_diff_settings(vec![], BTreeMap::new(), false)
            .with_tracking("app.kubernetes.io/instance", TrackingMethod::Annotation)
    }

    #[test]
    fn missing_pieces_fail() {
        let err = DiffConfigBuilder::new().with_no_cache().build().unwrap_err();
        assert!(err.to_string().contains("ResourceIgnoreDifferences"));
        let err = DiffConfigBuilder::new()
            .with_diff_settings(vec![], BTreeMap::new(), false)
            .with_no_cache()
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("tracking"));
    }

    #[test]
    fn cache_needs_app_and_store() {
        let err = base().build().unwrap_err();
        assert!(matches!(err, DiffError::Config(_)));
        let err = base().with_cache(Arc::new(InMemoryStateCache::new()), "").build().unwrap_err();
        assert!(err.to_string().contains("AppName"));
        assert!(base().with_cache(Arc::new(InMemoryStateCache::new()), "guestbook").build().is_ok());
        assert!(base().with_no_cache().build().is_ok());
    }

    #[test]
    fn settings_carry_over() {
        let s = Settings { ignore_aggregated_roles: true, tracking_method: TrackingMethod::Label, ..Settings::default() };
        let cfg = DiffConfigBuilder::new()
            .with_diff_settings(vec![], BTreeMap::new(), false)
            .with_settings(&s)
            .with_no_cache()
            .build()
            .unwrap();
        assert!(cfg.ignore_aggregated_roles());
        assert_eq!(cfg.tracking_method(), TrackingMethod::Label);
        assert_eq!(cfg.app_label_key(), "app.kubernetes.io/instance");
    }
}
