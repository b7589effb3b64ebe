//! Drydock diff: decides whether live cluster state has drifted from the desired manifests.
//!
//! Inputs are normalized for tracking migration, trusted field managers, ignore rules and known
//! field types, then compared. Results for unchanged live objects can be reused from the
//! application's cached diff rows.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use drydock_core::{DiffResult, DiffResultList, Json, ResourceDiff, ResourceKey};
use drydock_tracking::TrackingError;
use metrics::{counter, histogram};
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, error};

pub mod cache;
pub mod compare;
pub mod config;
pub mod ignore;
pub mod jq;
pub mod managed_fields;
pub mod normalize;

pub use cache::{AppStateCache, InMemoryStateCache};
pub use compare::{diff, diff_array, DiffOptions};
pub use config::{DiffConfig, DiffConfigBuilder};
pub use ignore::IgnoreDiffConfig;
pub use normalize::{ChainNormalizer, IgnoreNormalizer, KnownTypesNormalizer, Normalizer};

#[derive(Debug, Error)]
pub enum DiffError {
    #[error("diffConfig validation error: {0}")]
    Config(String),
    #[error("left and right arrays have mismatched lengths")]
    LengthMismatch,
    #[error("normalizer: {0}")]
    Normalizer(String),
    #[error("diff: {0}")]
    Compute(String),
    #[error("expected 1 diff result, got {0}")]
    UnexpectedCount(usize),
    #[error(transparent)]
    Tracking(#[from] TrackingError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Diff one desired/live pair.
pub fn state_diff(live: Option<&Json>, target: Option<&Json>, config: &DiffConfig) -> Result<DiffResult, DiffError> {
    let lives = [live.cloned()];
    let targets = [target.cloned()];
    let mut res = state_diffs(&lives, &targets, config)?;
    match res.diffs.len() {
        1 => Ok(res.diffs.remove(0)),
        n => Err(DiffError::UnexpectedCount(n)),
    }
}

/// Diff aligned arrays of live and desired objects; `None` marks an absent side.
pub fn state_diffs(lives: &[Option<Json>], targets: &[Option<Json>], config: &DiffConfig) -> Result<DiffResultList, DiffError> {
    config.validate()?;
    if lives.len() != targets.len() { return Err(DiffError::LengthMismatch); }
    let _enter = config.span().enter();

    let (lives, targets) = pre_normalize(lives, targets, config)?;
    let opts = diff_options(config)?;

    let cached = if config.no_cache() { None } else { cached_rows(config) };
    let Some(cached) = cached else {
        return timed(|| diff_array(&targets, &lives, &opts));
    };

    let mut out = DiffResultList::default();
    for (live, target) in lives.iter().zip(&targets) {
        let Some(key) = live.as_ref().or(target.as_ref()).map(ResourceKey::from_doc) else {
            return Err(DiffError::Compute("both live and config are null objects".into()));
        };
        let live_rv = live.as_ref().map(drydock_core::doc::resource_version).unwrap_or("");
        match cached.get(&key) {
            Some(row) if row.resource_version == live_rv => {
                counter!("diff_cache_hit_total", 1u64);
                debug!(resource = %key, rv = %live_rv, "reusing cached diff");
                out.push(row.to_result());
            }
            _ => {
                counter!("diff_cache_miss_total", 1u64);
                out.push(timed(|| diff(target.as_ref(), live.as_ref(), &opts))?);
            }
        }
    }
    Ok(out)
}

type Pairs = (Vec<Option<Json>>, Vec<Option<Json>>);

/// Deep copies with tracking migration and trusted managed fields applied. Inputs stay untouched.
fn pre_normalize(lives: &[Option<Json>], targets: &[Option<Json>], config: &DiffConfig) -> Result<Pairs, DiffError> {
    let mut lives = lives.to_vec();
    let mut targets = targets.to_vec();
    let ignore = IgnoreDiffConfig::new(config.ignores(), config.overrides());
    for (live, target) in lives.iter_mut().zip(targets.iter_mut()) {
        drydock_tracking::normalize(target.as_ref(), live.as_mut(), config.app_label_key(), config.tracking_method())?;
        let (Some(live), Some(target)) = (live.as_ref(), target.as_mut()) else { continue };
        let key = ResourceKey::from_doc(target);
        let Some(rule) = ignore.has_ignore_difference_for(&key.group, &key.kind, &key.name, &key.namespace) else { continue };
        if rule.managed_fields_managers.is_empty() { continue; }
        managed_fields::normalize(live, target, &rule.managed_fields_managers)
            .map_err(|e| DiffError::Normalizer(format!("managed fields of {key}: {e}")))?;
    }
    Ok((lives, targets))
}

fn diff_options(config: &DiffConfig) -> Result<DiffOptions, DiffError> {
    let chain = ChainNormalizer::new()
        .with(IgnoreNormalizer::new(config.ignores(), config.overrides())?)
        .with(KnownTypesNormalizer::new(config.overrides())?);
    Ok(DiffOptions { normalizer: Some(Arc::new(chain)), ignore_aggregated_roles: config.ignore_aggregated_roles() })
}

fn cached_rows(config: &DiffConfig) -> Option<FxHashMap<ResourceKey, ResourceDiff>> {
    let cache = config.state_cache()?;
    match cache.get_app_managed_resources(config.app_name()) {
        Ok(rows) => Some(rows.into_iter().map(|r| (r.key(), r)).collect()),
        Err(e) => {
            error!(app = %config.app_name(), error = %e, "failed to read cached diffs; computing without cache");
            None
        }
    }
}

fn timed<T>(f: impl FnOnce() -> T) -> T {
    let t0 = Instant::now();
    let out = f();
    histogram!("diff_compute_ms", t0.elapsed().as_secs_f64() * 1000.0);
    out
}
