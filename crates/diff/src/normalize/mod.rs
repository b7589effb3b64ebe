//! Normalizers applied to both sides of a comparison before diffing.

use drydock_core::Json;

pub mod builtin;
pub mod ignore;
pub mod known_types;

pub use ignore::IgnoreNormalizer;
pub use known_types::KnownTypesNormalizer;

pub trait Normalizer: Send + Sync {
    fn normalize(&self, doc: &mut Json) -> anyhow::Result<()>;
}

/// Runs each normalizer in order, stopping at the first error.
#[derive(Default)]
pub struct ChainNormalizer {
    inner: Vec<Box<dyn Normalizer>>,
}

impl ChainNormalizer {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, n: impl Normalizer + 'static) -> Self {
        self.inner.push(Box::new(n));
        self
    }
}

impl Normalizer for ChainNormalizer {
    fn normalize(&self, doc: &mut Json) -> anyhow::Result<()> {
        for n in &self.inner { n.normalize(doc)?; }
        Ok(())
    }
}
