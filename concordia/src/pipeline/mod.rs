//! Pipeline coordinator: "get aligned images" as one call.
//!
//! Composes the cache gate with an [`Aligner`]. The default aligner is the
//! feature-based [`Registrator`]; tests and callers with their own alignment
//! plug in anything implementing the trait.


use std::path::Path;

use crate::cache::{CacheGate, CacheResolution, CacheValidation};
use crate::error::Result;
use crate::raster::Image;
use crate::registration::{Aligner, RegistrationConfig, Registrator};

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub validation: CacheValidation,
    pub registration: RegistrationConfig,
}

impl PipelineConfig {
    pub fn validate(&self) {
        self.registration.validate();
    }
}

/// Cache gate plus aligner.
#[derive(Debug)]
pub struct Pipeline<A: Aligner = Registrator> {
    gate: CacheGate,
    aligner: A,
}

impl Pipeline<Registrator> {
    pub fn new(config: PipelineConfig) -> Self {
        config.validate();
        Self::with_aligner(config.validation, Registrator::new(config.registration))
    }
}

impl Default for Pipeline<Registrator> {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl<A: Aligner> Pipeline<A> {
    pub fn with_aligner(validation: CacheValidation, aligner: A) -> Self {
        Self {
            gate: CacheGate::new(validation),
            aligner,
        }
    }

    pub fn aligner(&self) -> &A {
        &self.aligner
    }

    /// Aligned frames together with where they came from and, when
    /// computed, the per-frame reports.
    pub fn resolve(
        &self,
        images: Vec<Image>,
        from_cache: bool,
        cache_dir: Option<&Path>,
    ) -> Result<CacheResolution> {
        let frames = images.len();
        let resolution = self.gate.resolve(images, from_cache, cache_dir, &self.aligner)?;
        tracing::info!(
            frames,
            output = resolution.images.len(),
            outcome = ?resolution.outcome,
            "Aligned images ready"
        );
        Ok(resolution)
    }

    pub fn get_aligned_images(
        &self,
        images: Vec<Image>,
        from_cache: bool,
        cache_dir: Option<&Path>,
    ) -> Result<Vec<Image>> {
        Ok(self.resolve(images, from_cache, cache_dir)?.images)
    }
}

/// Align `images` with the default registrator, going through the cache at
/// `cache_dir` when one is given.
pub fn get_aligned_images(
    images: Vec<Image>,
    from_cache: bool,
    cache_dir: Option<&Path>,
) -> Result<Vec<Image>> {
    Pipeline::<Registrator>::default().get_aligned_images(images, from_cache, cache_dir)
}
