//! Cache gate: reuse previously aligned frames or compute and persist them.
//!
//! A cache directory holds the output of one alignment run as
//! `img_000.png`, `img_001.png`, ... The gate decides, per call, whether the
//! directory can stand in for running the aligner. How much it trusts the
//! directory is set by [`CacheValidation`]:
//!
//! - [`CacheValidation::TrustNonEmpty`] - any non-empty directory is a hit
//! - [`CacheValidation::FrameCount`] - the decodable cached frames must
//!   number exactly as many as the input frames
//! - [`CacheValidation::Fingerprint`] - a `cache_manifest.json` written
//!   next to the frames must match a hash of the input and the aligner
//!   parameters
//!
//! Missing or empty directories are misses, never errors. Only failures to
//! persist freshly computed frames reach the caller.

mod manifest;


pub use manifest::{CacheManifest, MANIFEST_FILE, fingerprint};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use common::file_utils::{is_non_empty_dir, sorted_files};

use crate::error::Result;
use crate::raster::Image;
use crate::registration::{Aligner, FrameReport};
use crate::store;

/// How much a non-empty cache directory is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheValidation {
    /// Any non-empty directory is a valid cache.
    #[default]
    TrustNonEmpty,
    /// Valid when it decodes to as many frames as the input has.
    FrameCount,
    /// Valid when its manifest matches the input and aligner parameters.
    Fingerprint,
}

/// Where the returned frames came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Loaded from the cache directory, the aligner did not run.
    Hit,
    /// No usable directory (or caching not requested), frames computed.
    Miss,
    /// The directory was populated but failed validation, frames recomputed.
    Invalidated,
}

#[derive(Debug, Clone)]
pub struct CacheResolution {
    pub images: Vec<Image>,
    pub outcome: CacheOutcome,
    /// Per-frame alignment reports. Empty on a cache hit.
    pub reports: Vec<FrameReport>,
}

/// Cache gate with a fixed validation mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheGate {
    validation: CacheValidation,
}

impl CacheGate {
    pub fn new(validation: CacheValidation) -> Self {
        Self { validation }
    }

    pub fn validation(&self) -> CacheValidation {
        self.validation
    }

    /// Return aligned frames for `images`.
    ///
    /// With `from_cache` set and a non-empty `cache_dir` that passes
    /// validation, the cached frames are returned and `aligner` is not
    /// called. Otherwise `aligner` runs and, when `cache_dir` is given, its
    /// output is written there (the directory is created if needed).
    pub fn resolve(
        &self,
        images: Vec<Image>,
        from_cache: bool,
        cache_dir: Option<&Path>,
        aligner: &dyn Aligner,
    ) -> Result<CacheResolution> {
        let fingerprint = match self.validation {
            CacheValidation::Fingerprint => {
                Some(manifest::fingerprint(&images, &aligner.parameters()))
            }
            _ => None,
        };

        let mut outcome = CacheOutcome::Miss;
        if let Some(dir) = cache_dir.filter(|dir| from_cache && is_non_empty_dir(dir)) {
            match self.load(dir, images.len(), fingerprint.as_deref()) {
                Some(cached) => {
                    tracing::info!(
                        cache_dir = %dir.display(),
                        frames = cached.len(),
                        "Using cached aligned images"
                    );
                    return Ok(CacheResolution {
                        images: cached,
                        outcome: CacheOutcome::Hit,
                        reports: Vec::new(),
                    });
                }
                None => {
                    tracing::info!(
                        cache_dir = %dir.display(),
                        validation = ?self.validation,
                        "Cached images are stale, recomputing"
                    );
                    outcome = CacheOutcome::Invalidated;
                }
            }
        } else {
            tracing::debug!(from_cache, "No usable cache, aligning");
        }

        let aligned = aligner.align(images);
        if let Some(dir) = cache_dir {
            persist(dir, &aligned.images, fingerprint)?;
        }

        Ok(CacheResolution {
            images: aligned.images,
            outcome,
            reports: aligned.reports,
        })
    }

    fn load(&self, dir: &Path, expected: usize, fingerprint: Option<&str>) -> Option<Vec<Image>> {
        match self.validation {
            CacheValidation::TrustNonEmpty => Some(read_cached(dir)),
            CacheValidation::FrameCount => {
                let cached = read_cached(dir);
                if cached.len() != expected {
                    tracing::debug!(cached = cached.len(), expected, "Frame count mismatch");
                    return None;
                }
                Some(cached)
            }
            CacheValidation::Fingerprint => {
                let manifest = CacheManifest::load(dir)?;
                if !manifest.is_consistent() || Some(manifest.fingerprint.as_str()) != fingerprint
                {
                    tracing::debug!(stored = %manifest.fingerprint, "Fingerprint mismatch");
                    return None;
                }
                let files: Vec<PathBuf> =
                    manifest.file_names.iter().map(|name| dir.join(name)).collect();
                let cached = store::read_files(&files, 1.0);
                if cached.len() != manifest.frame_count {
                    tracing::debug!(
                        cached = cached.len(),
                        expected = manifest.frame_count,
                        "Cached frames missing or unreadable"
                    );
                    return None;
                }
                Some(cached)
            }
        }
    }
}

/// [`CacheGate::resolve`] with [`CacheValidation::TrustNonEmpty`].
pub fn resolve(
    images: Vec<Image>,
    from_cache: bool,
    cache_dir: Option<&Path>,
    aligner: &dyn Aligner,
) -> Result<CacheResolution> {
    CacheGate::default().resolve(images, from_cache, cache_dir, aligner)
}

/// Every decodable file in `dir` except the manifest, in file-name order.
fn read_cached(dir: &Path) -> Vec<Image> {
    let files = sorted_files(dir, &[MANIFEST_FILE]);
    store::read_files(&files, 1.0)
}

/// Write `images` into `dir` and leave it describing exactly them.
///
/// The previous manifest goes first so an interrupted write never leaves a
/// manifest vouching for a half-written directory. Sequence files left over
/// from a longer earlier run are removed.
fn persist(dir: &Path, images: &[Image], fingerprint: Option<String>) -> Result<()> {
    remove_if_present(&dir.join(MANIFEST_FILE));
    store::write_all(dir, images)?;

    let file_names: Vec<String> = (0..images.len())
        .map(|i| store::sequence_file_name(i, images.len()))
        .collect();
    for stale in sorted_files(dir, &[MANIFEST_FILE]) {
        let is_stale = stale
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| store::is_sequence_file_name(n) && !file_names.iter().any(|f| f == n));
        if is_stale {
            remove_if_present(&stale);
        }
    }

    if let Some(fingerprint) = fingerprint {
        CacheManifest::new(fingerprint, file_names).save(dir)?;
        tracing::debug!(cache_dir = %dir.display(), "Wrote cache manifest");
    }
    Ok(())
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed stale cache entry"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove stale cache entry"),
    }
}
