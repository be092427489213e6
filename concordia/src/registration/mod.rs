//! Registration engine: aligns a sequence of frames to a reference frame.
//!
//! # Stages
//!
//! 1. **Features** - oriented FAST corners with steered binary descriptors,
//!    computed once for the reference and once per frame
//! 2. **Matching** - Hamming nearest neighbour with ratio test and cross check
//! 3. **RANSAC** - robust transform estimate with local optimization
//! 4. **Warping** - resample the frame into the reference pixel grid
//!
//! Frames are processed in parallel and independently. A frame that cannot
//! be aligned never fails the batch: it is kept or dropped according to
//! [`FallbackPolicy`] and the reason is recorded in its [`FrameReport`].

pub mod config;
pub mod features;
pub mod interpolation;
pub mod ransac;
pub mod transform;

#[cfg(test)]
mod tests;

pub use config::{
    FallbackPolicy, FeatureConfig, InterpolationMethod, MatchConfig, RansacConfig,
    RegistrationConfig,
};
pub use ransac::RansacFailureReason;
pub use transform::{Transform, TransformType};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::CancelFlag;
use glam::DVec2;
use rayon::prelude::*;

use crate::raster::Image;
use features::{FeatureSet, detect_features, match_descriptors};
use interpolation::warp_image;
use ransac::RansacEstimator;

// =============================================================================
// Results
// =============================================================================

/// Why a frame could not be aligned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlignFailure {
    /// Too few keypoints in the frame or in the reference.
    InsufficientFeatures { found: usize, required: usize },
    /// Too few descriptor matches survived filtering.
    InsufficientCorrespondences { found: usize, required: usize },
    /// RANSAC found no acceptable model.
    EstimationFailed {
        reason: RansacFailureReason,
        correspondences: usize,
    },
    /// The model folds, collapses or sends part of the frame to infinity.
    DegenerateTransform,
    /// The inlier fit is too loose to trust.
    AccuracyTooLow { rms_error: f64, max_allowed: f64 },
}

impl std::fmt::Display for AlignFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlignFailure::InsufficientFeatures { found, required } => {
                write!(f, "insufficient features: found {}, need {}", found, required)
            }
            AlignFailure::InsufficientCorrespondences { found, required } => {
                write!(
                    f,
                    "insufficient correspondences: found {}, need {}",
                    found, required
                )
            }
            AlignFailure::EstimationFailed {
                reason,
                correspondences,
            } => write!(
                f,
                "transform estimation failed: {} ({} correspondences)",
                reason, correspondences
            ),
            AlignFailure::DegenerateTransform => write!(f, "degenerate transform"),
            AlignFailure::AccuracyTooLow {
                rms_error,
                max_allowed,
            } => write!(
                f,
                "registration accuracy too low: {:.3} px (max {:.3})",
                rms_error, max_allowed
            ),
        }
    }
}

/// Outcome of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameStatus {
    /// The reference frame, passed through unchanged.
    Reference,
    /// Warped into the reference grid.
    Aligned,
    /// Not aligned; original kept at its index.
    PassedThrough { reason: AlignFailure },
    /// Not aligned; removed from the output.
    Dropped { reason: AlignFailure },
    /// Skipped because the run was cancelled. Kept or removed per the
    /// fallback policy.
    Cancelled,
}

/// Per-frame alignment report. `index` is the frame's input position.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub index: usize,
    pub status: FrameStatus,
    /// Reference-to-frame transform, when one was accepted.
    pub transform: Option<Transform>,
    pub correspondences: usize,
    pub inliers: usize,
    pub rms_error: Option<f64>,
}

impl FrameReport {
    pub(crate) fn bare(index: usize, status: FrameStatus) -> Self {
        Self {
            index,
            status,
            transform: None,
            correspondences: 0,
            inliers: 0,
            rms_error: None,
        }
    }
}

/// Successful registration of one frame against the reference.
#[derive(Debug, Clone)]
pub struct RegistrationResult {
    /// Maps reference pixel coordinates to frame pixel coordinates.
    pub transform: Transform,
    pub correspondences: usize,
    pub inliers: usize,
    pub rms_error: f64,
}

/// Output of [`Aligner::align`]: frames in input order plus one report per
/// input frame.
#[derive(Debug, Clone, Default)]
pub struct AlignedSequence {
    pub images: Vec<Image>,
    pub reports: Vec<FrameReport>,
}

impl AlignedSequence {
    pub fn aligned_count(&self) -> usize {
        self.count(|s| matches!(s, FrameStatus::Aligned))
    }

    pub fn unaligned_count(&self) -> usize {
        self.count(|s| {
            matches!(
                s,
                FrameStatus::PassedThrough { .. }
                    | FrameStatus::Dropped { .. }
                    | FrameStatus::Cancelled
            )
        })
    }

    fn count(&self, pred: impl Fn(&FrameStatus) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.status)).count()
    }
}

// =============================================================================
// Progress
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignStage {
    /// Reference features computed.
    Reference,
    /// A frame finished (aligned or not).
    Frame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignProgress {
    /// Completed steps. Frames finish in any order, so this counts them
    /// rather than naming one.
    pub current: usize,
    pub total: usize,
    pub stage: AlignStage,
}

pub type ProgressCallback = Arc<dyn Fn(AlignProgress) + Send + Sync>;

// =============================================================================
// Aligner
// =============================================================================

/// Anything that turns a frame sequence into an aligned sequence.
pub trait Aligner: Send + Sync {
    fn align(&self, images: Vec<Image>) -> AlignedSequence;

    /// Stable description of everything that affects the output, folded
    /// into cache fingerprints.
    fn parameters(&self) -> String {
        String::new()
    }
}

/// Feature-based registrator.
pub struct Registrator {
    config: RegistrationConfig,
    cancel: Option<CancelFlag>,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for Registrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrator")
            .field("config", &self.config)
            .field("cancellable", &self.cancel.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Default for Registrator {
    fn default() -> Self {
        Self::new(RegistrationConfig::default())
    }
}

impl Registrator {
    pub fn new(config: RegistrationConfig) -> Self {
        config.validate();
        Self {
            config,
            cancel: None,
            progress: None,
        }
    }

    /// Install an abort flag, checked before each frame.
    pub fn with_cancel(mut self, flag: impl Into<CancelFlag>) -> Self {
        self.cancel = Some(flag.into());
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }

    fn report(&self, current: usize, total: usize, stage: AlignStage) {
        if let Some(f) = self.progress.as_ref() {
            f(AlignProgress {
                current,
                total,
                stage,
            });
        }
    }

    fn features(&self, image: &Image) -> FeatureSet {
        detect_features(&image.to_grayscale(), &self.config.features)
    }

    /// Register `target` against `reference`.
    pub fn register(
        &self,
        reference: &Image,
        target: &Image,
    ) -> Result<RegistrationResult, AlignFailure> {
        let ref_features = self.features(reference);
        self.register_against(&ref_features, reference, target)
    }

    fn register_against(
        &self,
        ref_features: &FeatureSet,
        reference: &Image,
        target: &Image,
    ) -> Result<RegistrationResult, AlignFailure> {
        let required = self.config.required_correspondences();
        if ref_features.len() < required {
            return Err(AlignFailure::InsufficientFeatures {
                found: ref_features.len(),
                required,
            });
        }

        let target_features = self.features(target);
        if target_features.len() < required {
            return Err(AlignFailure::InsufficientFeatures {
                found: target_features.len(),
                required,
            });
        }

        let matches = match_descriptors(
            &target_features.descriptors,
            &ref_features.descriptors,
            &self.config.matching,
        );
        if matches.len() < required {
            return Err(AlignFailure::InsufficientCorrespondences {
                found: matches.len(),
                required,
            });
        }

        let (ref_points, target_points): (Vec<DVec2>, Vec<DVec2>) = matches
            .iter()
            .map(|m| {
                (
                    ref_features.keypoints[m.train_idx].position,
                    target_features.keypoints[m.query_idx].position,
                )
            })
            .unzip();

        let estimator = RansacEstimator::new(self.config.ransac.clone());
        let result = estimator
            .estimate(&ref_points, &target_points, self.config.transform_type)
            .map_err(|reason| AlignFailure::EstimationFailed {
                reason,
                correspondences: matches.len(),
            })?;

        if !is_well_formed(&result.transform, reference.width(), reference.height()) {
            return Err(AlignFailure::DegenerateTransform);
        }
        if result.rms_error > self.config.max_rms_error {
            return Err(AlignFailure::AccuracyTooLow {
                rms_error: result.rms_error,
                max_allowed: self.config.max_rms_error,
            });
        }

        Ok(RegistrationResult {
            transform: result.transform,
            correspondences: matches.len(),
            inliers: result.inliers.len(),
            rms_error: result.rms_error,
        })
    }

    fn resolve_reference(&self, len: usize) -> usize {
        let idx = self.config.reference_index;
        if idx < len {
            return idx;
        }
        tracing::warn!(
            reference_index = idx,
            frames = len,
            "Reference index out of range, using frame 0"
        );
        0
    }

    /// Apply the fallback policy to a frame that was not aligned.
    fn fall_back(
        &self,
        index: usize,
        image: Image,
        reason: Option<AlignFailure>,
    ) -> (Option<Image>, FrameReport) {
        let Some(reason) = reason else {
            let kept = match self.config.fallback {
                FallbackPolicy::PassThrough => Some(image),
                FallbackPolicy::Drop => None,
            };
            return (kept, FrameReport::bare(index, FrameStatus::Cancelled));
        };

        tracing::warn!(index, %reason, policy = ?self.config.fallback, "Frame not aligned");
        let (kept, status) = match self.config.fallback {
            FallbackPolicy::PassThrough => (Some(image), FrameStatus::PassedThrough { reason }),
            FallbackPolicy::Drop => (None, FrameStatus::Dropped { reason }),
        };
        let mut report = FrameReport::bare(index, status);
        match reason {
            AlignFailure::InsufficientCorrespondences { found, .. } => {
                report.correspondences = found;
            }
            AlignFailure::EstimationFailed {
                correspondences, ..
            } => report.correspondences = correspondences,
            AlignFailure::AccuracyTooLow { rms_error, .. } => report.rms_error = Some(rms_error),
            _ => {}
        }
        (kept, report)
    }
}

impl Aligner for Registrator {
    fn parameters(&self) -> String {
        format!("{:?}", self.config)
    }

    fn align(&self, images: Vec<Image>) -> AlignedSequence {
        let total = images.len();
        if total == 0 {
            return AlignedSequence::default();
        }

        let ref_idx = self.resolve_reference(total);
        let reference = images[ref_idx].clone();
        let ref_features = self.features(&reference);
        let (ref_width, ref_height) = (reference.width(), reference.height());
        tracing::info!(
            frames = total,
            reference = ref_idx,
            keypoints = ref_features.len(),
            "Aligning frames"
        );
        self.report(0, total, AlignStage::Reference);

        let done = AtomicUsize::new(0);
        let results: Vec<(Option<Image>, FrameReport)> = images
            .into_par_iter()
            .enumerate()
            .map(|(index, image)| {
                let out = if index == ref_idx {
                    (Some(image), FrameReport::bare(index, FrameStatus::Reference))
                } else if self.is_cancelled() {
                    self.fall_back(index, image, None)
                } else {
                    match self.register_against(&ref_features, &reference, &image) {
                        Ok(reg) => {
                            tracing::debug!(
                                index,
                                transform = %reg.transform,
                                inliers = reg.inliers,
                                rms_error = reg.rms_error,
                                "Frame aligned"
                            );
                            let warped = warp_image(
                                &image,
                                ref_width,
                                ref_height,
                                &reg.transform,
                                self.config.interpolation,
                            );
                            let report = FrameReport {
                                index,
                                status: FrameStatus::Aligned,
                                transform: Some(reg.transform),
                                correspondences: reg.correspondences,
                                inliers: reg.inliers,
                                rms_error: Some(reg.rms_error),
                            };
                            (Some(warped), report)
                        }
                        Err(reason) => self.fall_back(index, image, Some(reason)),
                    }
                };
                let current = done.fetch_add(1, Ordering::Relaxed) + 1;
                self.report(current, total, AlignStage::Frame);
                out
            })
            .collect();

        let mut sequence = AlignedSequence {
            images: Vec::with_capacity(total),
            reports: Vec::with_capacity(total),
        };
        for (image, report) in results {
            if let Some(image) = image {
                sequence.images.push(image);
            }
            sequence.reports.push(report);
        }

        tracing::info!(
            frames = total,
            aligned = sequence.aligned_count(),
            unaligned = sequence.unaligned_count(),
            output = sequence.images.len(),
            "Alignment finished"
        );
        sequence
    }
}

/// Finite, non-collapsing, and every reference corner maps in front of the
/// camera (positive homogeneous `w`).
fn is_well_formed(transform: &Transform, width: usize, height: usize) -> bool {
    if !transform.is_valid() {
        return false;
    }
    let m = transform.matrix;
    let (w, h) = (width as f64, height as f64);
    [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)]
        .iter()
        .all(|&(x, y)| m[6] * x + m[7] * y + m[8] > 1e-6)
}
