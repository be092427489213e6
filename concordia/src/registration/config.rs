//! Configuration types for the registration engine.
//!
//! Every struct has a `Default` tuned for handheld or tripod photo sequences
//! and a `validate()` that panics on values no caller should ever pass.

use crate::registration::transform::TransformType;

// =============================================================================
// Policies
// =============================================================================

/// What to do with a frame that cannot be aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Keep the original frame at its index, unaligned.
    #[default]
    PassThrough,
    /// Remove the frame; the output sequence shrinks.
    Drop,
}

/// Interpolation method for image resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationMethod {
    /// Nearest neighbor
    Nearest,
    /// Bilinear, default
    #[default]
    Bilinear,
    /// Catmull-Rom bicubic
    Bicubic,
    /// Lanczos-3 (6x6 kernel)
    Lanczos3,
}

impl InterpolationMethod {
    #[inline]
    pub fn kernel_radius(&self) -> usize {
        match self {
            InterpolationMethod::Nearest | InterpolationMethod::Bilinear => 1,
            InterpolationMethod::Bicubic => 2,
            InterpolationMethod::Lanczos3 => 3,
        }
    }
}

// =============================================================================
// Feature detection
// =============================================================================

/// Corner detection parameters.
#[derive(Debug, Clone)]
pub struct FeatureConfig {
    /// Segment-test contrast threshold on `[0, 1]` intensities.
    /// 0.08 is roughly 20 levels of an 8-bit image.
    pub fast_threshold: f32,
    /// Keep at most this many corners, strongest first.
    pub max_keypoints: usize,
    /// Corners closer than this to the image edge are discarded. Must leave
    /// room for the descriptor patch.
    pub border: usize,
    /// Non-maximum suppression radius in pixels.
    pub nms_radius: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            fast_threshold: 0.08,
            max_keypoints: 1000,
            border: 16,
            nms_radius: 3,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) {
        assert!(
            self.fast_threshold > 0.0 && self.fast_threshold < 1.0,
            "fast_threshold must be in (0, 1), got {}",
            self.fast_threshold
        );
        assert!(
            self.max_keypoints > 0,
            "max_keypoints must be positive, got {}",
            self.max_keypoints
        );
        assert!(
            self.border >= crate::registration::features::PATCH_RADIUS + 1,
            "border must be at least {}, got {}",
            crate::registration::features::PATCH_RADIUS + 1,
            self.border
        );
    }
}

// =============================================================================
// Descriptor matching
// =============================================================================

/// Descriptor matching parameters.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Lowe ratio: best distance must be below `ratio * second_best`.
    pub ratio: f32,
    /// Reject matches with a Hamming distance above this (out of 256).
    pub max_distance: u32,
    /// Keep only mutual nearest neighbours.
    pub cross_check: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            ratio: 0.8,
            max_distance: 64,
            cross_check: true,
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) {
        assert!(
            self.ratio > 0.0 && self.ratio <= 1.0,
            "match ratio must be in (0, 1], got {}",
            self.ratio
        );
        assert!(
            self.max_distance <= 256,
            "max_distance cannot exceed descriptor length (256), got {}",
            self.max_distance
        );
    }
}

// =============================================================================
// RANSAC
// =============================================================================

/// RANSAC parameters.
#[derive(Debug, Clone)]
pub struct RansacConfig {
    pub max_iterations: usize,
    /// Inlier reprojection threshold in pixels.
    pub inlier_threshold: f64,
    /// Target confidence for adaptive early termination.
    pub confidence: f64,
    /// Minimum inlier fraction to accept a model.
    pub min_inlier_ratio: f64,
    /// Random seed. `None` seeds from the OS.
    pub seed: Option<u64>,
    /// Refine promising hypotheses on their inliers (LO-RANSAC).
    pub use_local_optimization: bool,
    pub lo_max_iterations: usize,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            inlier_threshold: 3.0,
            confidence: 0.995,
            min_inlier_ratio: 0.25,
            seed: Some(0),
            use_local_optimization: true,
            lo_max_iterations: 10,
        }
    }
}

impl RansacConfig {
    pub fn validate(&self) {
        assert!(
            self.max_iterations > 0,
            "RANSAC max_iterations must be positive, got {}",
            self.max_iterations
        );
        assert!(
            self.inlier_threshold > 0.0,
            "RANSAC inlier_threshold must be positive, got {}",
            self.inlier_threshold
        );
        assert!(
            (0.0..=1.0).contains(&self.confidence),
            "RANSAC confidence must be in [0, 1], got {}",
            self.confidence
        );
        assert!(
            self.min_inlier_ratio > 0.0 && self.min_inlier_ratio <= 1.0,
            "RANSAC min_inlier_ratio must be in (0, 1], got {}",
            self.min_inlier_ratio
        );
    }
}

// =============================================================================
// Top level
// =============================================================================

/// Registration engine configuration.
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    /// Frame every other frame is aligned to. Out of range falls back to 0.
    pub reference_index: usize,
    pub transform_type: TransformType,
    pub fallback: FallbackPolicy,
    /// Lower bound on correspondences, on top of the model's minimum.
    pub min_correspondences: usize,
    /// Reject a fit whose inlier RMS error (pixels) exceeds this.
    pub max_rms_error: f64,
    pub interpolation: InterpolationMethod,
    pub features: FeatureConfig,
    pub matching: MatchConfig,
    pub ransac: RansacConfig,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            reference_index: 0,
            transform_type: TransformType::Homography,
            fallback: FallbackPolicy::PassThrough,
            min_correspondences: 4,
            max_rms_error: 3.0,
            interpolation: InterpolationMethod::Bilinear,
            features: FeatureConfig::default(),
            matching: MatchConfig::default(),
            ransac: RansacConfig::default(),
        }
    }
}

impl RegistrationConfig {
    /// Correspondences needed before estimation is attempted.
    pub fn required_correspondences(&self) -> usize {
        self.transform_type
            .min_points()
            .max(self.min_correspondences)
    }

    pub fn validate(&self) {
        assert!(
            self.max_rms_error > 0.0,
            "max_rms_error must be positive, got {}",
            self.max_rms_error
        );
        self.features.validate();
        self.matching.validate();
        self.ransac.validate();
    }
}
