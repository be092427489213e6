//! RANSAC (Random Sample Consensus) for robust transform estimation.
//!
//! 1. Draw a minimal sample of correspondences
//! 2. Fit a candidate model
//! 3. Score it by truncated squared residuals (MSAC)
//! 4. Optionally re-fit promising candidates on their inliers (LO-RANSAC)
//! 5. Refine the best model by least squares on all inliers


pub(crate) mod transforms;

use glam::DVec2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::registration::config::RansacConfig;
use crate::registration::transform::{Transform, TransformType};
pub(crate) use transforms::estimate_transform;
use transforms::adaptive_iterations;

/// Why RANSAC could not produce a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RansacFailureReason {
    /// Fewer correspondences than the model needs.
    TooFewPoints,
    /// Every sample produced a degenerate model.
    DegeneratePointSet,
    /// No hypothesis had a single inlier.
    NoInliersFound,
    /// Best model's inlier ratio is below the configured minimum.
    InsufficientInliers,
}

impl std::fmt::Display for RansacFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RansacFailureReason::TooFewPoints => write!(f, "too few points"),
            RansacFailureReason::DegeneratePointSet => write!(f, "degenerate point set"),
            RansacFailureReason::NoInliersFound => write!(f, "no inliers found"),
            RansacFailureReason::InsufficientInliers => write!(f, "insufficient inliers"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RansacResult {
    pub transform: Transform,
    /// Indices of inlier correspondences.
    pub inliers: Vec<usize>,
    pub iterations: usize,
    pub inlier_ratio: f64,
    /// RMS reprojection error over the inliers, in pixels.
    pub rms_error: f64,
}

pub struct RansacEstimator {
    config: RansacConfig,
}

impl RansacEstimator {
    pub fn new(config: RansacConfig) -> Self {
        config.validate();
        Self { config }
    }

    /// Estimate the transform mapping `ref_points[i]` to `target_points[i]`.
    pub fn estimate(
        &self,
        ref_points: &[DVec2],
        target_points: &[DVec2],
        transform_type: TransformType,
    ) -> Result<RansacResult, RansacFailureReason> {
        assert_eq!(
            ref_points.len(),
            target_points.len(),
            "point sets must have equal length"
        );
        let n = ref_points.len();
        let min_samples = transform_type.min_points();
        if n < min_samples {
            return Err(RansacFailureReason::TooFewPoints);
        }

        let mut rng: ChaCha8Rng = match self.config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        };
        let threshold = self.config.inlier_threshold;

        let mut best: Option<(Transform, Vec<usize>, f64)> = None;
        let mut any_model = false;

        let mut sample_indices = Vec::with_capacity(min_samples);
        let mut sample_ref = Vec::with_capacity(min_samples);
        let mut sample_target = Vec::with_capacity(min_samples);

        let mut max_iter = self.config.max_iterations;
        let mut iterations = 0;

        while iterations < max_iter {
            iterations += 1;

            random_sample_into(&mut rng, n, min_samples, &mut sample_indices);
            sample_ref.clear();
            sample_target.clear();
            for &i in &sample_indices {
                sample_ref.push(ref_points[i]);
                sample_target.push(target_points[i]);
            }

            let Some(candidate) = estimate_transform(&sample_ref, &sample_target, transform_type)
            else {
                continue;
            };
            any_model = true;

            let (mut inliers, mut score) =
                count_inliers(ref_points, target_points, &candidate, threshold);
            let mut candidate = candidate;

            let best_score = best.as_ref().map_or(0.0, |b| b.2);
            if self.config.use_local_optimization
                && inliers.len() >= min_samples
                && score > best_score
            {
                (candidate, inliers, score) = self.local_optimization(
                    ref_points,
                    target_points,
                    candidate,
                    inliers,
                    score,
                    transform_type,
                );
            }

            if score > best_score {
                let ratio = inliers.len() as f64 / n as f64;
                best = Some((candidate, inliers, score));

                if ratio >= self.config.min_inlier_ratio {
                    let adaptive = adaptive_iterations(ratio, min_samples, self.config.confidence);
                    max_iter = max_iter.min(adaptive.max(iterations));
                }
            }
        }

        let Some((transform, inliers, _)) = best else {
            return Err(if any_model {
                RansacFailureReason::NoInliersFound
            } else {
                RansacFailureReason::DegeneratePointSet
            });
        };
        if inliers.is_empty() {
            return Err(RansacFailureReason::NoInliersFound);
        }

        // Least-squares refinement on the consensus set.
        let (inlier_ref, inlier_target) = gather(ref_points, target_points, &inliers);
        let refined =
            estimate_transform(&inlier_ref, &inlier_target, transform_type).unwrap_or(transform);
        let (final_inliers, _) = count_inliers(ref_points, target_points, &refined, threshold);
        let (transform, inliers) = if final_inliers.len() >= inliers.len() {
            (refined, final_inliers)
        } else {
            (transform, inliers)
        };

        let inlier_ratio = inliers.len() as f64 / n as f64;
        if inlier_ratio < self.config.min_inlier_ratio || inliers.len() < min_samples {
            return Err(RansacFailureReason::InsufficientInliers);
        }

        let rms_error = rms_error(ref_points, target_points, &transform, &inliers);
        Ok(RansacResult {
            transform,
            inliers,
            iterations,
            inlier_ratio,
            rms_error,
        })
    }

    /// Re-fit on the current inliers until the score stops improving.
    fn local_optimization(
        &self,
        ref_points: &[DVec2],
        target_points: &[DVec2],
        mut transform: Transform,
        mut inliers: Vec<usize>,
        mut score: f64,
        transform_type: TransformType,
    ) -> (Transform, Vec<usize>, f64) {
        for _ in 0..self.config.lo_max_iterations {
            if inliers.len() < transform_type.min_points() {
                break;
            }
            let (inlier_ref, inlier_target) = gather(ref_points, target_points, &inliers);
            let Some(refined) = estimate_transform(&inlier_ref, &inlier_target, transform_type)
            else {
                break;
            };

            let (new_inliers, new_score) = count_inliers(
                ref_points,
                target_points,
                &refined,
                self.config.inlier_threshold,
            );
            if new_score <= score {
                break;
            }
            transform = refined;
            inliers = new_inliers;
            score = new_score;
        }
        (transform, inliers, score)
    }
}

fn gather(ref_points: &[DVec2], target_points: &[DVec2], idx: &[usize]) -> (Vec<DVec2>, Vec<DVec2>) {
    idx.iter()
        .map(|&i| (ref_points[i], target_points[i]))
        .unzip()
}

/// Draw `k` distinct indices from `0..n` (Floyd's algorithm).
fn random_sample_into<R: Rng>(rng: &mut R, n: usize, k: usize, buffer: &mut Vec<usize>) {
    debug_assert!(k <= n, "Cannot sample {} indices from {}", k, n);
    buffer.clear();
    for j in (n - k)..n {
        let t = rng.random_range(0..=j);
        if buffer.contains(&t) {
            buffer.push(j);
        } else {
            buffer.push(t);
        }
    }
}

/// Inlier indices and MSAC score (sum of `threshold^2 - r^2` over inliers).
fn count_inliers(
    ref_points: &[DVec2],
    target_points: &[DVec2],
    transform: &Transform,
    threshold: f64,
) -> (Vec<usize>, f64) {
    let t2 = threshold * threshold;
    let mut inliers = Vec::new();
    let mut score = 0.0;
    for (i, (r, t)) in ref_points.iter().zip(target_points).enumerate() {
        let d2 = transform.apply(*r).distance_squared(*t);
        // NaN (point at infinity) fails the comparison.
        if d2 < t2 {
            inliers.push(i);
            score += t2 - d2;
        }
    }
    (inliers, score)
}

/// Reprojection residual of every correspondence, in pixels.
pub(crate) fn compute_residuals(
    ref_points: &[DVec2],
    target_points: &[DVec2],
    transform: &Transform,
) -> Vec<f64> {
    ref_points
        .iter()
        .zip(target_points)
        .map(|(r, t)| transform.apply(*r).distance(*t))
        .collect()
}

fn rms_error(
    ref_points: &[DVec2],
    target_points: &[DVec2],
    transform: &Transform,
    inliers: &[usize],
) -> f64 {
    if inliers.is_empty() {
        return 0.0;
    }
    let sum: f64 = inliers
        .iter()
        .map(|&i| transform.apply(ref_points[i]).distance_squared(target_points[i]))
        .sum();
    (sum / inliers.len() as f64).sqrt()
}
