//! Closed-form and least-squares model fits from point correspondences.
//!
//! Every estimator maps `ref_points[i]` onto `target_points[i]` and returns
//! `None` when the input is degenerate.

use glam::DVec2;
use nalgebra::{DMatrix, DVector, SVD};

use crate::math::DMat3;
use crate::registration::transform::{Transform, TransformType};

/// Iterations needed to draw one all-inlier sample with the given confidence.
pub(crate) fn adaptive_iterations(inlier_ratio: f64, sample_size: usize, confidence: f64) -> usize {
    if inlier_ratio <= 0.0 {
        return usize::MAX;
    }
    if inlier_ratio >= 1.0 {
        return 1;
    }

    // N = log(1 - confidence) / log(1 - w^n)
    let w_n = inlier_ratio.powi(sample_size as i32);
    let log_outlier = (1.0 - w_n).ln();
    if log_outlier >= 0.0 {
        return usize::MAX;
    }

    let n = ((1.0 - confidence).ln() / log_outlier).ceil();
    if n.is_finite() && n >= 1.0 {
        n as usize
    } else {
        1
    }
}

pub(crate) fn estimate_transform(
    ref_points: &[DVec2],
    target_points: &[DVec2],
    transform_type: TransformType,
) -> Option<Transform> {
    debug_assert_eq!(ref_points.len(), target_points.len());
    if ref_points.len() < transform_type.min_points() {
        return None;
    }
    let transform = match transform_type {
        TransformType::Translation => estimate_translation(ref_points, target_points),
        TransformType::Euclidean => estimate_procrustes(ref_points, target_points, false),
        TransformType::Similarity => estimate_procrustes(ref_points, target_points, true),
        TransformType::Affine => estimate_affine(ref_points, target_points),
        TransformType::Homography => estimate_homography(ref_points, target_points),
    }?;
    transform.is_valid().then_some(transform)
}

/// Mean displacement.
fn estimate_translation(ref_points: &[DVec2], target_points: &[DVec2]) -> Option<Transform> {
    let sum: DVec2 = ref_points
        .iter()
        .zip(target_points)
        .map(|(r, t)| *t - *r)
        .sum();
    Some(Transform::translation(sum / ref_points.len() as f64))
}

/// Procrustes fit on centered points. Scale is fitted only when
/// `with_scale` is set, otherwise it stays 1.
fn estimate_procrustes(
    ref_points: &[DVec2],
    target_points: &[DVec2],
    with_scale: bool,
) -> Option<Transform> {
    let ref_c = centroid(ref_points);
    let tar_c = centroid(target_points);

    let (mut sxx, mut sxy, mut syx, mut syy, mut ref_var) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (r, t) in ref_points.iter().zip(target_points) {
        let r = *r - ref_c;
        let t = *t - tar_c;
        sxx += r.x * t.x;
        sxy += r.x * t.y;
        syx += r.y * t.x;
        syy += r.y * t.y;
        ref_var += r.length_squared();
    }
    if ref_var < 1e-10 {
        return None;
    }

    let angle = (sxy - syx).atan2(sxx + syy);
    let (sin_a, cos_a) = angle.sin_cos();
    let scale = if with_scale {
        ((sxx + syy) * cos_a + (sxy - syx) * sin_a) / ref_var
    } else {
        1.0
    };
    if scale <= 0.0 {
        return None;
    }

    let t = DVec2::new(
        tar_c.x - scale * (cos_a * ref_c.x - sin_a * ref_c.y),
        tar_c.y - scale * (sin_a * ref_c.x + cos_a * ref_c.y),
    );
    let transform = if with_scale {
        Transform::similarity(t, angle, scale)
    } else {
        Transform::euclidean(t, angle)
    };
    Some(transform)
}

/// Linear least squares on normalized coordinates, solved with SVD.
fn estimate_affine(ref_points: &[DVec2], target_points: &[DVec2]) -> Option<Transform> {
    let (ref_norm, ref_t) = normalize_points(ref_points);
    let (tar_norm, tar_t) = normalize_points(target_points);
    let n = ref_norm.len();

    // Rows: [x y 1 0 0 0] -> x', [0 0 0 x y 1] -> y'
    let mut a = DMatrix::<f64>::zeros(2 * n, 6);
    let mut b = DVector::<f64>::zeros(2 * n);
    for (i, (r, t)) in ref_norm.iter().zip(&tar_norm).enumerate() {
        a[(2 * i, 0)] = r.x;
        a[(2 * i, 1)] = r.y;
        a[(2 * i, 2)] = 1.0;
        a[(2 * i + 1, 3)] = r.x;
        a[(2 * i + 1, 4)] = r.y;
        a[(2 * i + 1, 5)] = 1.0;
        b[2 * i] = t.x;
        b[2 * i + 1] = t.y;
    }

    let svd = SVD::new(a, true, true);
    let rank = svd.rank(1e-9);
    if rank < 6 {
        return None;
    }
    let p = svd.solve(&b, 1e-12).ok()?;
    let norm = DMat3::from_array([p[0], p[1], p[2], p[3], p[4], p[5], 0.0, 0.0, 1.0]);

    let tar_t_inv = tar_t.inverse()?;
    let m = tar_t_inv.mul_mat(&norm).mul_mat(&ref_t);
    Some(Transform::affine([m[0], m[1], m[2], m[3], m[4], m[5]]))
}

/// Direct Linear Transform on normalized coordinates.
fn estimate_homography(ref_points: &[DVec2], target_points: &[DVec2]) -> Option<Transform> {
    let (ref_norm, ref_t) = normalize_points(ref_points);
    let (tar_norm, tar_t) = normalize_points(target_points);
    let n = ref_norm.len();

    // Two rows per correspondence:
    // [-x -y -1  0  0  0  x*x'  y*x'  x']
    // [ 0  0  0 -x -y -1  x*y'  y*y'  y']
    let mut a = DMatrix::<f64>::zeros((2 * n).max(9), 9);
    for (i, (r, t)) in ref_norm.iter().zip(&tar_norm).enumerate() {
        let row0 = [-r.x, -r.y, -1.0, 0.0, 0.0, 0.0, r.x * t.x, r.y * t.x, t.x];
        let row1 = [0.0, 0.0, 0.0, -r.x, -r.y, -1.0, r.x * t.y, r.y * t.y, t.y];
        for c in 0..9 {
            a[(2 * i, c)] = row0[c];
            a[(2 * i + 1, c)] = row1[c];
        }
    }

    let h = solve_homogeneous(a)?;
    let tar_t_inv = tar_t.inverse()?;
    let m = tar_t_inv.mul_mat(&h).mul_mat(&ref_t).normalized()?;
    Some(Transform::from_matrix(m, TransformType::Homography))
}

/// Null vector of `a`: the right singular vector of the smallest singular
/// value. `a` must have at least as many rows as columns.
fn solve_homogeneous(a: DMatrix<f64>) -> Option<DMat3> {
    let svd = SVD::new(a, false, true);
    let v_t = svd.v_t?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;

    let mut data = [0.0f64; 9];
    for (i, v) in v_t.row(min_idx).iter().enumerate() {
        data[i] = *v;
    }
    Some(DMat3::from_array(data))
}

/// Hartley normalization: centroid to origin, mean distance `sqrt(2)`.
pub(crate) fn normalize_points(points: &[DVec2]) -> (Vec<DVec2>, DMat3) {
    let c = centroid(points);
    let mean_dist =
        points.iter().map(|p| (*p - c).length()).sum::<f64>() / points.len().max(1) as f64;
    if mean_dist < 1e-10 {
        return (points.to_vec(), DMat3::identity());
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    let normalized = points.iter().map(|p| (*p - c) * s).collect();
    let t = DMat3::from_array([s, 0.0, -c.x * s, 0.0, s, -c.y * s, 0.0, 0.0, 1.0]);
    (normalized, t)
}

pub(crate) fn centroid(points: &[DVec2]) -> DVec2 {
    if points.is_empty() {
        return DVec2::ZERO;
    }
    points.iter().copied().sum::<DVec2>() / points.len() as f64
}
