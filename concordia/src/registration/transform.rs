//! Geometric transforms between frames.

use glam::DVec2;

use crate::math::DMat3;

/// Transform models, ordered by degrees of freedom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformType {
    /// Translation only (2 DOF)
    Translation,
    /// Translation + rotation (3 DOF)
    Euclidean,
    /// Translation + rotation + uniform scale (4 DOF)
    Similarity,
    /// Full affine (6 DOF)
    Affine,
    /// Projective (8 DOF)
    #[default]
    Homography,
}

impl TransformType {
    /// Minimum number of correspondences to estimate this model.
    pub fn min_points(&self) -> usize {
        match self {
            TransformType::Translation => 1,
            TransformType::Euclidean | TransformType::Similarity => 2,
            TransformType::Affine => 3,
            TransformType::Homography => 4,
        }
    }
}

/// Homogeneous transform from reference pixel coordinates to source pixel
/// coordinates.
///
/// Warping samples the source at `apply(p)` for every reference pixel `p`,
/// so the warped frame overlays the reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub matrix: DMat3,
    pub transform_type: TransformType,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::fmt::Display for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = self.translation_components();
        match self.transform_type {
            TransformType::Translation => write!(f, "Translation(dx={:.2}, dy={:.2})", t.x, t.y),
            other => write!(
                f,
                "{:?}(dx={:.2}, dy={:.2}, rot={:.3}deg, scale={:.4})",
                other,
                t.x,
                t.y,
                self.rotation_angle().to_degrees(),
                self.scale_factor()
            ),
        }
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            matrix: DMat3::identity(),
            transform_type: TransformType::Translation,
        }
    }

    pub fn translation(t: DVec2) -> Self {
        Self {
            matrix: DMat3::from_array([1.0, 0.0, t.x, 0.0, 1.0, t.y, 0.0, 0.0, 1.0]),
            transform_type: TransformType::Translation,
        }
    }

    pub fn euclidean(t: DVec2, angle: f64) -> Self {
        Self {
            transform_type: TransformType::Euclidean,
            ..Self::similarity(t, angle, 1.0)
        }
    }

    pub fn similarity(t: DVec2, angle: f64, scale: f64) -> Self {
        let (sin_a, cos_a) = angle.sin_cos();
        let (a, c) = (cos_a * scale, sin_a * scale);
        Self {
            matrix: DMat3::from_array([a, -c, t.x, c, a, t.y, 0.0, 0.0, 1.0]),
            transform_type: TransformType::Similarity,
        }
    }

    /// Affine transform from `[a, b, tx, c, d, ty]`.
    pub fn affine(params: [f64; 6]) -> Self {
        let [a, b, tx, c, d, ty] = params;
        Self {
            matrix: DMat3::from_array([a, b, tx, c, d, ty, 0.0, 0.0, 1.0]),
            transform_type: TransformType::Affine,
        }
    }

    /// Homography from the first 8 entries, the ninth is 1.
    pub fn homography(params: [f64; 8]) -> Self {
        let [a, b, c, d, e, f, g, h] = params;
        Self {
            matrix: DMat3::from_array([a, b, c, d, e, f, g, h, 1.0]),
            transform_type: TransformType::Homography,
        }
    }

    pub fn from_matrix(matrix: DMat3, transform_type: TransformType) -> Self {
        Self {
            matrix,
            transform_type,
        }
    }

    /// Map a reference point into source coordinates.
    #[inline]
    pub fn apply(&self, p: DVec2) -> DVec2 {
        self.matrix.transform_point(p)
    }

    /// Inverse transform, `None` when singular.
    pub fn inverse(&self) -> Option<Self> {
        self.matrix.inverse().map(|matrix| Self {
            matrix,
            transform_type: self.transform_type,
        })
    }

    pub fn translation_components(&self) -> DVec2 {
        DVec2::new(self.matrix[2], self.matrix[5])
    }

    /// Rotation in radians (meaningful up to similarity).
    pub fn rotation_angle(&self) -> f64 {
        self.matrix[3].atan2(self.matrix[0])
    }

    pub fn scale_factor(&self) -> f64 {
        self.matrix[0].hypot(self.matrix[3])
    }

    /// Non-degenerate: finite, invertible linear part, and a scale that does
    /// not collapse or explode the frame.
    pub fn is_valid(&self) -> bool {
        if !self.matrix.is_finite() {
            return false;
        }
        let det = self.matrix[0] * self.matrix[4] - self.matrix[1] * self.matrix[3];
        det.is_finite() && (1e-2..=1e2).contains(&det.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_min_points() {
        assert_eq!(TransformType::Translation.min_points(), 1);
        assert_eq!(TransformType::Similarity.min_points(), 2);
        assert_eq!(TransformType::Affine.min_points(), 3);
        assert_eq!(TransformType::Homography.min_points(), 4);
        assert_eq!(TransformType::default(), TransformType::Homography);
    }

    #[test]
    fn test_similarity_components() {
        let t = Transform::similarity(DVec2::new(4.0, -2.0), PI / 6.0, 1.5);
        assert!((t.rotation_angle() - PI / 6.0).abs() < EPS);
        assert!((t.scale_factor() - 1.5).abs() < EPS);
        assert_eq!(t.translation_components(), DVec2::new(4.0, -2.0));
    }

    #[test]
    fn test_inverse_undoes_apply() {
        let t = Transform::homography([1.1, 0.05, 3.0, -0.02, 0.95, -4.0, 1e-4, 2e-4]);
        let inv = t.inverse().unwrap();
        let p = DVec2::new(37.0, 81.0);
        let back = inv.apply(t.apply(p));
        assert!((back - p).length() < 1e-9);
    }

    #[test]
    fn test_validity() {
        assert!(Transform::identity().is_valid());
        assert!(!Transform::affine([0.0, 0.0, 1.0, 0.0, 0.0, 1.0]).is_valid());
        assert!(!Transform::similarity(DVec2::ZERO, 0.0, 1e-3).is_valid());
        assert!(!Transform::translation(DVec2::new(f64::NAN, 0.0)).is_valid());
    }

    #[test]
    fn test_display() {
        let t = Transform::translation(DVec2::new(1.234, -5.0));
        assert_eq!(t.to_string(), "Translation(dx=1.23, dy=-5.00)");
    }
}
