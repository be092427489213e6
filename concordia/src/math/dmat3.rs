//! Row-major 3x3 matrix used for 2D homogeneous transforms.

use glam::DVec2;
use std::ops::{Index, Mul};

/// Determinant magnitude below which a matrix is treated as singular.
/// Coordinates are pixels, so entries stay in a moderate range.
const SINGULAR_EPS: f64 = 1e-12;

/// Row-major 3x3 matrix of `f64`.
///
/// ```text
/// | m[0] m[1] m[2] |     | a  b  tx |
/// | m[3] m[4] m[5] |  =  | c  d  ty |
/// | m[6] m[7] m[8] |     | g  h  1  |
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DMat3 {
    data: [f64; 9],
}

impl DMat3 {
    #[inline]
    pub const fn from_array(data: [f64; 9]) -> Self {
        Self { data }
    }

    #[inline]
    pub const fn identity() -> Self {
        Self {
            data: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        }
    }

    #[inline]
    pub const fn as_array(&self) -> &[f64; 9] {
        &self.data
    }

    /// `self * rhs`.
    pub fn mul_mat(&self, rhs: &DMat3) -> DMat3 {
        let a = &self.data;
        let b = &rhs.data;
        let mut out = [0.0; 9];
        for row in 0..3 {
            for col in 0..3 {
                out[row * 3 + col] = a[row * 3] * b[col]
                    + a[row * 3 + 1] * b[3 + col]
                    + a[row * 3 + 2] * b[6 + col];
            }
        }
        DMat3 { data: out }
    }

    pub fn determinant(&self) -> f64 {
        let d = &self.data;
        d[0] * (d[4] * d[8] - d[5] * d[7]) - d[1] * (d[3] * d[8] - d[5] * d[6])
            + d[2] * (d[3] * d[7] - d[4] * d[6])
    }

    /// Inverse via the adjugate, `None` when singular.
    pub fn inverse(&self) -> Option<DMat3> {
        let det = self.determinant();
        if det.abs() < SINGULAR_EPS || !det.is_finite() {
            return None;
        }
        let inv_det = 1.0 / det;
        let d = &self.data;
        Some(DMat3 {
            data: [
                (d[4] * d[8] - d[5] * d[7]) * inv_det,
                (d[2] * d[7] - d[1] * d[8]) * inv_det,
                (d[1] * d[5] - d[2] * d[4]) * inv_det,
                (d[5] * d[6] - d[3] * d[8]) * inv_det,
                (d[0] * d[8] - d[2] * d[6]) * inv_det,
                (d[2] * d[3] - d[0] * d[5]) * inv_det,
                (d[3] * d[7] - d[4] * d[6]) * inv_det,
                (d[1] * d[6] - d[0] * d[7]) * inv_det,
                (d[0] * d[4] - d[1] * d[3]) * inv_det,
            ],
        })
    }

    /// Scale so that `m[8] == 1`. Returns `None` when `m[8]` is ~0.
    pub fn normalized(&self) -> Option<DMat3> {
        let h = self.data[8];
        if h.abs() < SINGULAR_EPS {
            return None;
        }
        Some(*self * (1.0 / h))
    }

    /// Map a point through the homogeneous transform.
    ///
    /// Returns `None` when the point maps to infinity.
    #[inline]
    pub fn try_transform_point(&self, p: DVec2) -> Option<DVec2> {
        let d = &self.data;
        let w = d[6] * p.x + d[7] * p.y + d[8];
        if w.abs() <= f64::EPSILON {
            return None;
        }
        Some(DVec2::new(
            (d[0] * p.x + d[1] * p.y + d[2]) / w,
            (d[3] * p.x + d[4] * p.y + d[5]) / w,
        ))
    }

    /// Map a point through the homogeneous transform.
    ///
    /// Points at infinity map to `(NaN, NaN)`, which every sampler treats as
    /// out of bounds.
    #[inline]
    pub fn transform_point(&self, p: DVec2) -> DVec2 {
        self.try_transform_point(p)
            .unwrap_or(DVec2::new(f64::NAN, f64::NAN))
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

impl Default for DMat3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Index<usize> for DMat3 {
    type Output = f64;

    #[inline]
    fn index(&self, idx: usize) -> &f64 {
        &self.data[idx]
    }
}

impl Mul for DMat3 {
    type Output = DMat3;

    fn mul(self, rhs: DMat3) -> DMat3 {
        self.mul_mat(&rhs)
    }
}

impl Mul<f64> for DMat3 {
    type Output = DMat3;

    fn mul(self, rhs: f64) -> DMat3 {
        let mut out = self;
        out.data.iter_mut().for_each(|v| *v *= rhs);
        out
    }
}
