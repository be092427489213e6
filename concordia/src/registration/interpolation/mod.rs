//! Sub-pixel resampling and image warping.
//!
//! - **Nearest**: no interpolation.
//! - **Bilinear**: default, linear in both directions.
//! - **Bicubic**: Catmull-Rom spline over a 4x4 neighbourhood.
//! - **Lanczos3**: windowed sinc over 6x6, weights from a lookup table.

#[cfg(test)]
mod tests;

use std::f32::consts::PI;
use std::sync::OnceLock;

use glam::DVec2;
use rayon::prelude::*;

use crate::raster::{Image, Plane};
use crate::registration::config::InterpolationMethod;
use crate::registration::transform::Transform;

/// Rows per rayon work item.
const ROWS_PER_CHUNK: usize = 32;

/// LUT samples per unit interval of the Lanczos kernel.
const LANCZOS_LUT_RESOLUTION: usize = 4096;

const LANCZOS_A: usize = 3;

#[inline]
fn lanczos_kernel_direct(x: f32, a: f32) -> f32 {
    let x = x.abs();
    if x < 1e-6 {
        return 1.0;
    }
    if x >= a {
        return 0.0;
    }
    let pi_x = PI * x;
    let pi_x_a = pi_x / a;
    (pi_x.sin() / pi_x) * (pi_x_a.sin() / pi_x_a)
}

/// Lanczos-3 kernel sampled on `[0, 3]`. The kernel is even, so lookups
/// use `|x|`.
struct LanczosLut {
    values: Vec<f32>,
}

impl LanczosLut {
    fn new() -> Self {
        let entries = LANCZOS_A * LANCZOS_LUT_RESOLUTION + 1;
        let values = (0..entries)
            .map(|i| {
                lanczos_kernel_direct(
                    i as f32 / LANCZOS_LUT_RESOLUTION as f32,
                    LANCZOS_A as f32,
                )
            })
            .collect();
        Self { values }
    }

    #[inline]
    fn lookup(&self, x: f32) -> f32 {
        let idx = (x.abs() * LANCZOS_LUT_RESOLUTION as f32 + 0.5) as usize;
        self.values.get(idx).copied().unwrap_or(0.0)
    }
}

static LANCZOS3_LUT: OnceLock<LanczosLut> = OnceLock::new();

#[inline]
fn lanczos_lut() -> &'static LanczosLut {
    LANCZOS3_LUT.get_or_init(LanczosLut::new)
}

/// Catmull-Rom cubic kernel (`a = -0.5`).
#[inline]
pub(crate) fn bicubic_kernel(x: f32) -> f32 {
    const A: f32 = -0.5;
    let x = x.abs();
    if x <= 1.0 {
        ((A + 2.0) * x - (A + 3.0)) * x * x + 1.0
    } else if x < 2.0 {
        ((A * x - 5.0 * A) * x + 8.0 * A) * x - 4.0 * A
    } else {
        0.0
    }
}

#[inline]
fn interpolate_nearest(data: &Plane, x: f32, y: f32, border: f32) -> f32 {
    data.get_or(x.round() as i32, y.round() as i32, border)
}

#[inline]
fn interpolate_bilinear(data: &Plane, x: f32, y: f32, border: f32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = data.get_or(x0, y0, border);
    let p10 = data.get_or(x0 + 1, y0, border);
    let p01 = data.get_or(x0, y0 + 1, border);
    let p11 = data.get_or(x0 + 1, y0 + 1, border);

    let top = p00 + fx * (p10 - p00);
    let bottom = p01 + fx * (p11 - p01);
    top + fy * (bottom - top)
}

/// Separable 2D convolution of the `N x N` neighbourhood starting at
/// `(x0 - N/2 + 1, y0 - N/2 + 1)`.
#[inline]
fn convolve<const N: usize>(
    data: &Plane,
    x0: i32,
    y0: i32,
    wx: &[f32; N],
    wy: &[f32; N],
    border: f32,
) -> f32 {
    let offset = N as i32 / 2 - 1;
    let mut sum = 0.0f32;
    for (j, &wyj) in wy.iter().enumerate() {
        let py = y0 - offset + j as i32;
        let mut row = 0.0f32;
        for (i, &wxi) in wx.iter().enumerate() {
            row += data.get_or(x0 - offset + i as i32, py, border) * wxi;
        }
        sum += row * wyj;
    }
    sum
}

fn interpolate_bicubic(data: &Plane, x: f32, y: f32, border: f32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let wx: [f32; 4] = std::array::from_fn(|i| bicubic_kernel(fx - (i as f32 - 1.0)));
    let wy: [f32; 4] = std::array::from_fn(|j| bicubic_kernel(fy - (j as f32 - 1.0)));
    convolve(data, x0, y0, &wx, &wy, border)
}

fn interpolate_lanczos3(data: &Plane, x: f32, y: f32, border: f32) -> f32 {
    const SIZE: usize = 2 * LANCZOS_A;
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let lut = lanczos_lut();
    let a = LANCZOS_A as f32;

    let mut wx: [f32; SIZE] = std::array::from_fn(|i| lut.lookup(fx - (i as f32 - a + 1.0)));
    let mut wy: [f32; SIZE] = std::array::from_fn(|j| lut.lookup(fy - (j as f32 - a + 1.0)));

    // Normalized weights keep flat regions flat.
    for w in [&mut wx, &mut wy] {
        let s: f32 = w.iter().sum();
        if s.abs() > 1e-10 {
            w.iter_mut().for_each(|v| *v /= s);
        }
    }
    convolve(data, x0, y0, &wx, &wy, border)
}

/// Sample `data` at sub-pixel `(x, y)`. Non-finite coordinates and
/// coordinates beyond the kernel footprint yield `border`.
#[inline]
pub fn interpolate_pixel(
    data: &Plane,
    x: f32,
    y: f32,
    method: InterpolationMethod,
    border: f32,
) -> f32 {
    let reach = method.kernel_radius() as f32;
    if !x.is_finite()
        || !y.is_finite()
        || x <= -reach
        || y <= -reach
        || x >= data.width() as f32 + reach
        || y >= data.height() as f32 + reach
    {
        return border;
    }
    match method {
        InterpolationMethod::Nearest => interpolate_nearest(data, x, y, border),
        InterpolationMethod::Bilinear => interpolate_bilinear(data, x, y, border),
        InterpolationMethod::Bicubic => interpolate_bicubic(data, x, y, border),
        InterpolationMethod::Lanczos3 => interpolate_lanczos3(data, x, y, border),
    }
}

/// Resample `input` onto a `width x height` grid.
///
/// Output pixel `p` takes the value of `input` at `transform.apply(p)`, so a
/// transform mapping reference coordinates to source coordinates produces a
/// frame aligned to the reference.
pub fn warp_plane(
    input: &Plane,
    width: usize,
    height: usize,
    transform: &Transform,
    method: InterpolationMethod,
    border: f32,
) -> Plane {
    let mut output = Plane::filled(width, height, border);

    output
        .data_mut()
        .par_chunks_mut(width * ROWS_PER_CHUNK)
        .enumerate()
        .for_each(|(chunk_idx, chunk)| {
            let start_y = chunk_idx * ROWS_PER_CHUNK;
            for (row_in_chunk, row) in chunk.chunks_exact_mut(width).enumerate() {
                let y = (start_y + row_in_chunk) as f64;
                for (x, out) in row.iter_mut().enumerate() {
                    let src = transform.apply(DVec2::new(x as f64, y));
                    *out = interpolate_pixel(input, src.x as f32, src.y as f32, method, border);
                }
            }
        });

    output
}

/// Warp every channel of `image` onto a `width x height` grid.
/// Channel count is preserved.
pub fn warp_image(
    image: &Image,
    width: usize,
    height: usize,
    transform: &Transform,
    method: InterpolationMethod,
) -> Image {
    let planes: Vec<Plane> = (0..image.channels())
        .map(|c| warp_plane(&image.channel(c), width, height, transform, method, 0.0))
        .collect();
    Image::from_planes(&planes)
}
