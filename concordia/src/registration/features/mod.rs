//! Keypoint detection and binary descriptors.
//!
//! Corners come from the FAST-9 segment test on a 16-pixel Bresenham circle,
//! thinned by non-maximum suppression. Each corner gets an orientation from
//! the intensity centroid of its patch and a 256-bit descriptor of pairwise
//! intensity comparisons, with the sampling pattern rotated by that
//! orientation.

mod matching;

pub use matching::{Match, match_descriptors};

use std::sync::OnceLock;

use glam::DVec2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::raster::Plane;
use crate::registration::config::FeatureConfig;

/// Radius of the patch used for orientation and descriptors.
pub const PATCH_RADIUS: usize = 15;

/// Sampling points stay inside this radius so a rotated point never leaves
/// the patch.
const PATTERN_RADIUS: f32 = 13.0;

const DESCRIPTOR_BITS: usize = 256;

/// Seed of the descriptor sampling pattern. Changing it invalidates every
/// descriptor ever computed.
const PATTERN_SEED: u64 = 0x0b5e_55ed_c0de_0001;

/// Minimum contiguous arc length for the segment test.
const FAST_ARC: usize = 9;

/// Bresenham circle of radius 3, clockwise from 12 o'clock.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub position: DVec2,
    /// Segment-test response, higher is stronger.
    pub score: f32,
    /// Patch orientation in radians.
    pub angle: f32,
}

/// 256-bit binary descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Descriptor([u64; 4]);

impl Descriptor {
    #[inline]
    pub fn hamming(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    #[inline]
    fn set_bit(&mut self, bit: usize) {
        self.0[bit / 64] |= 1 << (bit % 64);
    }
}

/// Keypoints with one descriptor each.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Detect oriented corners and describe them.
pub fn detect_features(plane: &Plane, config: &FeatureConfig) -> FeatureSet {
    let smoothed = smooth(plane);
    let corners = detect_corners(&smoothed, config);

    let (keypoints, descriptors) = corners
        .into_iter()
        .map(|(x, y, score)| {
            let angle = intensity_centroid_angle(&smoothed, x, y);
            let keypoint = Keypoint {
                position: DVec2::new(x as f64, y as f64),
                score,
                angle,
            };
            (keypoint, describe(&smoothed, x, y, angle))
        })
        .unzip();

    FeatureSet {
        keypoints,
        descriptors,
    }
}

/// Corners as `(x, y, score)`, strongest first, at most `max_keypoints`.
pub(crate) fn detect_corners(plane: &Plane, config: &FeatureConfig) -> Vec<(usize, usize, f32)> {
    let (width, height) = (plane.width(), plane.height());
    let border = config.border.max(3);
    if width <= 2 * border || height <= 2 * border {
        return Vec::new();
    }

    let mut scores = vec![0.0f32; width * height];
    scores
        .par_chunks_mut(width)
        .enumerate()
        .skip(border)
        .take(height - 2 * border)
        .for_each(|(y, row)| {
            for (x, s) in row.iter_mut().enumerate().take(width - border).skip(border) {
                *s = segment_test_score(plane, x, y, config.fast_threshold);
            }
        });

    let r = config.nms_radius as isize;
    let mut corners: Vec<(usize, usize, f32)> = Vec::new();
    for y in border..height - border {
        for x in border..width - border {
            let s = scores[y * width + x];
            if s <= 0.0 {
                continue;
            }
            if is_local_maximum(&scores, width, height, x, y, r) {
                corners.push((x, y, s));
            }
        }
    }

    corners.sort_by(|a, b| b.2.total_cmp(&a.2).then((a.1, a.0).cmp(&(b.1, b.0))));
    corners.truncate(config.max_keypoints);
    corners
}

/// Ties are broken by raster order so exactly one of two equal neighbours
/// survives.
fn is_local_maximum(
    scores: &[f32],
    width: usize,
    height: usize,
    x: usize,
    y: usize,
    r: isize,
) -> bool {
    let s = scores[y * width + x];
    for dy in -r..=r {
        for dx in -r..=r {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = x as isize + dx;
            let ny = y as isize + dy;
            if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                continue;
            }
            let n = scores[ny as usize * width + nx as usize];
            let earlier = (ny, nx) < (y as isize, x as isize);
            if n > s || (n == s && earlier) {
                return false;
            }
        }
    }
    true
}

/// FAST-9 response: 0 when no arc of 9 contiguous pixels is uniformly
/// brighter or darker than the centre by `threshold`, otherwise the summed
/// excess contrast of the stronger side.
pub(crate) fn segment_test_score(plane: &Plane, x: usize, y: usize, threshold: f32) -> f32 {
    let p = plane.get(x, y);
    let ring: [f32; 16] = std::array::from_fn(|i| {
        let (dx, dy) = CIRCLE[i];
        plane.get((x as i32 + dx) as usize, (y as i32 + dy) as usize)
    });

    // Quick reject on the four compass points: an arc of 9 covers at least
    // two of them.
    let compass = [ring[0], ring[4], ring[8], ring[12]];
    let bright = compass.iter().filter(|&&v| v > p + threshold).count();
    let dark = compass.iter().filter(|&&v| v < p - threshold).count();
    if bright < 2 && dark < 2 {
        return 0.0;
    }

    let brighter = ring.map(|v| v > p + threshold);
    let darker = ring.map(|v| v < p - threshold);
    if !has_arc(&brighter) && !has_arc(&darker) {
        return 0.0;
    }

    let bright_sum: f32 = ring.iter().map(|&v| (v - p - threshold).max(0.0)).sum();
    let dark_sum: f32 = ring.iter().map(|&v| (p - threshold - v).max(0.0)).sum();
    bright_sum.max(dark_sum)
}

/// True when `flags` holds `FAST_ARC` contiguous `true`s, wrapping around.
fn has_arc(flags: &[bool; 16]) -> bool {
    let mut run = 0;
    for i in 0..16 + FAST_ARC - 1 {
        if flags[i % 16] {
            run += 1;
            if run >= FAST_ARC {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

/// Orientation of the patch from its first-order intensity moments.
pub(crate) fn intensity_centroid_angle(plane: &Plane, x: usize, y: usize) -> f32 {
    let r = PATCH_RADIUS as i32;
    let mut m10 = 0.0f32;
    let mut m01 = 0.0f32;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy > r * r {
                continue;
            }
            let v = plane.get_or(x as i32 + dx, y as i32 + dy, 0.0);
            m10 += dx as f32 * v;
            m01 += dy as f32 * v;
        }
    }
    m01.atan2(m10)
}

type PointPair = [(f32, f32); 2];

/// Process-wide descriptor sampling pattern, uniform in a disk.
fn sampling_pattern() -> &'static [PointPair] {
    static PATTERN: OnceLock<Vec<PointPair>> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut rng = ChaCha8Rng::seed_from_u64(PATTERN_SEED);
        let mut point = move || loop {
            let x: f32 = rng.random_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
            let y: f32 = rng.random_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
            if x * x + y * y <= PATTERN_RADIUS * PATTERN_RADIUS {
                return (x, y);
            }
        };
        (0..DESCRIPTOR_BITS).map(|_| [point(), point()]).collect()
    })
}

/// Steered BRIEF: pattern rotated by `angle`, one bit per pair.
pub(crate) fn describe(plane: &Plane, x: usize, y: usize, angle: f32) -> Descriptor {
    let (sin_a, cos_a) = angle.sin_cos();
    let sample = |(px, py): (f32, f32)| {
        let rx = (cos_a * px - sin_a * py).round() as i32;
        let ry = (sin_a * px + cos_a * py).round() as i32;
        plane.get_or(x as i32 + rx, y as i32 + ry, 0.0)
    };

    let mut descriptor = Descriptor::default();
    for (bit, [a, b]) in sampling_pattern().iter().enumerate() {
        if sample(*a) < sample(*b) {
            descriptor.set_bit(bit);
        }
    }
    descriptor
}

/// Separable `[1 4 6 4 1] / 16` blur with clamped edges.
fn smooth(plane: &Plane) -> Plane {
    const K: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];
    let (w, h) = (plane.width(), plane.height());
    let clamp = |v: i32, n: usize| v.clamp(0, n as i32 - 1) as usize;

    let horizontal = Plane::from_fn(w, h, |x, y| {
        K.iter()
            .enumerate()
            .map(|(i, k)| k * plane.get(clamp(x as i32 + i as i32 - 2, w), y))
            .sum()
    });
    Plane::from_fn(w, h, |x, y| {
        K.iter()
            .enumerate()
            .map(|(i, k)| k * horizontal.get(x, clamp(y as i32 + i as i32 - 2, h)))
            .sum()
    })
}
