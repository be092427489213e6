//! Procedural scenes for registration tests.

use glam::DVec2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::raster::{Image, ImageDimensions, Plane};
use crate::registration::Transform;

/// Overlapping axis-aligned rectangles of random intensity. Later
/// rectangles paint over earlier ones, which produces plenty of corners.
pub(crate) struct Scene {
    rects: Vec<(f64, f64, f64, f64, f32)>,
    background: f32,
}

impl Scene {
    pub(crate) fn new(seed: u64, extent: f64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let count = (extent * extent / 180.0) as usize;
        let rects = (0..count)
            .map(|_| {
                let x = rng.random_range(-20.0..extent);
                let y = rng.random_range(-20.0..extent);
                let w = rng.random_range(6.0..28.0);
                let h = rng.random_range(6.0..28.0);
                let v = rng.random_range(0.05f32..0.95);
                (x, y, x + w, y + h, v)
            })
            .collect();
        Self {
            rects,
            background: 0.5,
        }
    }

    pub(crate) fn sample(&self, p: DVec2) -> f32 {
        self.rects
            .iter()
            .rev()
            .find(|(x0, y0, x1, y1, _)| p.x >= *x0 && p.x < *x1 && p.y >= *y0 && p.y < *y1)
            .map_or(self.background, |r| r.4)
    }

    /// Render the view whose pixel `q` shows scene point `to_scene.apply(q)`,
    /// with 2x2 supersampling.
    pub(crate) fn render(&self, width: usize, height: usize, to_scene: &Transform) -> Plane {
        const OFFSETS: [f64; 2] = [-0.25, 0.25];
        Plane::from_fn(width, height, |x, y| {
            let mut sum = 0.0;
            for oy in OFFSETS {
                for ox in OFFSETS {
                    let q = DVec2::new(x as f64 + ox, y as f64 + oy);
                    sum += self.sample(to_scene.apply(q));
                }
            }
            sum / 4.0
        })
    }
}

/// Reference frame plus frames displaced by `transforms`.
///
/// Each transform maps reference pixel coordinates to the coordinates of
/// that frame, which is exactly what registration should recover.
pub(crate) fn frame_sequence(
    seed: u64,
    width: usize,
    height: usize,
    transforms: &[Transform],
) -> Vec<Image> {
    let scene = Scene::new(seed, width.max(height) as f64 + 40.0);
    let mut frames = vec![to_rgb(&scene.render(width, height, &Transform::identity()))];
    for t in transforms {
        let to_scene = t.inverse().expect("test transforms are invertible");
        frames.push(to_rgb(&scene.render(width, height, &to_scene)));
    }
    frames
}

/// RGB image with slightly different gains per channel.
pub(crate) fn to_rgb(plane: &Plane) -> Image {
    let planes: Vec<Plane> = [1.0f32, 0.9, 0.8]
        .iter()
        .map(|g| Plane::new(plane.width(), plane.height(), plane.data().iter().map(|v| v * g).collect()))
        .collect();
    Image::from_planes(&planes)
}

pub(crate) fn featureless(width: usize, height: usize) -> Image {
    Image::from_pixels(
        ImageDimensions::new(width, height, 3),
        vec![0.5; width * height * 3],
    )
}

/// Mean absolute difference over the central region, ignoring a margin
/// where warped frames have border fill.
pub(crate) fn central_mad(a: &Plane, b: &Plane, margin: usize) -> f32 {
    let mut sum = 0.0;
    let mut n = 0;
    for y in margin..a.height() - margin {
        for x in margin..a.width() - margin {
            sum += (a.get(x, y) - b.get(x, y)).abs();
            n += 1;
        }
    }
    sum / n as f32
}

/// Aligner that returns its input untouched and counts invocations.
#[derive(Default)]
pub(crate) struct SpyAligner {
    pub(crate) calls: std::sync::atomic::AtomicUsize,
    pub(crate) parameters: String,
}

impl SpyAligner {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl crate::registration::Aligner for SpyAligner {
    fn align(&self, images: Vec<Image>) -> crate::registration::AlignedSequence {
        use crate::registration::{FrameReport, FrameStatus};

        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let reports = (0..images.len())
            .map(|index| {
                let status = if index == 0 {
                    FrameStatus::Reference
                } else {
                    FrameStatus::Aligned
                };
                FrameReport::bare(index, status)
            })
            .collect();
        crate::registration::AlignedSequence { images, reports }
    }

    fn parameters(&self) -> String {
        self.parameters.clone()
    }
}

/// Small RGB image with a deterministic gradient offset by `seed`.
pub(crate) fn gradient(width: usize, height: usize, seed: u8) -> Image {
    let plane = Plane::from_fn(width, height, |x, y| {
        ((x * 7 + y * 13 + seed as usize * 29) % 256) as f32 / 255.0
    });
    to_rgb(&plane)
}
