//! In-memory raster images.
//!
//! [`Image`] stores interleaved `f32` samples normalized to `[0, 1]`, which is
//! what registration and warping operate on. [`Plane`] is a single channel
//! view used by feature detection and resampling.

mod plane;


pub use plane::Plane;

use image as image_lib;

/// Rec. 709 luma weights used for grayscale conversion.
const LUMA_WEIGHTS: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Image dimensions: width, height, and number of channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImageDimensions {
    /// Image width in pixels
    pub width: usize,
    /// Image height in pixels
    pub height: usize,
    /// Number of channels (1 gray, 3 RGB, 4 RGBA)
    pub channels: usize,
}

impl ImageDimensions {
    pub fn new(width: usize, height: usize, channels: usize) -> Self {
        assert!(width > 0, "Width must be positive");
        assert!(height > 0, "Height must be positive");
        assert!(
            matches!(channels, 1 | 3 | 4),
            "Channels must be 1, 3 or 4, got {}",
            channels
        );
        Self {
            width,
            height,
            channels,
        }
    }

    /// Total number of samples (width * height * channels).
    pub fn sample_count(&self) -> usize {
        self.width * self.height * self.channels
    }

    /// Number of pixels in one channel plane.
    pub fn plane_len(&self) -> usize {
        self.width * self.height
    }

    pub fn has_alpha(&self) -> bool {
        self.channels == 4
    }
}

/// A decoded raster image with interleaved `f32` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    dimensions: ImageDimensions,
    pixels: Vec<f32>,
}

impl Image {
    /// Create an image from interleaved samples.
    ///
    /// # Panics
    /// Panics if `pixels.len()` does not match the dimensions.
    pub fn from_pixels(dimensions: ImageDimensions, pixels: Vec<f32>) -> Self {
        assert_eq!(
            pixels.len(),
            dimensions.sample_count(),
            "pixel count does not match {:?}",
            dimensions
        );
        Self { dimensions, pixels }
    }

    /// Build an interleaved image from one plane per channel.
    ///
    /// # Panics
    /// Panics if planes have different sizes or the plane count is not 1, 3 or 4.
    pub fn from_planes(planes: &[Plane]) -> Self {
        assert!(!planes.is_empty(), "at least one plane is required");
        let width = planes[0].width();
        let height = planes[0].height();
        let channels = planes.len();
        let dimensions = ImageDimensions::new(width, height, channels);

        let mut pixels = vec![0.0f32; dimensions.sample_count()];
        for (c, plane) in planes.iter().enumerate() {
            assert_eq!(
                (plane.width(), plane.height()),
                (width, height),
                "plane {} size mismatch",
                c
            );
            for (i, &v) in plane.data().iter().enumerate() {
                pixels[i * channels + c] = v;
            }
        }

        Self { dimensions, pixels }
    }

    pub fn dimensions(&self) -> ImageDimensions {
        self.dimensions
    }

    pub fn width(&self) -> usize {
        self.dimensions.width
    }

    pub fn height(&self) -> usize {
        self.dimensions.height
    }

    pub fn channels(&self) -> usize {
        self.dimensions.channels
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// Samples of pixel `(x, y)`, one per channel.
    pub fn pixel(&self, x: usize, y: usize) -> &[f32] {
        debug_assert!(x < self.width() && y < self.height());
        let c = self.channels();
        let idx = (y * self.width() + x) * c;
        &self.pixels[idx..idx + c]
    }

    /// Extract channel `c` as a plane.
    pub fn channel(&self, c: usize) -> Plane {
        assert!(c < self.channels(), "channel {} out of range", c);
        let channels = self.channels();
        let data = self.pixels.iter().skip(c).step_by(channels).copied().collect();
        Plane::new(self.width(), self.height(), data)
    }

    /// Luminance plane (Rec. 709). Alpha is ignored.
    pub fn to_grayscale(&self) -> Plane {
        if self.channels() == 1 {
            return Plane::new(self.width(), self.height(), self.pixels.clone());
        }

        let channels = self.channels();
        let data = self
            .pixels
            .chunks_exact(channels)
            .map(|px| px[0] * LUMA_WEIGHTS[0] + px[1] * LUMA_WEIGHTS[1] + px[2] * LUMA_WEIGHTS[2])
            .collect();
        Plane::new(self.width(), self.height(), data)
    }

    /// Same pixels with `channels` channels.
    ///
    /// Gray expands by replication, colour collapses to Rec. 709 luma, alpha
    /// is dropped or added as opaque.
    pub fn with_channels(&self, channels: usize) -> Image {
        if channels == self.channels() {
            return self.clone();
        }
        let dimensions = ImageDimensions::new(self.width(), self.height(), channels);
        if channels == 1 {
            return Self::from_pixels(dimensions, self.to_grayscale().into_data());
        }

        let src = self.channels();
        let mut pixels = Vec::with_capacity(dimensions.sample_count());
        for px in self.pixels.chunks_exact(src) {
            let rgb = if src == 1 { [px[0]; 3] } else { [px[0], px[1], px[2]] };
            pixels.extend_from_slice(&rgb);
            if channels == 4 {
                pixels.push(if src == 4 { px[3] } else { 1.0 });
            }
        }
        Self::from_pixels(dimensions, pixels)
    }

    /// Convert a decoded image. Returns `None` for zero-sized images.
    ///
    /// Gray sources keep one channel, sources with alpha become RGBA,
    /// everything else RGB.
    pub fn from_dynamic(img: &image_lib::DynamicImage) -> Option<Self> {
        let (width, height) = (img.width() as usize, img.height() as usize);
        if width == 0 || height == 0 {
            return None;
        }

        let color = img.color();
        let (channels, pixels) = if color.has_alpha() {
            (4, img.to_rgba32f().into_raw())
        } else if !color.has_color() {
            (1, img.to_luma32f().into_raw())
        } else {
            (3, img.to_rgb32f().into_raw())
        };

        Some(Self::from_pixels(
            ImageDimensions::new(width, height, channels),
            pixels,
        ))
    }

    /// Quantize to an 8-bit image for encoding.
    pub fn to_dynamic(&self) -> image_lib::DynamicImage {
        let bytes: Vec<u8> = self.pixels.iter().map(|&v| quantize_u8(v)).collect();
        let (w, h) = (self.width() as u32, self.height() as u32);

        // Buffer sizes always match the dimensions, so from_raw cannot fail.
        match self.channels() {
            1 => image_lib::DynamicImage::ImageLuma8(
                image_lib::GrayImage::from_raw(w, h, bytes).unwrap_or_default(),
            ),
            3 => image_lib::DynamicImage::ImageRgb8(
                image_lib::RgbImage::from_raw(w, h, bytes).unwrap_or_default(),
            ),
            _ => image_lib::DynamicImage::ImageRgba8(
                image_lib::RgbaImage::from_raw(w, h, bytes).unwrap_or_default(),
            ),
        }
    }
}

#[inline]
fn quantize_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}
