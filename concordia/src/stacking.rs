//! Naive long exposure: the per-pixel mean of an aligned sequence.

use std::borrow::Cow;

use rayon::prelude::*;

use crate::raster::Image;

/// Average `images` sample by sample.
///
/// The first frame fixes the size and channel count. Frames with another
/// channel count are converted, frames of another size are skipped with a
/// warning. Returns `None` for an empty sequence.
pub fn mean_stack(images: &[Image]) -> Option<Image> {
    let first = images.first()?;
    let dims = first.dimensions();

    let frames: Vec<Cow<'_, Image>> = images
        .iter()
        .enumerate()
        .filter_map(|(index, image)| {
            if (image.width(), image.height()) != (dims.width, dims.height) {
                tracing::warn!(
                    index,
                    expected = ?dims,
                    found = ?image.dimensions(),
                    "Skipping frame with mismatched size"
                );
                return None;
            }
            if image.channels() == dims.channels {
                Some(Cow::Borrowed(image))
            } else {
                tracing::debug!(index, from = image.channels(), to = dims.channels, "Converting channels");
                Some(Cow::Owned(image.with_channels(dims.channels)))
            }
        })
        .collect();

    let mut sums = vec![0.0f64; dims.sample_count()];
    let row_len = dims.width * dims.channels;
    sums.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            let start = y * row_len;
            for frame in &frames {
                let src = &frame.pixels()[start..start + row_len];
                for (acc, &v) in row.iter_mut().zip(src) {
                    *acc += v as f64;
                }
            }
        });

    let n = frames.len() as f64;
    let pixels = sums.into_iter().map(|s| (s / n) as f32).collect();
    tracing::debug!(frames = frames.len(), skipped = images.len() - frames.len(), "Stacked frames");
    Some(Image::from_pixels(dims, pixels))
}
