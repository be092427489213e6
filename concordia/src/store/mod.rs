//! Directory-backed image store.
//!
//! Reads every decodable image in a directory in file-name order and writes
//! sequences as zero-padded `img_NNN.png` files.


use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageError, ImageFormat, ImageReader};
use image::imageops::FilterType;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::raster::Image;

/// Entry names that belong to the processing pipeline, never to the input.
pub const RESERVED_NAMES: [&str; 5] = [
    "aligned_images",
    "output",
    "flow_map",
    "output_initial",
    "output_initial2",
];

const FILE_PREFIX: &str = "img_";
const MIN_INDEX_DIGITS: usize = 3;

/// Decode every image in `directory`, in file-name order.
///
/// Reserved names and sub-directories are skipped, undecodable or empty
/// files are dropped (logged at debug). `scale != 1.0` resizes each image to
/// `round(w * scale) x round(h * scale)`, at least 1x1. A missing directory
/// yields an empty sequence.
///
/// # Panics
/// Panics if `scale` is not a positive finite number.
pub fn read_all(directory: &Path, scale: f64) -> Vec<Image> {
    assert!(
        scale.is_finite() && scale > 0.0,
        "scale must be positive, got {}",
        scale
    );
    if !directory.is_dir() {
        tracing::warn!(directory = %directory.display(), "Image directory does not exist");
        return Vec::new();
    }

    let files = common::file_utils::sorted_files(directory, &RESERVED_NAMES);
    let images = read_files(&files, scale);
    tracing::info!(
        directory = %directory.display(),
        entries = files.len(),
        images = images.len(),
        "Read image sequence"
    );
    images
}

/// Decode `files` in order, dropping the ones that fail.
pub(crate) fn read_files(files: &[PathBuf], scale: f64) -> Vec<Image> {
    files
        .par_iter()
        .filter_map(|path| match read_scaled(path, scale) {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping entry");
                None
            }
        })
        .collect()
}

/// Decode one image file.
pub fn read_image(path: &Path) -> Result<Image> {
    read_scaled(path, 1.0)
}

fn read_scaled(path: &Path, scale: f64) -> Result<Image> {
    let read_error = |source| Error::ReadImage {
        path: path.to_path_buf(),
        source,
    };
    // Sniff the content so files without a known extension still decode.
    let mut dynamic = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| read_error(ImageError::IoError(e)))?
        .decode()
        .map_err(read_error)?;

    if scale != 1.0 && dynamic.width() > 0 && dynamic.height() > 0 {
        let (w, h) = scaled_size(dynamic.width(), dynamic.height(), scale);
        dynamic = dynamic.resize_exact(w, h, FilterType::Triangle);
    }

    Image::from_dynamic(&dynamic).ok_or_else(|| Error::EmptyImage {
        path: path.to_path_buf(),
    })
}

fn scaled_size(width: u32, height: u32, scale: f64) -> (u32, u32) {
    let scale_dim = |d: u32| ((d as f64 * scale).round() as u32).max(1);
    (scale_dim(width), scale_dim(height))
}

/// Encode one image; the format follows the file extension.
pub fn write_image(path: &Path, image: &Image) -> Result<()> {
    image
        .to_dynamic()
        .save(path)
        .map_err(|source| Error::WriteImage {
            path: path.to_path_buf(),
            source,
        })
}

/// File name of frame `index` in a sequence of `len` frames.
pub fn sequence_file_name(index: usize, len: usize) -> String {
    let digits = len
        .saturating_sub(1)
        .to_string()
        .len()
        .max(MIN_INDEX_DIGITS);
    format!("{}{:0width$}.png", FILE_PREFIX, index, width = digits)
}

/// Whether `name` looks like a file written by [`write_all`].
pub(crate) fn is_sequence_file_name(name: &str) -> bool {
    name.strip_prefix(FILE_PREFIX)
        .and_then(|rest| rest.strip_suffix(".png"))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Write `images` as `img_000.png`, `img_001.png`, ... into `directory`,
/// creating it if needed and overwriting files of the same name.
pub fn write_all(directory: &Path, images: &[Image]) -> Result<()> {
    fs::create_dir_all(directory).map_err(|source| Error::CreateDir {
        path: directory.to_path_buf(),
        source,
    })?;

    images.par_iter().enumerate().try_for_each(|(i, image)| {
        let path = directory.join(sequence_file_name(i, images.len()));
        image
            .to_dynamic()
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|source| Error::WriteImage { path, source })
    })?;

    tracing::info!(
        directory = %directory.display(),
        images = images.len(),
        "Wrote image sequence"
    );
    Ok(())
}
