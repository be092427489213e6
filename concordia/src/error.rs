//! Hard failures surfaced to callers.
//!
//! Batch operations absorb per-file decode problems and per-frame
//! registration failures where they happen. What reaches the pipeline caller
//! is limited to failures that would silently lose computed work: creating
//! the cache directory and writing images or the manifest.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by image I/O and the cache.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to decode image '{path}': {source}")]
    ReadImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Image '{path}' has no pixels")]
    EmptyImage { path: PathBuf },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write image '{path}': {source}")]
    WriteImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to write cache manifest '{path}': {source}")]
    WriteManifest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize cache manifest: {0}")]
    SerializeManifest(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
