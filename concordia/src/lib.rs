//! Concordia - image sequence alignment with a disk-backed cache.
//!
//! Reads an ordered sequence of frames from a directory, aligns every frame
//! to a reference frame and persists the aligned sequence so the expensive
//! part runs at most once per input set.
//!
//! - Image store: decode, filter, rescale and write frame sequences
//! - Registration: feature detection, matching, RANSAC and warping
//! - Cache gate: reuse or recompute aligned frames
//! - Stacking: naive long exposure of an aligned sequence
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::path::Path;
//!
//! let images = concordia::read_all(Path::new("shots"), 0.5);
//! let aligned = concordia::get_aligned_images(
//!     images,
//!     true,
//!     Some(Path::new("shots/aligned_images")),
//! )?;
//! let blurred = concordia::mean_stack(&aligned);
//! ```

pub mod cache;
mod error;
pub mod math;
pub mod pipeline;
mod raster;
pub mod registration;
mod stacking;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Core types
// ============================================================================

pub use error::{Error, Result};
pub use raster::{Image, ImageDimensions, Plane};

// ============================================================================
// Image store
// ============================================================================

pub use store::{RESERVED_NAMES, read_all, read_image, write_all, write_image};

// ============================================================================
// Cache and pipeline
// ============================================================================

pub use cache::{CacheGate, CacheOutcome, CacheResolution, CacheValidation};
pub use pipeline::{Pipeline, PipelineConfig, get_aligned_images};

// ============================================================================
// Registration
// ============================================================================

pub use registration::{
    AlignFailure, AlignProgress, AlignStage, AlignedSequence, Aligner, FallbackPolicy,
    FrameReport, FrameStatus, InterpolationMethod, ProgressCallback, RegistrationConfig,
    Registrator, Transform, TransformType,
};

// ============================================================================
// Stacking
// ============================================================================

pub use stacking::mean_stack;
