//! Cache manifest: what a cache directory was computed from.

use std::fs;
use std::hash::Hasher;
use std::path::Path;

use common::FnvHasher;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::raster::Image;

pub const MANIFEST_FILE: &str = "cache_manifest.json";

/// Bump when the fingerprint recipe or the output format changes.
const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    pub version: u32,
    pub fingerprint: String,
    pub frame_count: usize,
    pub file_names: Vec<String>,
}

impl CacheManifest {
    pub fn new(fingerprint: String, file_names: Vec<String>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            fingerprint,
            frame_count: file_names.len(),
            file_names,
        }
    }

    /// Load `dir/cache_manifest.json`. Missing or unparsable manifests are
    /// `None`: both just mean the cache cannot be trusted.
    pub fn load(dir: &Path) -> Option<Self> {
        let path = dir.join(MANIFEST_FILE);
        let text = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<CacheManifest>(&text) {
            Ok(manifest) if manifest.version == MANIFEST_VERSION => Some(manifest),
            Ok(manifest) => {
                tracing::debug!(version = manifest.version, "Ignoring manifest from another version");
                None
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Unreadable cache manifest");
                None
            }
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).map_err(|source| Error::WriteManifest { path, source })
    }

    /// The manifest describes `file_names` with the same count.
    pub fn is_consistent(&self) -> bool {
        self.frame_count == self.file_names.len()
    }
}

/// FNV-1a digest of the input frames (dimensions and samples) and the
/// aligner parameters.
pub fn fingerprint(images: &[Image], parameters: &str) -> String {
    let mut hasher = FnvHasher::new();
    hasher.write_u32(MANIFEST_VERSION);
    hasher.write_u64(images.len() as u64);
    for image in images {
        let dims = image.dimensions();
        hasher.write_u64(dims.width as u64);
        hasher.write_u64(dims.height as u64);
        hasher.write_u64(dims.channels as u64);
        hasher.write_f32_slice(image.pixels());
    }
    hasher.write(parameters.as_bytes());
    hasher.hex_digest()
}
