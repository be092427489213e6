//! Deterministic FNV-1a hasher.
//!
//! `DefaultHasher` uses random seeds, producing different hashes across process
//! invocations. FNV-1a is deterministic, so its output can be persisted and
//! compared on a later run (cache fingerprints, file names).

use std::hash::Hasher;

const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const PRIME: u64 = 0x100000001b3;

/// FNV-1a 64-bit hasher with fixed seed.
#[derive(Debug, Clone)]
pub struct FnvHasher(u64);

impl FnvHasher {
    pub fn new() -> Self {
        Self(OFFSET_BASIS)
    }

    /// Feed a slice of `f32` values by their bit patterns.
    pub fn write_f32_slice(&mut self, values: &[f32]) {
        for v in values {
            self.write(&v.to_bits().to_le_bytes());
        }
    }

    /// Hex string of the current state, 16 characters.
    pub fn hex_digest(&self) -> String {
        format!("{:016x}", self.finish())
    }
}

impl Default for FnvHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(PRIME);
        }
    }
}
