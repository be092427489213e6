//! Shared utilities for the concordia workspace.

pub mod cancel;
pub mod file_utils;
pub mod fnv;
pub mod log_setup;
pub mod test_utils;

pub use cancel::CancelFlag;
pub use fnv::FnvHasher;
