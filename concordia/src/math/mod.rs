//! Small linear-algebra helpers shared by registration.

mod dmat3;

pub use dmat3::DMat3;
