//! Raster encoders for normalized images.
//!
//! This module provides the `ImageEncoder` trait and a PNG implementation
//! backed by the `image` crate.

mod png;
mod traits;

pub use png::PngEncoder;
pub use traits::ImageEncoder;
