//! Raster encoder trait definitions.

use crate::error::Result;
use crate::normalize::NormalizedImage;

/// Trait for encoders turning a normalized image into a raster file.
pub trait ImageEncoder: Send + Sync {
    /// Encode the image into a complete file byte stream.
    ///
    /// # Arguments
    /// * `image` - 8-bit image, 1 (grayscale) or 3 (RGB) channels
    ///
    /// # Returns
    /// Encoded file bytes.
    fn encode(&self, image: &NormalizedImage) -> Result<Vec<u8>>;

    /// Short format name (e.g. "PNG").
    fn format_name(&self) -> &'static str;
}
