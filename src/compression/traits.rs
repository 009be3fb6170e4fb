//! Decompression strategy trait.

use crate::error::Result;

/// A decompression algorithm selectable by method identifier.
///
/// Strategies are stateless and shared across requests, so they must be
/// `Send + Sync`.
pub trait DecompressionStrategy: Send + Sync {
    /// Decompress `compressed` into text.
    ///
    /// Implementations report corrupt input as
    /// [`ConvertError::DecompressionFailed`](crate::error::ConvertError::DecompressionFailed).
    fn decompress(&self, compressed: &str) -> Result<String>;

    /// Human-readable algorithm name, for logging.
    fn name(&self) -> &'static str;
}
