//! Identity strategy.

use crate::error::Result;

use super::traits::DecompressionStrategy;

/// Passthrough for payloads that were never compressed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl DecompressionStrategy for NoCompression {
    fn decompress(&self, compressed: &str) -> Result<String> {
        Ok(compressed.to_string())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}
