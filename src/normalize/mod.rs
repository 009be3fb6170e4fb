//! Rescaling of pixel samples into an 8-bit display range.

use crate::dicom::PixelMatrix;
use crate::error::{ConvertError, Result};

/// 8-bit image with the source matrix's geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Samples per pixel (1 = grayscale, 3 = RGB).
    pub channels: u16,
    /// Row-major, channel-interleaved 8-bit samples.
    pub pixels: Vec<u8>,
}

impl NormalizedImage {
    /// Expected pixel buffer length for the declared geometry.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}

/// Linear stretch of `[0, max]` onto `[0, 255]`.
///
/// Negative samples clamp to zero, the observed maximum maps to 255, results
/// are truncated. An image whose maximum is not positive has no dynamic
/// range and is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct PixelNormalizer;

impl PixelNormalizer {
    /// Create a normalizer.
    pub fn new() -> Self {
        Self
    }

    /// Normalize a borrowed pixel matrix into a new 8-bit image.
    pub fn normalize(&self, matrix: &PixelMatrix) -> Result<NormalizedImage> {
        let samples = matrix.samples();
        if samples.is_empty() {
            return Err(ConvertError::Normalization("image has no samples".into()));
        }

        let max = samples.values().fold(f64::NEG_INFINITY, f64::max);
        if max <= 0.0 {
            return Err(ConvertError::Normalization(format!(
                "no dynamic range (maximum sample value {})",
                max
            )));
        }

        let pixels = samples
            .values()
            .map(|v| ((v.max(0.0) / max) * 255.0) as u8)
            .collect();

        log::debug!(
            "Normalized {}x{} image (max sample {})",
            matrix.columns(),
            matrix.rows(),
            max
        );

        Ok(NormalizedImage {
            width: matrix.columns(),
            height: matrix.rows(),
            channels: matrix.samples_per_pixel(),
            pixels,
        })
    }
}
