//! PNG encoding via the `image` crate.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};

use crate::error::{ConvertError, Result};
use crate::normalize::NormalizedImage;

use super::traits::ImageEncoder;

/// Lossless PNG encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngEncoder;

impl PngEncoder {
    /// Create a PNG encoder.
    pub fn new() -> Self {
        Self
    }

    fn to_dynamic(image: &NormalizedImage) -> Result<DynamicImage> {
        if image.pixels.len() != image.expected_len() {
            return Err(ConvertError::Encoding(format!(
                "pixel buffer size mismatch: expected {} bytes, got {}",
                image.expected_len(),
                image.pixels.len()
            )));
        }

        let buffer = image.pixels.clone();
        let dynamic = match image.channels {
            1 => GrayImage::from_raw(image.width, image.height, buffer).map(DynamicImage::ImageLuma8),
            3 => RgbImage::from_raw(image.width, image.height, buffer).map(DynamicImage::ImageRgb8),
            other => {
                return Err(ConvertError::Encoding(format!(
                    "unsupported channel count for PNG: {}",
                    other
                )))
            }
        };

        dynamic.ok_or_else(|| ConvertError::Encoding("failed to create image buffer".into()))
    }
}

impl ImageEncoder for PngEncoder {
    fn encode(&self, image: &NormalizedImage) -> Result<Vec<u8>> {
        let dynamic = Self::to_dynamic(image)?;

        let mut out = Cursor::new(Vec::new());
        dynamic.write_to(&mut out, ImageFormat::Png)?;
        let bytes = out.into_inner();

        log::debug!(
            "PNG encoded {}x{} image to {} bytes",
            image.width,
            image.height,
            bytes.len()
        );

        Ok(bytes)
    }

    fn format_name(&self) -> &'static str {
        "PNG"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn gray(width: u32, height: u32) -> NormalizedImage {
        NormalizedImage {
            width,
            height,
            channels: 1,
            pixels: (0..width * height).map(|i| (i % 256) as u8).collect(),
        }
    }

    #[test]
    fn test_png_round_trip_dimensions() {
        let image = gray(7, 5);
        let bytes = PngEncoder::new().encode(&image).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap();
        assert_eq!(decoded.dimensions(), (7, 5));
        assert_eq!(decoded.to_luma8().into_raw(), image.pixels);
    }

    #[test]
    fn test_png_rgb() {
        let image = NormalizedImage {
            width: 2,
            height: 1,
            channels: 3,
            pixels: vec![255, 0, 0, 0, 0, 255],
        };
        let bytes = PngEncoder::new().encode(&image).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.to_rgb8().into_raw(), image.pixels);
    }

    #[test]
    fn test_png_rejects_bad_buffers() {
        let mut image = gray(4, 4);
        image.pixels.pop();
        assert!(matches!(
            PngEncoder::new().encode(&image),
            Err(ConvertError::Encoding(_))
        ));

        let image = NormalizedImage {
            width: 1,
            height: 1,
            channels: 2,
            pixels: vec![0, 0],
        };
        assert!(matches!(
            PngEncoder::new().encode(&image),
            Err(ConvertError::Encoding(_))
        ));
    }
}
