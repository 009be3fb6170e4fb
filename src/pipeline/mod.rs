//! Conversion pipeline module.
//!
//! This module orchestrates the conversion workflow: decompress the payload,
//! parse the DICOM container once, then render the image and extract the
//! attributes from that same parsed container.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::attributes::{AttributeExtractor, ImageAttributes};
use crate::codec::{ImageEncoder, PngEncoder};
use crate::compression::{encode_base64, Decompressor, MethodRegistry};
use crate::dicom::ParsedContainer;
use crate::error::{PipelineError, Stage, StageExt};
use crate::normalize::PixelNormalizer;
use crate::CompressedPayload;

/// Result type for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Result of a conversion, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    /// Base64 of the encoded raster image.
    pub encoded_image: String,
    /// Diagnostic attributes.
    pub attributes: ImageAttributes,
}

/// Rendered image bytes with attributes, before base64 wrapping.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    /// Encoded raster file bytes.
    pub image: Vec<u8>,
    /// Diagnostic attributes.
    pub attributes: ImageAttributes,
}

/// Conversion pipeline from compressed payload to displayable image.
///
/// The pipeline holds only read-only state and can be shared between
/// threads; every call allocates its own working buffers.
pub struct ConversionPipeline {
    decompressor: Decompressor,
    normalizer: PixelNormalizer,
    encoder: Arc<dyn ImageEncoder>,
    extractor: AttributeExtractor,
}

impl ConversionPipeline {
    /// Create a pipeline over the given registry, encoding PNG.
    pub fn new(registry: MethodRegistry) -> Self {
        PipelineBuilder::new().registry(registry).build()
    }

    /// Start building a pipeline.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Convert a payload into a base64 image and attributes.
    pub fn convert(&self, payload: &CompressedPayload) -> PipelineResult<ConversionResult> {
        let rendered = self.render(payload)?;
        Ok(ConversionResult {
            encoded_image: encode_base64(&rendered.image),
            attributes: rendered.attributes,
        })
    }

    /// Convert a payload into raw image bytes and attributes.
    pub fn render(&self, payload: &CompressedPayload) -> PipelineResult<RenderedImage> {
        let start = Instant::now();

        let bytes = self
            .decompressor
            .decompress(payload)
            .at_stage(Stage::Decompression)?;
        log::debug!(
            "Decompressed {} payload to {} bytes",
            payload.method,
            bytes.len()
        );

        let container = ParsedContainer::from_bytes(&bytes).at_stage(Stage::Parsing)?;
        drop(bytes);

        let rendered = self.render_container(&container)?;

        log::info!(
            "Converted {}x{} image ({} bytes {}) in {} ms",
            rendered.attributes.image_size[0],
            rendered.attributes.image_size[1],
            rendered.image.len(),
            self.encoder.format_name(),
            start.elapsed().as_millis()
        );

        Ok(rendered)
    }

    /// Render an already parsed container.
    pub fn render_container(&self, container: &ParsedContainer) -> PipelineResult<RenderedImage> {
        let matrix = container.pixel_matrix().at_stage(Stage::Parsing)?;
        let normalized = self.normalizer.normalize(matrix).at_stage(Stage::Normalization)?;
        let image = self.encoder.encode(&normalized).at_stage(Stage::Encoding)?;

        let attributes = self
            .extractor
            .extract(container)
            .at_stage(Stage::AttributeExtraction)?;

        Ok(RenderedImage { image, attributes })
    }
}

impl Default for ConversionPipeline {
    fn default() -> Self {
        Self::new(MethodRegistry::with_defaults())
    }
}

/// Builder for creating conversion pipelines with custom settings.
pub struct PipelineBuilder {
    registry: MethodRegistry,
    encoder: Arc<dyn ImageEncoder>,
}

impl PipelineBuilder {
    /// Create a new pipeline builder with default settings.
    pub fn new() -> Self {
        Self {
            registry: MethodRegistry::with_defaults(),
            encoder: Arc::new(PngEncoder::new()),
        }
    }

    /// Set the decompression method registry.
    pub fn registry(mut self, registry: MethodRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the raster encoder.
    pub fn encoder(mut self, encoder: Arc<dyn ImageEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Build the conversion pipeline.
    pub fn build(self) -> ConversionPipeline {
        ConversionPipeline {
            decompressor: Decompressor::new(self.registry),
            normalizer: PixelNormalizer::new(),
            encoder: self.encoder,
            extractor: AttributeExtractor::new(),
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use image::GenericImageView;

    use super::*;
    use crate::compression::lzstring;
    use crate::config::MethodId;
    use crate::dicom::testing::{image_object, mono16, to_part10};
    use crate::error::{ConvertError, ErrorKind, Result};
    use crate::normalize::NormalizedImage;

    fn ramp_fixture(rows: u16, columns: u16) -> Vec<u8> {
        let samples: Vec<u16> = (0..rows as u32 * columns as u32)
            .map(|i| (i * 13 % 4096) as u16)
            .collect();
        to_part10(mono16(rows, columns, &samples))
    }

    fn lz_payload(dicom: &[u8]) -> CompressedPayload {
        CompressedPayload::new(lzstring::compress_to_base64(&encode_base64(dicom)), "lz", true)
    }

    #[test]
    fn test_end_to_end_lz_base64() {
        let pipeline = ConversionPipeline::default();
        let result = pipeline.convert(&lz_payload(&ramp_fixture(24, 40))).unwrap();

        assert_eq!(result.attributes.image_size, [40, 24]);
        assert_eq!(result.attributes.pixel_spacing, 0.5);

        let png = base64::engine::general_purpose::STANDARD
            .decode(&result.encoded_image)
            .unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.dimensions(), (40, 24));
    }

    #[test]
    fn test_end_to_end_none_base64() {
        let pipeline = ConversionPipeline::default();
        let dicom = ramp_fixture(8, 8);
        let payload = CompressedPayload::new(encode_base64(&dicom), "none", true);
        let rendered = pipeline.render(&payload).unwrap();
        assert_eq!(rendered.attributes.image_size, [8, 8]);

        let decoded = image::load_from_memory(&rendered.image).unwrap().to_luma8();
        assert_eq!(decoded.dimensions(), (8, 8));
        assert_eq!(decoded.into_raw().iter().copied().max(), Some(255));
    }

    #[test]
    fn test_unknown_method_fails_before_decompression() {
        let pipeline = ConversionPipeline::default();
        let err = pipeline
            .convert(&CompressedPayload::new("HelloWorld", "unknown", true))
            .unwrap_err();
        assert_eq!(err.stage, Stage::Decompression);
        assert_eq!(err.kind(), ErrorKind::UnsupportedMethod);
    }

    #[test]
    fn test_corrupt_lz_fails_in_decompression() {
        let pipeline = ConversionPipeline::default();
        let err = pipeline
            .convert(&CompressedPayload::new("HelloWorld", "lz", true))
            .unwrap_err();
        assert_eq!(err.stage, Stage::Decompression);
        assert_eq!(err.kind(), ErrorKind::DecompressionFailed);
    }

    #[test]
    fn test_plain_text_fails_in_parsing() {
        let pipeline = ConversionPipeline::default();
        let err = pipeline
            .convert(&CompressedPayload::new("HelloWorld", "none", false))
            .unwrap_err();
        assert_eq!(err.stage, Stage::Parsing);
        assert_eq!(err.kind(), ErrorKind::ContainerParseError);
    }

    #[test]
    fn test_blank_image_fails_in_normalization() {
        let pipeline = ConversionPipeline::default();
        let dicom = to_part10(mono16(4, 4, &[0; 16]));
        let err = pipeline.convert(&lz_payload(&dicom)).unwrap_err();
        assert_eq!(err.stage, Stage::Normalization);
        assert_eq!(err.kind(), ErrorKind::NormalizationError);
    }

    #[test]
    fn test_missing_pixel_data_fails_in_parsing() {
        let mut object = image_object(2, 2, 8, false, 1, vec![1, 2, 3, 4]);
        object.take_element(dicom::dictionary_std::tags::PIXEL_DATA).unwrap();
        let dicom = to_part10(object);

        let err = ConversionPipeline::default()
            .convert(&lz_payload(&dicom))
            .unwrap_err();
        assert_eq!(err.stage, Stage::Parsing);
        assert_eq!(err.kind(), ErrorKind::MissingField);
    }

    #[test]
    fn test_missing_spacing_fails_in_attribute_extraction() {
        let mut object = image_object(2, 2, 8, false, 1, vec![1, 2, 3, 4]);
        object.take_element(dicom::dictionary_std::tags::PIXEL_SPACING).unwrap();
        let dicom = to_part10(object);

        let err = ConversionPipeline::default()
            .convert(&lz_payload(&dicom))
            .unwrap_err();
        assert_eq!(err.stage, Stage::AttributeExtraction);
        assert_eq!(err.kind(), ErrorKind::MissingField);
    }

    #[test]
    fn test_custom_encoder_failure_is_tagged() {
        struct Failing;

        impl ImageEncoder for Failing {
            fn encode(&self, _image: &NormalizedImage) -> Result<Vec<u8>> {
                Err(ConvertError::Encoding("disk full".into()))
            }

            fn format_name(&self) -> &'static str {
                "FAIL"
            }
        }

        let pipeline = ConversionPipeline::builder()
            .registry(MethodRegistry::with_methods(&[MethodId::Lz]))
            .encoder(Arc::new(Failing))
            .build();
        let err = pipeline.convert(&lz_payload(&ramp_fixture(2, 2))).unwrap_err();
        assert_eq!(err.stage, Stage::Encoding);
        assert_eq!(err.kind(), ErrorKind::EncodingError);
    }

    #[test]
    fn test_concurrent_conversions() {
        let pipeline = Arc::new(ConversionPipeline::default());
        let payloads: Vec<(u16, CompressedPayload)> = (1..=4u16)
            .map(|n| (n, lz_payload(&ramp_fixture(n * 3, n * 5))))
            .collect();

        std::thread::scope(|scope| {
            for (n, payload) in &payloads {
                let pipeline = Arc::clone(&pipeline);
                scope.spawn(move || {
                    let result = pipeline.convert(payload).unwrap();
                    assert_eq!(result.attributes.image_size, [u32::from(*n) * 5, u32::from(*n) * 3]);
                });
            }
        });
    }
}
