//! DICOM Conversion Library
//!
//! Turns a compressed, transport-encoded DICOM payload into a displayable
//! 8-bit PNG plus a small set of diagnostic attributes.
//!
//! # Pipeline
//!
//! 1. **Decompression**: look up the payload's method in a
//!    [`MethodRegistry`](compression::MethodRegistry), expand it and, when the
//!    payload says so, unwrap base64
//! 2. **Parsing**: read the DICOM container once into memory
//! 3. **Normalization**: clamp negatives, stretch `[0, max]` onto `[0, 255]`
//! 4. **Encoding**: write a PNG and wrap it in base64
//! 5. **Attribute extraction**: pixel spacing and `[columns, rows]`
//!
//! Failures carry the [`Stage`] they came from.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use medimg_convert::{CompressedPayload, ConversionPipeline};
//!
//! let pipeline = ConversionPipeline::default();
//! let payload = CompressedPayload::new(compressed_text, "lz", true);
//!
//! let result = pipeline.convert(&payload)?;
//! println!("{:?}", result.attributes.image_size);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attributes;
pub mod cli;
pub mod codec;
pub mod compression;
pub mod config;
pub mod dicom;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod service;

use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use attributes::{AttributeExtractor, ImageAttributes};
pub use codec::{ImageEncoder, PngEncoder};
pub use compression::{DecompressionStrategy, Decompressor, MethodRegistry};
pub use config::{MethodId, ResponseFormat, ServiceConfig};
pub use dicom::{ContainerMetadata, ParsedContainer, PixelMatrix};
pub use error::{ConvertError, ErrorKind, PipelineError, Result, Stage};
pub use normalize::{NormalizedImage, PixelNormalizer};
pub use pipeline::{ConversionPipeline, ConversionResult, PipelineBuilder};
pub use service::{ConversionService, ConvertRequest, ServiceResponse};

/// A compressed DICOM payload as received from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedPayload {
    /// Compressed text.
    pub raw_data: String,
    /// Compression method identifier, e.g. `"lz"`.
    pub method: String,
    /// Whether the decompressed text is base64 of the container bytes.
    pub is_base64_encoded: bool,
}

impl CompressedPayload {
    /// Create a new payload.
    pub fn new(
        raw_data: impl Into<String>,
        method: impl Into<String>,
        is_base64_encoded: bool,
    ) -> Self {
        Self {
            raw_data: raw_data.into(),
            method: method.into(),
            is_base64_encoded,
        }
    }

    /// Build a payload from container bytes the way a front end does.
    ///
    /// With `base64_wrap` off the bytes are carried as a binary string, one
    /// character per byte.
    pub fn pack(container: &[u8], method: MethodId, base64_wrap: bool) -> Self {
        let text = if base64_wrap {
            compression::encode_base64(container)
        } else {
            compression::encode_binary_string(container)
        };

        let raw_data = match method {
            MethodId::None => text,
            MethodId::Lz => compression::lzstring::compress_to_base64(&text),
            MethodId::LzUri => compression::lzstring::compress_to_encoded_uri_component(&text),
        };

        Self::new(raw_data, method.as_str(), base64_wrap)
    }
}

/// Library version information.
pub mod version {
    /// Library version string.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Library name.
    pub const NAME: &str = env!("CARGO_PKG_NAME");

    /// Get full version string.
    pub fn full_version() -> String {
        format!("{} {}", NAME, VERSION)
    }
}
