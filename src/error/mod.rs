//! Error types for the DICOM conversion library.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result type alias for the library.
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Main error type for the conversion library.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Compression method identifier not present in the registry.
    #[error("Unsupported compression method: {0}")]
    UnsupportedMethod(String),

    /// A known method failed on the given payload (corrupt input, empty output).
    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    /// Base64 decoding or raster encoding failure.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Bytes do not form a readable DICOM container.
    #[error("DICOM parse error: {0}")]
    ContainerParse(String),

    /// Valid container lacking a required attribute.
    #[error("Missing DICOM attribute: {0}")]
    MissingField(String),

    /// Degenerate pixel data (e.g. zero dynamic range).
    #[error("Normalization error: {0}")]
    Normalization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    /// Tag identifying the error class, independent of the message.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::UnsupportedMethod(_) => ErrorKind::UnsupportedMethod,
            ConvertError::DecompressionFailed(_) => ErrorKind::DecompressionFailed,
            ConvertError::Encoding(_) => ErrorKind::EncodingError,
            ConvertError::ContainerParse(_) => ErrorKind::ContainerParseError,
            ConvertError::MissingField(_) => ErrorKind::MissingField,
            ConvertError::Normalization(_) => ErrorKind::NormalizationError,
            ConvertError::Config(_) | ConvertError::Io(_) => ErrorKind::Internal,
        }
    }
}

impl From<dicom::object::ReadError> for ConvertError {
    fn from(err: dicom::object::ReadError) -> Self {
        ConvertError::ContainerParse(err.to_string())
    }
}

impl From<base64::DecodeError> for ConvertError {
    fn from(err: base64::DecodeError) -> Self {
        ConvertError::Encoding(format!("invalid base64: {}", err))
    }
}

impl From<image::ImageError> for ConvertError {
    fn from(err: image::ImageError) -> Self {
        ConvertError::Encoding(err.to_string())
    }
}

impl From<toml::de::Error> for ConvertError {
    fn from(err: toml::de::Error) -> Self {
        ConvertError::Config(err.to_string())
    }
}

/// Externally visible error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown compression identifier (client input problem).
    UnsupportedMethod,
    /// Known method, corrupt payload.
    DecompressionFailed,
    /// Base64 or raster encoding failure.
    EncodingError,
    /// Not a valid DICOM container.
    ContainerParseError,
    /// Required attribute absent.
    MissingField,
    /// Degenerate pixel data.
    NormalizationError,
    /// Configuration or I/O failure outside the pipeline proper.
    Internal,
}

impl ErrorKind {
    /// Snake-case tag, as serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedMethod => "unsupported_method",
            ErrorKind::DecompressionFailed => "decompression_failed",
            ErrorKind::EncodingError => "encoding_error",
            ErrorKind::ContainerParseError => "container_parse_error",
            ErrorKind::MissingField => "missing_field",
            ErrorKind::NormalizationError => "normalization_error",
            ErrorKind::Internal => "internal",
        }
    }

    /// Whether the failure is attributable to the caller's input method choice.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ErrorKind::UnsupportedMethod)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Strategy lookup, decompression and base64 unwrapping.
    Decompression,
    /// DICOM container parsing.
    Parsing,
    /// Pixel rescaling to 8 bits.
    Normalization,
    /// Raster encoding and base64 wrapping of the output.
    Encoding,
    /// Metadata extraction.
    AttributeExtraction,
}

impl Stage {
    /// Snake-case stage name, as serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Decompression => "decompression",
            Stage::Parsing => "parsing",
            Stage::Normalization => "normalization",
            Stage::Encoding => "encoding",
            Stage::AttributeExtraction => "attribute_extraction",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conversion failure annotated with the stage it came from.
#[derive(Error, Debug)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    /// Stage that failed.
    pub stage: Stage,
    /// Underlying error.
    #[source]
    pub source: ConvertError,
}

impl PipelineError {
    /// Wrap an error with its stage.
    pub fn new(stage: Stage, source: ConvertError) -> Self {
        Self { stage, source }
    }

    /// Error classification of the underlying cause.
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// Extension for tagging a `Result` with the stage it belongs to.
pub trait StageExt<T> {
    /// Attach `stage` to the error, if any.
    fn at_stage(self, stage: Stage) -> std::result::Result<T, PipelineError>;
}

impl<T> StageExt<T> for Result<T> {
    fn at_stage(self, stage: Stage) -> std::result::Result<T, PipelineError> {
        self.map_err(|e| PipelineError::new(stage, e))
    }
}
