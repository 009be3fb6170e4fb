//! Request handling boundary.
//!
//! [`ConversionService`] authenticates a caller, runs the conversion pipeline
//! and maps the outcome onto a status code and JSON body. It does not listen
//! on a socket; a transport layer hands it the `Authorization` value and the
//! deserialized request.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use subtle::ConstantTimeEq;

use crate::config::{ResponseFormat, ServiceConfig};
use crate::error::{ErrorKind, PipelineError};
use crate::pipeline::ConversionPipeline;
use crate::CompressedPayload;

/// Conversion request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertRequest {
    /// Compression method identifier.
    #[serde(alias = "compression_method")]
    pub compression: String,
    /// Compressed payload text.
    #[serde(alias = "compressed_data", alias = "image")]
    pub data: String,
    /// Whether the decompressed text is base64.
    #[serde(alias = "is_encoded")]
    pub encoded: bool,
}

impl ConvertRequest {
    /// View the request as a pipeline payload.
    pub fn to_payload(&self) -> CompressedPayload {
        CompressedPayload::new(self.data.clone(), self.compression.clone(), self.encoded)
    }
}

/// Status code and JSON body produced for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceResponse {
    /// HTTP-style status code.
    pub status: u16,
    /// Response body.
    pub body: Value,
}

impl ServiceResponse {
    /// Status 200.
    pub const OK: u16 = 200;
    /// Status 400.
    pub const BAD_REQUEST: u16 = 400;
    /// Status 403.
    pub const FORBIDDEN: u16 = 403;
    /// Status 500.
    pub const INTERNAL_ERROR: u16 = 500;

    /// Whether the request succeeded.
    pub fn is_success(&self) -> bool {
        self.status == Self::OK
    }

    fn forbidden() -> Self {
        Self {
            status: Self::FORBIDDEN,
            body: json!({
                "error": {
                    "kind": "forbidden",
                    "stage": null,
                    "message": "Invalid access token",
                }
            }),
        }
    }

    fn from_pipeline_error(err: &PipelineError) -> Self {
        let kind = err.kind();
        let status = if kind.is_client_error() {
            Self::BAD_REQUEST
        } else {
            Self::INTERNAL_ERROR
        };

        Self {
            status,
            body: json!({
                "error": {
                    "kind": kind,
                    "stage": err.stage,
                    "message": public_message(kind),
                }
            }),
        }
    }
}

/// Client-facing text per error kind. Internal details stay in the log.
fn public_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::UnsupportedMethod => "Compression method is not supported",
        ErrorKind::DecompressionFailed => "Payload could not be decompressed",
        ErrorKind::EncodingError => "Payload or image encoding failed",
        ErrorKind::ContainerParseError => "Payload is not a readable DICOM container",
        ErrorKind::MissingField => "DICOM container lacks a required attribute",
        ErrorKind::NormalizationError => "Image has no displayable dynamic range",
        ErrorKind::Internal => "Internal error",
    }
}

/// Bearer token check against the configured secret.
#[derive(Clone)]
pub struct Authenticator {
    secret: Option<Vec<u8>>,
}

impl Authenticator {
    /// Create an authenticator; `None` or an empty secret denies everyone.
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()).map(|s| s.as_bytes().to_vec()),
        }
    }

    /// Check an `Authorization` value, either `Bearer <token>` or a bare token.
    /// The scheme name is case-insensitive.
    pub fn verify(&self, authorization: Option<&str>) -> bool {
        let (Some(secret), Some(value)) = (self.secret.as_deref(), authorization) else {
            return false;
        };

        let value = value.trim();
        let token = match value.split_once(' ') {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
            _ => value,
        };
        bool::from(secret.ct_eq(token.as_bytes()))
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("configured", &self.secret.is_some())
            .finish()
    }
}

/// Authenticated conversion endpoint.
pub struct ConversionService {
    authenticator: Authenticator,
    pipeline: ConversionPipeline,
    response_format: ResponseFormat,
}

impl ConversionService {
    /// Build the service from configuration. The method registry is built
    /// here, once.
    pub fn new(config: &ServiceConfig) -> Self {
        if config.token().is_none() {
            log::warn!("No access token configured; every request will be rejected");
        }
        Self {
            authenticator: Authenticator::new(config.token()),
            pipeline: ConversionPipeline::new(config.registry()),
            response_format: config.response_format,
        }
    }

    /// Liveness body.
    pub fn index(&self) -> ServiceResponse {
        ServiceResponse {
            status: ServiceResponse::OK,
            body: json!({ "message": crate::version::full_version() }),
        }
    }

    /// Handle one conversion request.
    pub fn handle(&self, authorization: Option<&str>, request: &ConvertRequest) -> ServiceResponse {
        if !self.authenticator.verify(authorization) {
            log::warn!("Rejected request with invalid credentials");
            return ServiceResponse::forbidden();
        }

        match self.pipeline.convert(&request.to_payload()) {
            Ok(result) => {
                let body = match self.response_format {
                    ResponseFormat::Full => json!({
                        "image": result.encoded_image,
                        "attributes": result.attributes,
                    }),
                    ResponseFormat::ImageOnly => json!({ "data": result.encoded_image }),
                };
                ServiceResponse {
                    status: ServiceResponse::OK,
                    body,
                }
            }
            Err(err) => {
                if err.kind().is_client_error() {
                    log::warn!("Conversion request rejected: {}", err);
                } else {
                    log::error!("Conversion failed: {}", err);
                }
                ServiceResponse::from_pipeline_error(&err)
            }
        }
    }
}
