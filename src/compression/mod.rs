//! Payload decompression.
//!
//! This module provides the [`DecompressionStrategy`] trait, a registry of
//! strategies keyed by method identifier, and the [`Decompressor`] that turns
//! a [`CompressedPayload`] into the raw bytes of a DICOM container:
//! - `none`: identity
//! - `lz`: LZ-string, base64 alphabet
//! - `lz-uri`: LZ-string, URI-safe alphabet

pub mod lzstring;
mod none;
mod traits;

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub use lzstring::LzStringStrategy;
pub use none::NoCompression;
pub use traits::DecompressionStrategy;

use crate::config::MethodId;
use crate::error::{ConvertError, Result};
use crate::CompressedPayload;

/// Table of decompression strategies keyed by method identifier.
#[derive(Clone, Default)]
pub struct MethodRegistry {
    methods: BTreeMap<String, Arc<dyn DecompressionStrategy>>,
}

impl MethodRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in method.
    pub fn with_defaults() -> Self {
        Self::with_methods(&MethodId::ALL)
    }

    /// Registry with the given built-in methods.
    pub fn with_methods(methods: &[MethodId]) -> Self {
        let mut registry = Self::new();
        for method in methods {
            registry.register(method.as_str(), method.strategy());
        }
        registry
    }

    /// Register (or replace) the strategy for `name`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        strategy: Arc<dyn DecompressionStrategy>,
    ) -> &mut Self {
        self.methods.insert(name.into(), strategy);
        self
    }

    /// Look up the strategy for `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn DecompressionStrategy>> {
        self.methods.get(name)
    }

    /// Registered method identifiers, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.methods.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.names())
            .finish()
    }
}

/// Resolves a payload's method, runs it and unwraps the optional base64 layer.
#[derive(Debug, Clone)]
pub struct Decompressor {
    registry: MethodRegistry,
}

impl Decompressor {
    /// Create a decompressor over the given registry.
    pub fn new(registry: MethodRegistry) -> Self {
        Self { registry }
    }

    /// Produce the raw container bytes carried by `payload`.
    pub fn decompress(&self, payload: &CompressedPayload) -> Result<Vec<u8>> {
        let strategy = self
            .registry
            .get(&payload.method)
            .ok_or_else(|| ConvertError::UnsupportedMethod(payload.method.clone()))?;

        let text = strategy.decompress(&payload.raw_data)?;

        log::debug!(
            "{} expanded {} chars to {} chars",
            strategy.name(),
            payload.raw_data.len(),
            text.len()
        );

        if payload.is_base64_encoded {
            decode_base64(&text)
        } else {
            decode_binary_string(&text)
        }
    }
}

impl Default for Decompressor {
    fn default() -> Self {
        Self::new(MethodRegistry::with_defaults())
    }
}

/// Decode standard padded base64, ignoring ASCII whitespace.
pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    if text.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        Ok(STANDARD.decode(compact)?)
    } else {
        Ok(STANDARD.decode(text)?)
    }
}

/// Encode bytes as standard padded base64.
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Read a binary string, one byte per character.
///
/// Characters above U+00FF cannot come from a byte and fail with
/// `DecompressionFailed`.
pub fn decode_binary_string(text: &str) -> Result<Vec<u8>> {
    text.chars()
        .enumerate()
        .map(|(position, ch)| {
            u8::try_from(u32::from(ch)).map_err(|_| {
                ConvertError::DecompressionFailed(format!(
                    "character U+{:04X} at position {} is not a byte",
                    u32::from(ch),
                    position
                ))
            })
        })
        .collect()
}

/// Write bytes as a binary string, one character per byte.
pub fn encode_binary_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
