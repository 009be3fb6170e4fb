//! Diagnostic attribute extraction.

use serde::{Deserialize, Serialize};

use crate::dicom::ParsedContainer;
use crate::error::Result;

/// Attributes reported alongside the converted image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAttributes {
    /// Row spacing in mm. Column spacing is not reported.
    pub pixel_spacing: f64,
    /// `[columns, rows]`, width first.
    pub image_size: [u32; 2],
}

/// Reads [`ImageAttributes`] from a parsed container.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeExtractor;

impl AttributeExtractor {
    /// Create an extractor.
    pub fn new() -> Self {
        Self
    }

    /// Extract attributes; absent fields surface as `MissingField`.
    pub fn extract(&self, container: &ParsedContainer) -> Result<ImageAttributes> {
        let (row_spacing, _column_spacing) = container.pixel_spacing()?;

        Ok(ImageAttributes {
            pixel_spacing: row_spacing,
            image_size: [container.columns()?, container.rows()?],
        })
    }
}
