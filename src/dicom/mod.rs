//! DICOM container parsing.
//!
//! This module wraps the `dicom` crate: it reads a decompressed container
//! from memory once, decodes its native pixel samples into a typed matrix and
//! exposes the attributes the rest of the pipeline needs.

mod pixels;

use dicom::core::{Tag, VR};
use dicom::dictionary_std::tags;
use dicom::object::InMemDicomObject;
use dicom_core::value::Value;
use dicom_encoding::transfer_syntax::TransferSyntaxIndex;
use dicom_transfer_syntax_registry::TransferSyntaxRegistry;

use crate::error::{ConvertError, Result};

pub use pixels::{PixelMatrix, SampleBuffer};

/// Offset of the `DICM` magic code in a Part 10 file.
const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

/// A DICOM container parsed from memory.
///
/// Parsing happens once; all accessors read from the in-memory object.
pub struct ParsedContainer {
    object: InMemDicomObject,
    transfer_syntax: String,
    pixels: Option<PixelMatrix>,
}

/// Descriptive metadata, for diagnostics.
#[derive(Debug, Clone)]
pub struct ContainerMetadata {
    /// Transfer syntax UID the data set was read with.
    pub transfer_syntax: String,
    /// Modality, if present.
    pub modality: Option<String>,
    /// Photometric interpretation (e.g., MONOCHROME2, RGB).
    pub photometric_interpretation: Option<String>,
    /// Image height (rows).
    pub rows: Option<u32>,
    /// Image width (columns).
    pub columns: Option<u32>,
    /// Bits allocated per sample.
    pub bits_allocated: Option<u16>,
    /// Bits stored per sample.
    pub bits_stored: Option<u16>,
    /// Samples per pixel.
    pub samples_per_pixel: u16,
    /// Pixel representation (0 = unsigned, 1 = signed).
    pub pixel_representation: u16,
    /// Number of frames.
    pub number_of_frames: u32,
}

impl ParsedContainer {
    /// Parse a container from raw bytes.
    ///
    /// Accepts a Part 10 file (with or without the 128-byte preamble) or a
    /// bare implicit or explicit VR little endian data set.
    ///
    /// Only native little endian pixel data is decoded. Explicit VR big
    /// endian, encapsulated (compressed) pixel data and multi-frame images are
    /// rejected with `ContainerParse`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (object, transfer_syntax) =
            if bytes.len() >= PREAMBLE_LEN + MAGIC.len() && &bytes[PREAMBLE_LEN..PREAMBLE_LEN + 4] == MAGIC {
                Self::read_file(&bytes[PREAMBLE_LEN..])?
            } else if bytes.starts_with(MAGIC) {
                Self::read_file(bytes)?
            } else {
                Self::read_bare_dataset(bytes)?
            };

        if !utils::is_native_transfer_syntax(&transfer_syntax) {
            return Err(ConvertError::ContainerParse(format!(
                "unsupported transfer syntax {} ({})",
                transfer_syntax,
                utils::transfer_syntax_name(&transfer_syntax)
            )));
        }

        let mut container = Self {
            object,
            transfer_syntax,
            pixels: None,
        };
        container.pixels = container.decode_pixels()?;

        log::debug!(
            "Parsed DICOM container ({}), pixel data: {}",
            utils::transfer_syntax_name(&container.transfer_syntax),
            container
                .pixels
                .as_ref()
                .map(|p| format!("{}x{}x{}", p.columns(), p.rows(), p.samples_per_pixel()))
                .unwrap_or_else(|| "absent".into())
        );

        Ok(container)
    }

    fn read_file(source: &[u8]) -> Result<(InMemDicomObject, String)> {
        let file = dicom::object::from_reader(source)?;
        let transfer_syntax = file.meta().transfer_syntax().to_string();
        Ok((file.into_inner(), transfer_syntax))
    }

    /// A header-less data set carries no transfer syntax. Explicit VR is
    /// tried first when bytes 4..6 spell a VR, implicit VR otherwise, and the
    /// other encoding is the fallback.
    fn read_bare_dataset(source: &[u8]) -> Result<(InMemDicomObject, String)> {
        let looks_explicit = source
            .get(4..6)
            .map(|vr| VR::from_binary([vr[0], vr[1]]).is_some())
            .unwrap_or(false);
        let candidates = if looks_explicit {
            [utils::EXPLICIT_VR_LITTLE_ENDIAN, utils::IMPLICIT_VR_LITTLE_ENDIAN]
        } else {
            [utils::IMPLICIT_VR_LITTLE_ENDIAN, utils::EXPLICIT_VR_LITTLE_ENDIAN]
        };

        let mut failure = None;
        for uid in candidates {
            match Self::read_dataset_as(source, uid) {
                Ok(object) => return Ok((object, uid.to_string())),
                Err(e) => {
                    log::debug!("Data set is not {}: {}", utils::transfer_syntax_name(uid), e);
                    failure = Some(e);
                }
            }
        }

        Err(failure.unwrap_or_else(|| {
            ConvertError::ContainerParse("no DICOM data elements found".into())
        }))
    }

    fn read_dataset_as(source: &[u8], uid: &str) -> Result<InMemDicomObject> {
        let ts = TransferSyntaxRegistry.get(uid).ok_or_else(|| {
            ConvertError::ContainerParse(format!("transfer syntax {} is not registered", uid))
        })?;

        let object = InMemDicomObject::read_dataset_with_ts(source, ts)
            .map_err(|e| ConvertError::ContainerParse(format!("not a DICOM data set: {}", e)))?;

        if object.iter().next().is_none() {
            return Err(ConvertError::ContainerParse(
                "no DICOM data elements found".into(),
            ));
        }

        Ok(object)
    }

    fn decode_pixels(&self) -> Result<Option<PixelMatrix>> {
        let element = match self.object.element(tags::PIXEL_DATA) {
            Ok(element) => element,
            Err(_) => return Ok(None),
        };

        if matches!(element.value(), Value::PixelSequence { .. }) {
            return Err(ConvertError::ContainerParse(
                "encapsulated pixel data is not supported".into(),
            ));
        }

        let frames = self.number_of_frames()?;
        if frames > 1 {
            return Err(ConvertError::ContainerParse(format!(
                "multi-frame images are not supported ({} frames)",
                frames
            )));
        }

        let bytes = element
            .to_bytes()
            .map_err(|e| ConvertError::ContainerParse(format!("unreadable pixel data: {}", e)))?;

        let bits_allocated = self.required_u16(tags::BITS_ALLOCATED, "BitsAllocated")?;

        let layout = pixels::Layout {
            rows: self.rows()?,
            columns: self.columns()?,
            samples_per_pixel: self.optional_u16(tags::SAMPLES_PER_PIXEL)?.unwrap_or(1),
            bits_allocated,
            bits_stored: self
                .optional_u16(tags::BITS_STORED)?
                .unwrap_or(bits_allocated),
            signed: self.optional_u16(tags::PIXEL_REPRESENTATION)?.unwrap_or(0) == 1,
            planar: self.optional_u16(tags::PLANAR_CONFIGURATION)?.unwrap_or(0) == 1,
        };

        PixelMatrix::decode(&bytes, layout).map(Some)
    }

    /// Image width.
    pub fn columns(&self) -> Result<u32> {
        self.required_u16(tags::COLUMNS, "Columns").map(u32::from)
    }

    /// Image height.
    pub fn rows(&self) -> Result<u32> {
        self.required_u16(tags::ROWS, "Rows").map(u32::from)
    }

    /// Physical pixel spacing as `(row spacing, column spacing)` in mm.
    ///
    /// A single-valued field is treated as isotropic spacing.
    pub fn pixel_spacing(&self) -> Result<(f64, f64)> {
        let element = self
            .object
            .element(tags::PIXEL_SPACING)
            .map_err(|_| ConvertError::MissingField("PixelSpacing".into()))?;

        let values = element.to_multi_float64().map_err(|e| {
            ConvertError::ContainerParse(format!("invalid PixelSpacing: {}", e))
        })?;

        match values.as_slice() {
            [] => Err(ConvertError::MissingField("PixelSpacing".into())),
            [isotropic] => Ok((*isotropic, *isotropic)),
            [row, column, ..] => Ok((*row, *column)),
        }
    }

    /// The decoded pixel sample matrix.
    pub fn pixel_matrix(&self) -> Result<&PixelMatrix> {
        self.pixels
            .as_ref()
            .ok_or_else(|| ConvertError::MissingField("PixelData".into()))
    }

    /// Transfer syntax UID the container was read with.
    pub fn transfer_syntax(&self) -> &str {
        &self.transfer_syntax
    }

    /// Collect descriptive metadata.
    pub fn metadata(&self) -> ContainerMetadata {
        ContainerMetadata {
            transfer_syntax: self.transfer_syntax.clone(),
            modality: self.get_string(tags::MODALITY),
            photometric_interpretation: self.get_string(tags::PHOTOMETRIC_INTERPRETATION),
            rows: self.rows().ok(),
            columns: self.columns().ok(),
            bits_allocated: self.optional_u16(tags::BITS_ALLOCATED).ok().flatten(),
            bits_stored: self.optional_u16(tags::BITS_STORED).ok().flatten(),
            samples_per_pixel: self
                .optional_u16(tags::SAMPLES_PER_PIXEL)
                .ok()
                .flatten()
                .unwrap_or(1),
            pixel_representation: self
                .optional_u16(tags::PIXEL_REPRESENTATION)
                .ok()
                .flatten()
                .unwrap_or(0),
            number_of_frames: self.number_of_frames().unwrap_or(1),
        }
    }

    fn number_of_frames(&self) -> Result<u32> {
        match self.object.element(tags::NUMBER_OF_FRAMES) {
            Ok(element) => element.to_int::<u32>().map_err(|e| {
                ConvertError::ContainerParse(format!("invalid NumberOfFrames: {}", e))
            }),
            Err(_) => Ok(1),
        }
    }

    fn get_string(&self, tag: Tag) -> Option<String> {
        self.object
            .element(tag)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn required_u16(&self, tag: Tag, name: &str) -> Result<u16> {
        self.optional_u16(tag)?
            .ok_or_else(|| ConvertError::MissingField(name.to_string()))
    }

    fn optional_u16(&self, tag: Tag) -> Result<Option<u16>> {
        match self.object.element(tag) {
            Ok(element) => element.to_int::<u16>().map(Some).map_err(|e| {
                ConvertError::ContainerParse(format!("invalid value for {}: {}", tag, e))
            }),
            Err(_) => Ok(None),
        }
    }
}

impl std::fmt::Debug for ParsedContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedContainer")
            .field("transfer_syntax", &self.transfer_syntax)
            .field("pixels", &self.pixels)
            .finish_non_exhaustive()
    }
}

/// Utility functions for DICOM operations.
pub mod utils {
    /// Implicit VR Little Endian transfer syntax UID.
    pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
    /// Explicit VR Little Endian transfer syntax UID.
    pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
    /// Deflated Explicit VR Little Endian transfer syntax UID.
    pub const DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1.99";

    /// Whether pixel data under `ts` is stored as native little endian samples.
    pub fn is_native_transfer_syntax(ts: &str) -> bool {
        matches!(
            ts,
            IMPLICIT_VR_LITTLE_ENDIAN | EXPLICIT_VR_LITTLE_ENDIAN | DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN
        )
    }

    /// Get human-readable name for transfer syntax.
    pub fn transfer_syntax_name(ts: &str) -> &'static str {
        match ts {
            "1.2.840.10008.1.2" => "Implicit VR Little Endian",
            "1.2.840.10008.1.2.1" => "Explicit VR Little Endian",
            "1.2.840.10008.1.2.1.99" => "Deflated Explicit VR Little Endian",
            "1.2.840.10008.1.2.2" => "Explicit VR Big Endian",
            "1.2.840.10008.1.2.4.50" => "JPEG Baseline",
            "1.2.840.10008.1.2.4.70" => "JPEG Lossless",
            "1.2.840.10008.1.2.4.80" => "JPEG-LS Lossless",
            "1.2.840.10008.1.2.4.81" => "JPEG-LS Near-Lossless",
            "1.2.840.10008.1.2.4.90" => "JPEG 2000 Lossless",
            "1.2.840.10008.1.2.4.91" => "JPEG 2000 Lossy",
            "1.2.840.10008.1.2.5" => "RLE Lossless",
            _ => "Unknown",
        }
    }
}


#[cfg(test)]
mod tests {
    use dicom::core::{DataElement, PrimitiveValue, VR};

    use super::testing::*;
    use super::*;

    #[test]
    fn test_parse_part10_file() {
        let samples: Vec<u16> = (0..12).map(|i| i * 100).collect();
        let bytes = to_part10(mono16(3, 4, &samples));
        let container = ParsedContainer::from_bytes(&bytes).unwrap();

        assert_eq!(container.rows().unwrap(), 3);
        assert_eq!(container.columns().unwrap(), 4);
        assert_eq!(container.pixel_spacing().unwrap(), (0.5, 0.5));
        assert_eq!(container.transfer_syntax(), utils::EXPLICIT_VR_LITTLE_ENDIAN);

        let matrix = container.pixel_matrix().unwrap();
        assert_eq!((matrix.rows(), matrix.columns()), (3, 4));
        assert_eq!(matrix.bits_allocated(), 16);
        let values: Vec<f64> = matrix.samples().values().collect();
        assert_eq!(values, samples.iter().map(|&s| s as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_parse_without_preamble() {
        let bytes = to_part10(mono16(1, 2, &[1, 2]));
        let container = ParsedContainer::from_bytes(&bytes[PREAMBLE_LEN..]).unwrap();
        assert_eq!(container.columns().unwrap(), 2);
    }

    #[test]
    fn test_parse_bare_dataset() {
        let bytes = to_bare_dataset(&mono16(2, 2, &[0, 1, 2, 3]), utils::IMPLICIT_VR_LITTLE_ENDIAN);
        let container = ParsedContainer::from_bytes(&bytes).unwrap();
        assert_eq!(container.transfer_syntax(), utils::IMPLICIT_VR_LITTLE_ENDIAN);
        assert_eq!(container.pixel_matrix().unwrap().samples().len(), 4);
    }

    #[test]
    fn test_parse_bare_explicit_dataset() {
        let samples = [0u16, 100, 200, 300, 400, 500];
        let bytes = to_bare_dataset(&mono16(2, 3, &samples), utils::EXPLICIT_VR_LITTLE_ENDIAN);
        let container = ParsedContainer::from_bytes(&bytes).unwrap();
        assert_eq!(container.transfer_syntax(), utils::EXPLICIT_VR_LITTLE_ENDIAN);
        assert_eq!(container.columns().unwrap(), 3);
        assert_eq!(container.pixel_spacing().unwrap(), (0.5, 0.5));
        let values: Vec<f64> = container.pixel_matrix().unwrap().samples().values().collect();
        assert_eq!(values, vec![0.0, 100.0, 200.0, 300.0, 400.0, 500.0]);
    }

    #[test]
    fn test_garbage_is_parse_error() {
        for garbage in [&b"HelloWorld"[..], &b""[..]] {
            assert!(matches!(
                ParsedContainer::from_bytes(garbage),
                Err(ConvertError::ContainerParse(_))
            ));
        }
    }

    #[test]
    fn test_missing_spacing_and_pixels() {
        let mut object = mono16(2, 2, &[0, 1, 2, 3]);
        object.take_element(tags::PIXEL_SPACING).unwrap();
        object.take_element(tags::PIXEL_DATA).unwrap();
        let container = ParsedContainer::from_bytes(&to_part10(object)).unwrap();

        assert!(matches!(
            container.pixel_spacing(),
            Err(ConvertError::MissingField(f)) if f == "PixelSpacing"
        ));
        assert!(matches!(
            container.pixel_matrix(),
            Err(ConvertError::MissingField(f)) if f == "PixelData"
        ));
        assert_eq!(container.rows().unwrap(), 2);
    }

    #[test]
    fn test_missing_rows_with_pixel_data() {
        let mut object = mono16(2, 2, &[0, 1, 2, 3]);
        object.take_element(tags::ROWS).unwrap();
        assert!(matches!(
            ParsedContainer::from_bytes(&to_part10(object)),
            Err(ConvertError::MissingField(f)) if f == "Rows"
        ));
    }

    #[test]
    fn test_single_valued_spacing_is_isotropic() {
        let mut object = mono16(1, 1, &[7]);
        object.put(DataElement::new(
            tags::PIXEL_SPACING,
            VR::DS,
            PrimitiveValue::from("0.25"),
        ));
        let container = ParsedContainer::from_bytes(&to_part10(object)).unwrap();
        assert_eq!(container.pixel_spacing().unwrap(), (0.25, 0.25));
    }

    #[test]
    fn test_multi_frame_rejected() {
        let mut object = mono16(1, 2, &[1, 2, 3, 4]);
        object.put(DataElement::new(
            tags::NUMBER_OF_FRAMES,
            VR::IS,
            PrimitiveValue::from("2"),
        ));
        assert!(matches!(
            ParsedContainer::from_bytes(&to_part10(object)),
            Err(ConvertError::ContainerParse(_))
        ));
    }

    #[test]
    fn test_metadata() {
        let container = ParsedContainer::from_bytes(&to_part10(mono16(2, 3, &[0; 6]))).unwrap();
        let metadata = container.metadata();
        assert_eq!(metadata.modality.as_deref(), Some("OT"));
        assert_eq!(metadata.photometric_interpretation.as_deref(), Some("MONOCHROME2"));
        assert_eq!(metadata.rows, Some(2));
        assert_eq!(metadata.columns, Some(3));
        assert_eq!(metadata.bits_allocated, Some(16));
        assert_eq!(metadata.number_of_frames, 1);
    }

    #[test]
    fn test_transfer_syntax_utils() {
        assert!(utils::is_native_transfer_syntax("1.2.840.10008.1.2"));
        assert!(utils::is_native_transfer_syntax("1.2.840.10008.1.2.1"));
        assert!(!utils::is_native_transfer_syntax("1.2.840.10008.1.2.4.90"));
        assert!(!utils::is_native_transfer_syntax("1.2.840.10008.1.2.2"));
        assert_eq!(
            utils::transfer_syntax_name("1.2.840.10008.1.2.4.50"),
            "JPEG Baseline"
        );
    }
}
