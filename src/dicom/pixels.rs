//! Native pixel sample decoding.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{ConvertError, Result};

/// Typed pixel samples in row-major, sample-interleaved order.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBuffer {
    /// 8-bit unsigned.
    U8(Vec<u8>),
    /// 8-bit signed.
    I8(Vec<i8>),
    /// 16-bit unsigned.
    U16(Vec<u16>),
    /// 16-bit signed.
    I16(Vec<i16>),
    /// 32-bit unsigned.
    U32(Vec<u32>),
    /// 32-bit signed.
    I32(Vec<i32>),
}

impl SampleBuffer {
    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            SampleBuffer::U8(v) => v.len(),
            SampleBuffer::I8(v) => v.len(),
            SampleBuffer::U16(v) => v.len(),
            SampleBuffer::I16(v) => v.len(),
            SampleBuffer::U32(v) => v.len(),
            SampleBuffer::I32(v) => v.len(),
        }
    }

    /// Whether the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over the samples as real values.
    pub fn values(&self) -> Box<dyn Iterator<Item = f64> + '_> {
        match self {
            SampleBuffer::U8(v) => Box::new(v.iter().map(|&s| f64::from(s))),
            SampleBuffer::I8(v) => Box::new(v.iter().map(|&s| f64::from(s))),
            SampleBuffer::U16(v) => Box::new(v.iter().map(|&s| f64::from(s))),
            SampleBuffer::I16(v) => Box::new(v.iter().map(|&s| f64::from(s))),
            SampleBuffer::U32(v) => Box::new(v.iter().map(|&s| f64::from(s))),
            SampleBuffer::I32(v) => Box::new(v.iter().map(|&s| f64::from(s))),
        }
    }
}

/// Image geometry and sample format read from the data set.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
    pub rows: u32,
    pub columns: u32,
    pub samples_per_pixel: u16,
    pub bits_allocated: u16,
    pub bits_stored: u16,
    pub signed: bool,
    pub planar: bool,
}

impl Layout {
    fn sample_count(&self) -> usize {
        self.rows as usize * self.columns as usize * self.samples_per_pixel as usize
    }
}

/// Single-frame pixel sample matrix owned by a parsed container.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelMatrix {
    rows: u32,
    columns: u32,
    samples_per_pixel: u16,
    bits_allocated: u16,
    bits_stored: u16,
    samples: SampleBuffer,
}

impl PixelMatrix {
    /// Build a matrix from already decoded samples.
    pub fn new(
        rows: u32,
        columns: u32,
        samples_per_pixel: u16,
        bits_stored: u16,
        samples: SampleBuffer,
    ) -> Result<Self> {
        let bits_allocated = match samples {
            SampleBuffer::U8(_) | SampleBuffer::I8(_) => 8,
            SampleBuffer::U16(_) | SampleBuffer::I16(_) => 16,
            SampleBuffer::U32(_) | SampleBuffer::I32(_) => 32,
        };
        let expected = rows as usize * columns as usize * samples_per_pixel as usize;
        if samples.len() != expected {
            return Err(ConvertError::ContainerParse(format!(
                "pixel sample count mismatch: expected {} ({}x{}x{}), got {}",
                expected,
                columns,
                rows,
                samples_per_pixel,
                samples.len()
            )));
        }
        Ok(Self {
            rows,
            columns,
            samples_per_pixel,
            bits_allocated,
            bits_stored,
            samples,
        })
    }

    /// Decode native little endian pixel bytes.
    pub(crate) fn decode(bytes: &[u8], layout: Layout) -> Result<Self> {
        if layout.samples_per_pixel == 0 {
            return Err(ConvertError::ContainerParse("SamplesPerPixel is zero".into()));
        }
        if layout.bits_stored == 0 || layout.bits_stored > layout.bits_allocated {
            return Err(ConvertError::ContainerParse(format!(
                "BitsStored {} incompatible with BitsAllocated {}",
                layout.bits_stored, layout.bits_allocated
            )));
        }

        let count = layout.sample_count();
        let width = match layout.bits_allocated {
            8 => 1,
            16 => 2,
            32 => 4,
            other => {
                return Err(ConvertError::ContainerParse(format!(
                    "unsupported BitsAllocated: {}",
                    other
                )))
            }
        };

        // Odd-length pixel data carries one padding byte.
        let needed = count * width;
        if bytes.len() < needed {
            return Err(ConvertError::ContainerParse(format!(
                "pixel data too short: expected {} bytes, got {}",
                needed,
                bytes.len()
            )));
        }
        let bytes = &bytes[..needed];
        let shift = u32::from(layout.bits_allocated - layout.bits_stored);

        let samples = match (width, layout.signed) {
            (1, false) => SampleBuffer::U8(bytes.to_vec()),
            (1, true) => SampleBuffer::I8(
                bytes
                    .iter()
                    .map(|&b| ((b as i8) << shift) >> shift)
                    .collect(),
            ),
            (2, false) => {
                let mut out = vec![0u16; count];
                LittleEndian::read_u16_into(bytes, &mut out);
                SampleBuffer::U16(out)
            }
            (2, true) => {
                let mut out = vec![0i16; count];
                LittleEndian::read_i16_into(bytes, &mut out);
                out.iter_mut().for_each(|s| *s = (*s << shift) >> shift);
                SampleBuffer::I16(out)
            }
            (_, false) => {
                let mut out = vec![0u32; count];
                LittleEndian::read_u32_into(bytes, &mut out);
                SampleBuffer::U32(out)
            }
            (_, true) => {
                let mut out = vec![0i32; count];
                LittleEndian::read_i32_into(bytes, &mut out);
                out.iter_mut().for_each(|s| *s = (*s << shift) >> shift);
                SampleBuffer::I32(out)
            }
        };

        let samples = if layout.planar && layout.samples_per_pixel > 1 {
            interleave(samples, layout.samples_per_pixel as usize)
        } else {
            samples
        };

        Self::new(
            layout.rows,
            layout.columns,
            layout.samples_per_pixel,
            layout.bits_stored,
            samples,
        )
    }

    /// Image height.
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Image width.
    pub fn columns(&self) -> u32 {
        self.columns
    }

    /// Samples per pixel (1 = grayscale, 3 = colour).
    pub fn samples_per_pixel(&self) -> u16 {
        self.samples_per_pixel
    }

    /// Storage width of one sample.
    pub fn bits_allocated(&self) -> u16 {
        self.bits_allocated
    }

    /// Significant bits per sample.
    pub fn bits_stored(&self) -> u16 {
        self.bits_stored
    }

    /// The samples.
    pub fn samples(&self) -> &SampleBuffer {
        &self.samples
    }
}

/// Convert colour-by-plane samples to colour-by-pixel order.
fn interleave(samples: SampleBuffer, planes: usize) -> SampleBuffer {
    fn reorder<T: Copy>(v: Vec<T>, planes: usize) -> Vec<T> {
        let plane_len = v.len() / planes;
        (0..plane_len)
            .flat_map(|i| (0..planes).map(move |p| (p, i)))
            .map(|(p, i)| v[p * plane_len + i])
            .collect()
    }

    match samples {
        SampleBuffer::U8(v) => SampleBuffer::U8(reorder(v, planes)),
        SampleBuffer::I8(v) => SampleBuffer::I8(reorder(v, planes)),
        SampleBuffer::U16(v) => SampleBuffer::U16(reorder(v, planes)),
        SampleBuffer::I16(v) => SampleBuffer::I16(reorder(v, planes)),
        SampleBuffer::U32(v) => SampleBuffer::U32(reorder(v, planes)),
        SampleBuffer::I32(v) => SampleBuffer::I32(reorder(v, planes)),
    }
}
