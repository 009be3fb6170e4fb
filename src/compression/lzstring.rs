//! LZ-string codec.
//!
//! Bit-compatible with the JavaScript `lz-string` library used by browser
//! front ends: an LZW-style dictionary coder over UTF-16 code units whose
//! output bitstream is packed six bits per character into a 65-symbol
//! alphabet. Both directions are implemented; the service only needs
//! decompression, the compressor serves payload packing and tests.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::error::{ConvertError, Result};

use super::traits::DecompressionStrategy;

const INVALID: u8 = 0xFF;
const BITS_PER_CHAR: u32 = 6;
const RESET_VALUE: u32 = 32;

/// Character set used to pack the bitstream.
#[derive(Debug, Clone, Copy)]
pub struct Alphabet {
    symbols: &'static [u8; 65],
    reverse: [u8; 128],
    padded: bool,
    space_as_plus: bool,
}

const fn reverse_table(symbols: &[u8; 65]) -> [u8; 128] {
    let mut table = [INVALID; 128];
    let mut i = 0;
    while i < symbols.len() {
        table[symbols[i] as usize] = i as u8;
        i += 1;
    }
    table
}

const BASE64_SYMBOLS: &[u8; 65] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/=";
const URI_SYMBOLS: &[u8; 65] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+-$";

/// `compressToBase64` / `decompressFromBase64` alphabet.
pub const BASE64: Alphabet = Alphabet {
    symbols: BASE64_SYMBOLS,
    reverse: reverse_table(BASE64_SYMBOLS),
    padded: true,
    space_as_plus: false,
};

/// `compressToEncodedURIComponent` / `decompressFromEncodedURIComponent` alphabet.
pub const URI_COMPONENT: Alphabet = Alphabet {
    symbols: URI_SYMBOLS,
    reverse: reverse_table(URI_SYMBOLS),
    padded: false,
    space_as_plus: true,
};

impl Alphabet {
    fn value_of(&self, ch: char) -> Option<u8> {
        let ch = if self.space_as_plus && ch == ' ' { '+' } else { ch };
        if !ch.is_ascii() {
            return None;
        }
        match self.reverse[ch as usize] {
            INVALID => None,
            v => Some(v),
        }
    }

    fn symbol(&self, value: u32) -> char {
        self.symbols[value as usize] as char
    }
}

/// Structural failures of the LZ-string bitstream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LzStringError {
    /// Input character outside the alphabet.
    #[error("invalid character {ch:?} at position {position}")]
    InvalidCharacter {
        /// Offending character.
        ch: char,
        /// Character index in the input.
        position: usize,
    },
    /// Stream header is not a literal or end marker.
    #[error("invalid stream header token {0}")]
    InvalidHeader(u32),
    /// Back-reference to a dictionary entry that does not exist yet.
    #[error("dictionary reference {code} out of range (size {size})")]
    InvalidReference {
        /// Referenced code.
        code: usize,
        /// Dictionary size at that point.
        size: usize,
    },
}

struct BitReader {
    values: Vec<u8>,
    val: u32,
    position: u32,
    index: usize,
}

impl BitReader {
    fn new(values: Vec<u8>) -> Self {
        let val = values.first().copied().unwrap_or(0) as u32;
        Self {
            values,
            val,
            position: RESET_VALUE,
            index: 1,
        }
    }

    /// Read `count` bits, least significant first.
    fn read_bits(&mut self, count: u32) -> u32 {
        let mut bits = 0u32;
        for shift in 0..count {
            let set = self.val & self.position != 0;
            self.position >>= 1;
            if self.position == 0 {
                self.position = RESET_VALUE;
                // Reads past the end yield zero bits, as in the reference decoder.
                self.val = self.values.get(self.index).copied().unwrap_or(0) as u32;
                self.index += 1;
            }
            if set {
                bits |= 1 << shift;
            }
        }
        bits
    }

    fn exhausted(&self) -> bool {
        self.index > self.values.len()
    }
}

/// Decompress an LZ-string stream into UTF-16 code units.
///
/// An empty vector corresponds to the reference decoder's empty-string
/// result (truncated stream, empty input or an encoded empty string).
pub fn decompress_units(
    input: &str,
    alphabet: &Alphabet,
) -> std::result::Result<Vec<u16>, LzStringError> {
    let values = input
        .chars()
        .enumerate()
        .map(|(position, ch)| {
            alphabet
                .value_of(ch)
                .ok_or(LzStringError::InvalidCharacter { ch, position })
        })
        .collect::<std::result::Result<Vec<u8>, _>>()?;

    if values.is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = BitReader::new(values);

    // Codes 0..=2 are control tokens; their slots stay empty.
    let mut dictionary: Vec<Vec<u16>> = vec![Vec::new(); 3];
    let mut enlarge_in: u64 = 4;
    let mut num_bits: u32 = 3;

    let first = match reader.read_bits(2) {
        0 => reader.read_bits(8) as u16,
        1 => reader.read_bits(16) as u16,
        2 => return Ok(Vec::new()),
        other => return Err(LzStringError::InvalidHeader(other)),
    };
    dictionary.push(vec![first]);
    let mut w = vec![first];
    let mut result = vec![first];

    loop {
        if reader.exhausted() {
            return Ok(Vec::new());
        }

        let code = match reader.read_bits(num_bits) {
            literal @ (0 | 1) => {
                let width = if literal == 0 { 8 } else { 16 };
                let unit = reader.read_bits(width) as u16;
                dictionary.push(vec![unit]);
                enlarge_in -= 1;
                dictionary.len() - 1
            }
            2 => return Ok(result),
            code => code as usize,
        };

        if enlarge_in == 0 {
            enlarge_in = 1 << num_bits;
            num_bits += 1;
        }

        let entry = if code < dictionary.len() {
            dictionary[code].clone()
        } else if code == dictionary.len() {
            let mut entry = w.clone();
            entry.push(w[0]);
            entry
        } else {
            return Err(LzStringError::InvalidReference {
                code,
                size: dictionary.len(),
            });
        };

        result.extend_from_slice(&entry);

        let mut next = w;
        next.push(entry[0]);
        dictionary.push(next);
        enlarge_in -= 1;

        w = entry;

        if enlarge_in == 0 {
            enlarge_in = 1 << num_bits;
            num_bits += 1;
        }
    }
}

struct BitWriter<'a> {
    alphabet: &'a Alphabet,
    val: u32,
    position: u32,
    out: String,
}

impl<'a> BitWriter<'a> {
    fn new(alphabet: &'a Alphabet) -> Self {
        Self {
            alphabet,
            val: 0,
            position: 0,
            out: String::new(),
        }
    }

    fn write_bit(&mut self, bit: u32) {
        self.val = (self.val << 1) | (bit & 1);
        if self.position == BITS_PER_CHAR - 1 {
            self.position = 0;
            self.out.push(self.alphabet.symbol(self.val));
            self.val = 0;
        } else {
            self.position += 1;
        }
    }

    /// Write `count` bits of `value`, least significant first.
    fn write_bits(&mut self, count: u32, mut value: u32) {
        for _ in 0..count {
            self.write_bit(value & 1);
            value >>= 1;
        }
    }

    fn finish(mut self) -> String {
        loop {
            self.val <<= 1;
            if self.position == BITS_PER_CHAR - 1 {
                self.out.push(self.alphabet.symbol(self.val));
                break;
            }
            self.position += 1;
        }
        self.out
    }
}

struct Compressor<'a> {
    writer: BitWriter<'a>,
    dictionary: HashMap<Vec<u16>, u32>,
    pending_literals: HashSet<u16>,
    dict_size: u32,
    enlarge_in: u64,
    num_bits: u32,
}

impl<'a> Compressor<'a> {
    fn new(alphabet: &'a Alphabet) -> Self {
        Self {
            writer: BitWriter::new(alphabet),
            dictionary: HashMap::new(),
            pending_literals: HashSet::new(),
            dict_size: 3,
            enlarge_in: 2,
            num_bits: 2,
        }
    }

    fn shrink_budget(&mut self) {
        self.enlarge_in -= 1;
        if self.enlarge_in == 0 {
            self.enlarge_in = 1 << self.num_bits;
            self.num_bits += 1;
        }
    }

    /// Emit the phrase `w`, as a literal on first use of a single unit.
    fn emit(&mut self, w: &[u16]) {
        match w {
            [unit] if self.pending_literals.contains(unit) => {
                if *unit < 256 {
                    self.writer.write_bits(self.num_bits, 0);
                    self.writer.write_bits(8, *unit as u32);
                } else {
                    self.writer.write_bits(self.num_bits, 1);
                    self.writer.write_bits(16, *unit as u32);
                }
                self.shrink_budget();
                self.pending_literals.remove(unit);
            }
            _ => {
                let code = self.dictionary.get(w).copied().unwrap_or_default();
                self.writer.write_bits(self.num_bits, code);
            }
        }
        self.shrink_budget();
    }

    fn compress(mut self, units: &[u16]) -> String {
        let mut w: Vec<u16> = Vec::new();

        for &unit in units {
            if !self.dictionary.contains_key([unit].as_slice()) {
                self.dictionary.insert(vec![unit], self.dict_size);
                self.dict_size += 1;
                self.pending_literals.insert(unit);
            }

            let mut wc = w.clone();
            wc.push(unit);
            if self.dictionary.contains_key(&wc) {
                w = wc;
            } else {
                self.emit(&w);
                self.dictionary.insert(wc, self.dict_size);
                self.dict_size += 1;
                w = vec![unit];
            }
        }

        if !w.is_empty() {
            self.emit(&w);
        }

        self.writer.write_bits(self.num_bits, 2);
        self.writer.finish()
    }
}

/// Compress UTF-16 code units into an LZ-string stream.
pub fn compress_units(units: &[u16], alphabet: &Alphabet) -> String {
    let mut out = Compressor::new(alphabet).compress(units);
    if alphabet.padded {
        while out.len() % 4 != 0 {
            out.push('=');
        }
    }
    out
}

/// Equivalent of `LZString.compressToBase64`.
pub fn compress_to_base64(input: &str) -> String {
    let units: Vec<u16> = input.encode_utf16().collect();
    compress_units(&units, &BASE64)
}

/// Equivalent of `LZString.compressToEncodedURIComponent`.
pub fn compress_to_encoded_uri_component(input: &str) -> String {
    let units: Vec<u16> = input.encode_utf16().collect();
    compress_units(&units, &URI_COMPONENT)
}

/// LZ-string decompression strategy over a given alphabet.
#[derive(Debug, Clone, Copy)]
pub struct LzStringStrategy {
    alphabet: Alphabet,
    name: &'static str,
}

impl LzStringStrategy {
    /// Strategy for `compressToBase64` payloads.
    pub fn base64() -> Self {
        Self {
            alphabet: BASE64,
            name: "lz-string (base64)",
        }
    }

    /// Strategy for `compressToEncodedURIComponent` payloads.
    pub fn uri_component() -> Self {
        Self {
            alphabet: URI_COMPONENT,
            name: "lz-string (uri component)",
        }
    }
}

impl DecompressionStrategy for LzStringStrategy {
    fn decompress(&self, compressed: &str) -> Result<String> {
        let units = decompress_units(compressed, &self.alphabet)
            .map_err(|e| ConvertError::DecompressionFailed(e.to_string()))?;

        // The decoder does not always flag corruption; empty output is the signal.
        if units.is_empty() {
            return Err(ConvertError::DecompressionFailed(
                "decompression produced no output".into(),
            ));
        }

        String::from_utf16(&units).map_err(|_| {
            ConvertError::DecompressionFailed("decompressed text is not valid UTF-16".into())
        })
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
