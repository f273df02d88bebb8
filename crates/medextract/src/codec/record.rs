//! In-memory form of a parsed file

use super::{dictionary, tags, CodecError};
use std::collections::BTreeMap;
use std::fmt;

/// Element tag `(group, element)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    pub group: u16,
    pub element: u16,
}

impl Tag {
    pub const fn new(group: u16, element: u16) -> Self {
        Self { group, element }
    }

    /// Odd groups carry vendor-private data
    pub fn is_private(self) -> bool {
        self.group % 2 == 1
    }

    /// `GGGGEEEE`, used as the field name for tags without a keyword
    pub fn hex_name(self) -> String {
        format!("{:04X}{:04X}", self.group, self.element)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.group, self.element)
    }
}

/// Two-letter value representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Vr(pub [u8; 2]);

impl Vr {
    pub const AE: Vr = Vr(*b"AE");
    pub const AS: Vr = Vr(*b"AS");
    pub const AT: Vr = Vr(*b"AT");
    pub const CS: Vr = Vr(*b"CS");
    pub const DA: Vr = Vr(*b"DA");
    pub const DS: Vr = Vr(*b"DS");
    pub const DT: Vr = Vr(*b"DT");
    pub const FD: Vr = Vr(*b"FD");
    pub const FL: Vr = Vr(*b"FL");
    pub const IS: Vr = Vr(*b"IS");
    pub const LO: Vr = Vr(*b"LO");
    pub const LT: Vr = Vr(*b"LT");
    pub const OB: Vr = Vr(*b"OB");
    pub const OD: Vr = Vr(*b"OD");
    pub const OF: Vr = Vr(*b"OF");
    pub const OL: Vr = Vr(*b"OL");
    pub const OV: Vr = Vr(*b"OV");
    pub const OW: Vr = Vr(*b"OW");
    pub const PN: Vr = Vr(*b"PN");
    pub const SH: Vr = Vr(*b"SH");
    pub const SL: Vr = Vr(*b"SL");
    pub const SQ: Vr = Vr(*b"SQ");
    pub const SS: Vr = Vr(*b"SS");
    pub const ST: Vr = Vr(*b"ST");
    pub const SV: Vr = Vr(*b"SV");
    pub const TM: Vr = Vr(*b"TM");
    pub const UC: Vr = Vr(*b"UC");
    pub const UI: Vr = Vr(*b"UI");
    pub const UL: Vr = Vr(*b"UL");
    pub const UN: Vr = Vr(*b"UN");
    pub const UR: Vr = Vr(*b"UR");
    pub const US: Vr = Vr(*b"US");
    pub const UT: Vr = Vr(*b"UT");
    pub const UV: Vr = Vr(*b"UV");

    /// VRs whose explicit encoding uses a 4-byte length
    pub fn has_long_length(self) -> bool {
        matches!(
            &self.0,
            b"OB" | b"OD" | b"OF" | b"OL" | b"OV" | b"OW" | b"SQ" | b"SV" | b"UC" | b"UN"
                | b"UR" | b"UT" | b"UV"
        )
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("??")
    }
}

impl fmt::Display for Vr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded element value
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Strings(Vec<String>),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Bytes(Vec<u8>),
    Sequence(Vec<Record>),
    /// Compressed pixel fragments, skipped
    Encapsulated { fragments: usize },
    /// Present in the file but not loaded
    Deferred { length: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: Tag,
    pub vr: Vr,
    pub value: ElementValue,
}

impl Element {
    pub fn new(tag: Tag, vr: Vr, value: ElementValue) -> Self {
        Self { tag, vr, value }
    }

    /// Text element; backslashes separate multiple values
    pub fn text(tag: Tag, vr: Vr, value: &str) -> Self {
        let values = value.split('\\').map(str::to_string).collect();
        Self::new(tag, vr, ElementValue::Strings(values))
    }

    pub fn ints(tag: Tag, vr: Vr, values: Vec<i64>) -> Self {
        Self::new(tag, vr, ElementValue::Ints(values))
    }

    pub fn floats(tag: Tag, vr: Vr, values: Vec<f64>) -> Self {
        Self::new(tag, vr, ElementValue::Floats(values))
    }

    pub fn bytes(tag: Tag, vr: Vr, data: Vec<u8>) -> Self {
        Self::new(tag, vr, ElementValue::Bytes(data))
    }

    pub fn sequence(tag: Tag, items: Vec<Record>) -> Self {
        Self::new(tag, Vr::SQ, ElementValue::Sequence(items))
    }

    /// Keyword or `GGGGEEEE`
    pub fn name(&self) -> String {
        dictionary::name(self.tag)
    }
}

/// A parsed dataset (or sequence item), ordered by tag
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    elements: BTreeMap<Tag, Element>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, element: Element) {
        self.elements.insert(element.tag, element);
    }

    pub fn with(mut self, element: Element) -> Self {
        self.insert(element);
        self
    }

    pub fn get(&self, tag: Tag) -> Option<&Element> {
        self.elements.get(&tag)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.elements.contains_key(&tag)
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// First non-empty text value
    pub fn string(&self, tag: Tag) -> Option<&str> {
        match &self.get(tag)?.value {
            ElementValue::Strings(values) => values
                .first()
                .map(String::as_str)
                .filter(|v| !v.is_empty()),
            _ => None,
        }
    }

    /// All numeric values, parsing decimal/integer strings
    pub fn numbers(&self, tag: Tag) -> Result<Option<Vec<f64>>, CodecError> {
        let Some(element) = self.get(tag) else {
            return Ok(None);
        };
        numeric_values(element).map(Some)
    }

    /// First numeric value
    pub fn number(&self, tag: Tag) -> Result<Option<f64>, CodecError> {
        Ok(self.numbers(tag)?.and_then(|values| values.first().copied()))
    }

    pub fn int(&self, tag: Tag) -> Result<Option<i64>, CodecError> {
        match self.number(tag)? {
            Some(value) if value.fract() == 0.0 => Ok(Some(value as i64)),
            Some(value) => Err(CodecError::invalid(
                dictionary::name(tag),
                format!("expected an integer, found {}", value),
            )),
            None => Ok(None),
        }
    }

    /// Required strictly positive integer
    pub fn positive(&self, tag: Tag) -> Result<usize, CodecError> {
        let value = self
            .int(tag)?
            .ok_or_else(|| CodecError::MissingField(dictionary::name(tag)))?;
        usize::try_from(value)
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| {
                CodecError::invalid(dictionary::name(tag), format!("must be positive, found {}", value))
            })
    }

    /// Depth-first search through this record and its sequence items
    pub fn find_first(&self, tag: Tag) -> Option<&Element> {
        if let Some(element) = self.get(tag) {
            return Some(element);
        }
        self.elements.values().find_map(|element| match &element.value {
            ElementValue::Sequence(items) => items.iter().find_map(|item| item.find_first(tag)),
            _ => None,
        })
    }

    pub fn find_numbers(&self, tag: Tag) -> Result<Option<Vec<f64>>, CodecError> {
        match self.find_first(tag) {
            Some(element) => numeric_values(element).map(Some),
            None => Ok(None),
        }
    }

    pub fn find_number(&self, tag: Tag) -> Result<Option<f64>, CodecError> {
        Ok(self.find_numbers(tag)?.and_then(|values| values.first().copied()))
    }

    pub fn find_string(&self, tag: Tag) -> Option<&str> {
        match &self.find_first(tag)?.value {
            ElementValue::Strings(values) => values
                .first()
                .map(String::as_str)
                .filter(|v| !v.is_empty()),
            _ => None,
        }
    }

    pub fn has_pixel_data(&self) -> bool {
        self.contains(tags::PIXEL_DATA)
    }

    /// Decode native (uncompressed) pixel data into `f32` samples
    pub fn pixel_array(&self) -> Result<PixelArray, CodecError> {
        let element = self
            .get(tags::PIXEL_DATA)
            .ok_or_else(|| CodecError::MissingField("PixelData".to_string()))?;
        let bytes = match &element.value {
            ElementValue::Bytes(bytes) => bytes,
            ElementValue::Encapsulated { .. } => {
                return Err(CodecError::invalid(
                    "PixelData",
                    "compressed pixel data cannot be decoded",
                ))
            }
            _ => return Err(CodecError::Malformed("pixel data was not loaded".to_string())),
        };

        let rows = self.positive(tags::ROWS)?;
        let columns = self.positive(tags::COLUMNS)?;
        let samples = self.int(tags::SAMPLES_PER_PIXEL)?.unwrap_or(1).max(1) as usize;
        let frames = self.int(tags::NUMBER_OF_FRAMES)?.unwrap_or(1).max(1) as usize;
        let bits = self.int(tags::BITS_ALLOCATED)?.unwrap_or(16);
        let signed = self.int(tags::PIXEL_REPRESENTATION)?.unwrap_or(0) == 1;
        let planar = self.int(tags::PLANAR_CONFIGURATION)?.unwrap_or(0) == 1;

        let bytes_per_sample = match bits {
            8 => 1,
            16 => 2,
            32 => 4,
            other => {
                return Err(CodecError::invalid(
                    "BitsAllocated",
                    format!("{} bits per sample is not supported", other),
                ))
            }
        };

        let count = rows
            .checked_mul(columns)
            .and_then(|n| n.checked_mul(samples))
            .and_then(|n| n.checked_mul(frames))
            .ok_or_else(|| CodecError::invalid("PixelData", "image dimensions overflow"))?;
        let needed = count * bytes_per_sample;
        if bytes.len() < needed {
            return Err(CodecError::invalid(
                "PixelData",
                format!("expected {} bytes, found {}", needed, bytes.len()),
            ));
        }

        let raw = &bytes[..needed];
        let mut data: Vec<f32> = match (bytes_per_sample, signed) {
            (1, false) => raw.iter().map(|&b| f32::from(b)).collect(),
            (1, true) => raw.iter().map(|&b| f32::from(b as i8)).collect(),
            (2, false) => raw
                .chunks_exact(2)
                .map(|c| f32::from(u16::from_le_bytes([c[0], c[1]])))
                .collect(),
            (2, true) => raw
                .chunks_exact(2)
                .map(|c| f32::from(i16::from_le_bytes([c[0], c[1]])))
                .collect(),
            (_, false) => raw
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32)
                .collect(),
            (_, true) => raw
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32)
                .collect(),
        };

        if planar && samples > 1 {
            data = interleave_planes(&data, rows * columns, samples);
        }

        Ok(PixelArray {
            rows,
            columns,
            frames,
            samples,
            data,
        })
    }
}

fn numeric_values(element: &Element) -> Result<Vec<f64>, CodecError> {
    match &element.value {
        ElementValue::Ints(values) => Ok(values.iter().map(|&v| v as f64).collect()),
        ElementValue::Floats(values) => Ok(values.clone()),
        ElementValue::Strings(values) => values
            .iter()
            .filter(|v| !v.trim().is_empty())
            .map(|v| {
                v.trim().parse::<f64>().map_err(|_| {
                    CodecError::invalid(element.name(), format!("'{}' is not a number", v))
                })
            })
            .collect(),
        _ => Err(CodecError::invalid(element.name(), "not a numeric element")),
    }
}

/// Convert colour-by-plane frames to colour-by-pixel
fn interleave_planes(data: &[f32], pixels: usize, samples: usize) -> Vec<f32> {
    let frame_len = pixels * samples;
    let mut out = Vec::with_capacity(data.len());
    for frame in data.chunks(frame_len) {
        for pixel in 0..pixels {
            for sample in 0..samples {
                out.push(frame.get(sample * pixels + pixel).copied().unwrap_or(0.0));
            }
        }
    }
    out
}

/// Decoded pixel samples, interleaved, frame-major then row-major
#[derive(Debug, Clone, PartialEq)]
pub struct PixelArray {
    pub rows: usize,
    pub columns: usize,
    pub frames: usize,
    pub samples: usize,
    pub data: Vec<f32>,
}

impl PixelArray {
    pub fn frame_len(&self) -> usize {
        self.rows * self.columns * self.samples
    }

    pub fn frame(&self, index: usize) -> Option<&[f32]> {
        let len = self.frame_len();
        self.data.get(index * len..(index + 1) * len)
    }
}
