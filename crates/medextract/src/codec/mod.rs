//! Image format codec
//!
//! The pipeline talks to the file format only through [`ImageCodec`]:
//!
//! - `probe_header_field` reads one element without the payload (discovery)
//! - `read_record` parses a file into a [`Record`]
//! - `extract_fields` flattens a record into named, typed values
//! - `encode_image` / `encode_volume` write rendered artifacts
//!
//! [`DicomCodec`] is the shipped implementation. Tests substitute their own
//! codecs that never touch the disk.

pub mod dicom;
pub mod dictionary;
pub mod fields;
pub mod nifti;
pub mod png;
pub mod record;

pub use dicom::DicomCodec;
pub use fields::FieldOptions;
pub use record::{Element, ElementValue, PixelArray, Record, Tag, Vr};

use crate::row::FieldValue;
use std::path::Path;
use thiserror::Error;

/// Well-known element tags
pub mod tags {
    use super::Tag;

    pub const TRANSFER_SYNTAX_UID: Tag = Tag::new(0x0002, 0x0010);
    pub const SOP_CLASS_UID: Tag = Tag::new(0x0008, 0x0016);
    pub const SOP_INSTANCE_UID: Tag = Tag::new(0x0008, 0x0018);
    pub const MODALITY: Tag = Tag::new(0x0008, 0x0060);
    pub const PATIENT_ID: Tag = Tag::new(0x0010, 0x0020);
    pub const SLICE_THICKNESS: Tag = Tag::new(0x0018, 0x0050);
    pub const STUDY_INSTANCE_UID: Tag = Tag::new(0x0020, 0x000D);
    pub const SERIES_INSTANCE_UID: Tag = Tag::new(0x0020, 0x000E);
    pub const INSTANCE_NUMBER: Tag = Tag::new(0x0020, 0x0013);
    pub const IMAGE_POSITION_PATIENT: Tag = Tag::new(0x0020, 0x0032);
    pub const IMAGE_ORIENTATION_PATIENT: Tag = Tag::new(0x0020, 0x0037);
    pub const FRAME_LATERALITY: Tag = Tag::new(0x0020, 0x9072);
    pub const SAMPLES_PER_PIXEL: Tag = Tag::new(0x0028, 0x0002);
    pub const PHOTOMETRIC_INTERPRETATION: Tag = Tag::new(0x0028, 0x0004);
    pub const PLANAR_CONFIGURATION: Tag = Tag::new(0x0028, 0x0006);
    pub const NUMBER_OF_FRAMES: Tag = Tag::new(0x0028, 0x0008);
    pub const ROWS: Tag = Tag::new(0x0028, 0x0010);
    pub const COLUMNS: Tag = Tag::new(0x0028, 0x0011);
    pub const PIXEL_SPACING: Tag = Tag::new(0x0028, 0x0030);
    pub const BITS_ALLOCATED: Tag = Tag::new(0x0028, 0x0100);
    pub const PIXEL_REPRESENTATION: Tag = Tag::new(0x0028, 0x0103);
    pub const WINDOW_CENTER: Tag = Tag::new(0x0028, 0x1050);
    pub const WINDOW_WIDTH: Tag = Tag::new(0x0028, 0x1051);
    pub const RESCALE_INTERCEPT: Tag = Tag::new(0x0028, 0x1052);
    pub const RESCALE_SLOPE: Tag = Tag::new(0x0028, 0x1053);
    pub const PIXEL_DATA: Tag = Tag::new(0x7FE0, 0x0010);
}

/// Codec failure for one file
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a DICOM file: {0}")]
    NotDicom(String),

    #[error("malformed data: {0}")]
    Malformed(String),

    #[error("missing required field {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("encoding failed: {0}")]
    Encode(String),
}

impl CodecError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    Eight,
    Sixteen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Grey,
    Rgb,
}

/// A 2-D image ready for encoding, samples interleaved row-major
#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub width: u32,
    pub height: u32,
    pub bit_depth: BitDepth,
    pub color: ColorMode,
    pub samples: Vec<u16>,
}

/// A 3-D volume ready for encoding
///
/// `voxels` is x-fastest (`x + nx * (y + ny * z)`). `affine` maps voxel
/// indices to patient coordinates in RAS millimetres.
#[derive(Debug, Clone)]
pub struct Volume {
    pub dims: [usize; 3],
    pub affine: [[f64; 4]; 4],
    pub voxels: Vec<f32>,
}

/// Format collaborator used by discovery and the strategies
pub trait ImageCodec: Send + Sync {
    /// Read a single top-level element as text without loading the payload.
    /// `Ok(None)` means the file parsed but the element is absent.
    fn probe_header_field(&self, path: &Path, tag: Tag) -> Result<Option<String>, CodecError>;

    /// Parse a whole file, loading the pixel payload only when asked to
    fn read_record(&self, path: &Path, include_payload: bool) -> Result<Record, CodecError>;

    fn extract_fields(&self, record: &Record, options: &FieldOptions) -> Vec<(String, FieldValue)> {
        fields::extract_fields(record, options)
    }

    fn encode_image(&self, image: &RenderedImage, path: &Path) -> Result<(), CodecError> {
        png::write_png(image, path)
    }

    fn encode_volume(&self, volume: &Volume, path: &Path) -> Result<(), CodecError> {
        nifti::write_nifti_gz(volume, path)
    }
}
