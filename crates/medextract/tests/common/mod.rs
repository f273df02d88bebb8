//! Shared fixtures for integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use medextract::codec::{tags, CodecError, Element, ImageCodec, Record, RenderedImage, Tag, Volume, Vr};
use medextract::ExtractConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

pub const CT: &str = "1.2.840.10008.5.1.4.1.1.2";
pub const TOMO: &str = "1.2.840.10008.5.1.4.1.1.13.1.3";
pub const DX: &str = "1.2.840.10008.5.1.4.1.1.1.1";
pub const SECONDARY_CAPTURE: &str = "1.2.840.10008.5.1.4.1.1.7";

pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";

// ============================================================================
// Synthetic codec
// ============================================================================

/// Codec that never parses anything
///
/// The storage class comes from the top-level directory under the input
/// root: `va` (CT series), `vb` (tomosynthesis), `pl` (DX) and `gn`
/// (secondary capture). Encoders only count calls.
#[derive(Default)]
pub struct SyntheticCodec {
    pub reads: AtomicUsize,
    pub encoded: AtomicUsize,
    /// Fired once, on the first read after this file appears
    pub stop_when: Option<(PathBuf, Arc<Notify>)>,
    stopped: AtomicBool,
}

impl SyntheticCodec {
    pub fn stopping_when_exists(marker: impl Into<PathBuf>, notify: Arc<Notify>) -> Self {
        Self {
            stop_when: Some((marker.into(), notify)),
            ..Default::default()
        }
    }

    fn storage_class(path: &Path) -> Option<&'static str> {
        path.components().find_map(|c| match c.as_os_str().to_str()? {
            "va" => Some(CT),
            "vb" => Some(TOMO),
            "pl" => Some(DX),
            "gn" => Some(SECONDARY_CAPTURE),
            _ => None,
        })
    }
}

impl ImageCodec for SyntheticCodec {
    fn probe_header_field(&self, path: &Path, tag: Tag) -> Result<Option<String>, CodecError> {
        assert_eq!(tag, tags::SOP_CLASS_UID);
        Self::storage_class(path)
            .map(|uid| Some(uid.to_string()))
            .ok_or_else(|| CodecError::NotDicom(path.display().to_string()))
    }

    fn read_record(&self, path: &Path, _include_payload: bool) -> Result<Record, CodecError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some((marker, notify)) = &self.stop_when {
            if marker.exists() && !self.stopped.swap(true, Ordering::SeqCst) {
                notify.notify_one();
            }
        }

        let class = Self::storage_class(path)
            .ok_or_else(|| CodecError::NotDicom(path.display().to_string()))?;
        let name = path.to_string_lossy();
        let series = path
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let pixels: Vec<u8> = [0u16, 10, 20, 30].iter().flat_map(|v| v.to_le_bytes()).collect();
        Ok(Record::new()
            .with(Element::text(tags::SOP_CLASS_UID, Vr::UI, class))
            .with(Element::text(tags::SOP_INSTANCE_UID, Vr::UI, &format!("2.25.{}", name.len())))
            .with(Element::text(tags::PATIENT_ID, Vr::LO, &format!("P-{}", series)))
            .with(Element::text(tags::SERIES_INSTANCE_UID, Vr::UI, &series))
            .with(Element::text(tags::MODALITY, Vr::CS, "OT"))
            .with(Element::ints(tags::ROWS, Vr::US, vec![2]))
            .with(Element::ints(tags::COLUMNS, Vr::US, vec![2]))
            .with(Element::ints(tags::BITS_ALLOCATED, Vr::US, vec![16]))
            .with(Element::bytes(tags::PIXEL_DATA, Vr::OW, pixels)))
    }

    fn encode_image(&self, _image: &RenderedImage, _path: &Path) -> Result<(), CodecError> {
        self.encoded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn encode_volume(&self, _volume: &Volume, _path: &Path) -> Result<(), CodecError> {
        self.encoded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Empty source files laid out for [`SyntheticCodec`]
///
/// `series` directories with one file each, then flat files for the other
/// three categories.
pub fn synthetic_tree(root: &Path, series: usize, frames: usize, planar: usize, generic: usize) {
    for n in 0..series {
        let dir = root.join("va").join(format!("s{:05}", n));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("0001.dcm"), b"").unwrap();
    }
    for (name, count) in [("vb", frames), ("pl", planar), ("gn", generic)] {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for n in 0..count {
            fs::write(dir.join(format!("{:05}.dcm", n)), b"").unwrap();
        }
    }
}

pub fn test_config(input: &Path, output: &Path, workers: usize, batch_size: usize) -> ExtractConfig {
    let mut config = ExtractConfig::new(input, output);
    config.workers = workers;
    config.save_batch_size = batch_size;
    config.save_images = false;
    config
}

// ============================================================================
// Catalog helpers
// ============================================================================

pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<csv::StringRecord>,
}

impl Table {
    pub fn read(path: &Path) -> Self {
        let mut reader = csv::Reader::from_path(path).unwrap();
        let headers = reader.headers().unwrap().iter().map(str::to_string).collect();
        let rows = reader.records().map(|r| r.unwrap()).collect();
        Self { headers, rows }
    }

    pub fn column(&self, name: &str) -> Vec<String> {
        let index = self.headers.iter().position(|h| h == name).unwrap();
        self.rows.iter().map(|r| r[index].to_string()).collect()
    }
}

pub fn batch_ids(meta_dir: &Path) -> Vec<u64> {
    medextract::batch::list_batches(meta_dir)
        .unwrap()
        .into_iter()
        .map(|(id, _)| id)
        .collect()
}

// ============================================================================
// DICOM fixture writer
// ============================================================================

/// Part-10 file writer, explicit VR little endian
pub struct DicomFixture {
    meta: Vec<u8>,
    body: Vec<u8>,
}

impl DicomFixture {
    pub fn new() -> Self {
        let mut fixture = Self {
            meta: Vec::new(),
            body: Vec::new(),
        };
        let syntax = padded(EXPLICIT_VR_LITTLE_ENDIAN, b'\0');
        encode(&mut fixture.meta, Tag::new(0x0002, 0x0010), *b"UI", &syntax);
        fixture
    }

    pub fn text(mut self, tag: Tag, vr: [u8; 2], value: &str) -> Self {
        let pad = if &vr == b"UI" { b'\0' } else { b' ' };
        encode(&mut self.body, tag, vr, &padded(value, pad));
        self
    }

    pub fn us(mut self, tag: Tag, value: u16) -> Self {
        encode(&mut self.body, tag, *b"US", &value.to_le_bytes());
        self
    }

    pub fn pixels(mut self, values: &[u16]) -> Self {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        encode(&mut self.body, tags::PIXEL_DATA, *b"OW", &bytes);
        self
    }

    /// 16-bit greyscale image attributes plus pixel data
    pub fn image(self, rows: u16, columns: u16, values: &[u16]) -> Self {
        self.us(tags::SAMPLES_PER_PIXEL, 1)
            .text(tags::PHOTOMETRIC_INTERPRETATION, *b"CS", "MONOCHROME2")
            .us(tags::ROWS, rows)
            .us(tags::COLUMNS, columns)
            .us(tags::BITS_ALLOCATED, 16)
            .us(Tag::new(0x0028, 0x0101), 16)
            .us(tags::PIXEL_REPRESENTATION, 0)
            .pixels(values)
    }

    pub fn write(&self, path: &Path) -> PathBuf {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut out = vec![0u8; 128];
        out.extend_from_slice(b"DICM");
        out.extend_from_slice(&self.meta);
        out.extend_from_slice(&self.body);
        fs::write(path, out).unwrap();
        path.to_path_buf()
    }
}

impl Default for DicomFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Implicit VR file of undefined-length sequences nested `levels` deep, never closed
pub fn nested_sequences(levels: usize) -> Vec<u8> {
    let mut out = vec![0u8; 128];
    out.extend_from_slice(b"DICM");
    let syntax = padded(IMPLICIT_VR_LITTLE_ENDIAN, b'\0');
    encode(&mut out, tags::TRANSFER_SYNTAX_UID, *b"UI", &syntax);
    for _ in 0..levels {
        for (group, element) in [(0x0008u16, 0x0006u16), (0xFFFE, 0xE000)] {
            out.extend_from_slice(&group.to_le_bytes());
            out.extend_from_slice(&element.to_le_bytes());
            out.extend_from_slice(&u32::MAX.to_le_bytes());
        }
    }
    out
}

fn padded(value: &str, pad: u8) -> Vec<u8> {
    let mut bytes = value.as_bytes().to_vec();
    if bytes.len() % 2 == 1 {
        bytes.push(pad);
    }
    bytes
}

fn encode(out: &mut Vec<u8>, tag: Tag, vr: [u8; 2], value: &[u8]) {
    out.extend_from_slice(&tag.group.to_le_bytes());
    out.extend_from_slice(&tag.element.to_le_bytes());
    out.extend_from_slice(&vr);
    if Vr(vr).has_long_length() {
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    } else {
        out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    }
    out.extend_from_slice(value);
}
