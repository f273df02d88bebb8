//! Gzip-compressed NIfTI-1 volume encoding
//!
//! Writes a single-file (`n+1`) image: a 348-byte header, a 4-byte empty
//! extension block, then `FLOAT32` voxels. Orientation goes into the sform.

use super::{CodecError, Volume};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const HEADER_SIZE: usize = 348;
const VOX_OFFSET: f32 = 352.0;
const DT_FLOAT32: i16 = 16;
const NIFTI_XFORM_SCANNER_ANAT: i16 = 1;
const NIFTI_UNITS_MM: u8 = 2;

/// Write `volume` to `path` as `.nii.gz`, overwriting any existing file
pub fn write_nifti_gz(volume: &Volume, path: &Path) -> Result<(), CodecError> {
    let expected = volume.dims.iter().product::<usize>();
    if volume.voxels.len() != expected {
        return Err(CodecError::Encode(format!(
            "volume has {} voxels, dimensions {:?} need {}",
            volume.voxels.len(),
            volume.dims,
            expected
        )));
    }

    let header = encode_header(volume)?;
    let file = File::create(path)?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    encoder.write_all(&header)?;
    encoder.write_all(&[0u8; 4])?;
    for voxel in &volume.voxels {
        encoder.write_all(&voxel.to_le_bytes())?;
    }
    encoder.finish()?.flush()?;
    Ok(())
}

fn encode_header(volume: &Volume) -> Result<Vec<u8>, CodecError> {
    let mut header = vec![0u8; HEADER_SIZE];
    let mut dim = [1i16; 8];
    dim[0] = 3;
    for (axis, &size) in volume.dims.iter().enumerate() {
        dim[axis + 1] = i16::try_from(size).map_err(|_| {
            CodecError::Encode(format!("dimension {} exceeds the format limit", size))
        })?;
    }

    let affine = &volume.affine;
    let mut pixdim = [1.0f32; 8];
    for axis in 0..3 {
        let norm = (0..3).map(|row| affine[row][axis].powi(2)).sum::<f64>().sqrt();
        pixdim[axis + 1] = if norm > 0.0 { norm as f32 } else { 1.0 };
    }

    put_i32(&mut header, 0, HEADER_SIZE as i32);
    header[38] = b'r';
    for (i, value) in dim.iter().enumerate() {
        put_i16(&mut header, 40 + i * 2, *value);
    }
    put_i16(&mut header, 70, DT_FLOAT32);
    put_i16(&mut header, 72, 32);
    for (i, value) in pixdim.iter().enumerate() {
        put_f32(&mut header, 76 + i * 4, *value);
    }
    put_f32(&mut header, 108, VOX_OFFSET);
    put_f32(&mut header, 112, 1.0);
    header[123] = NIFTI_UNITS_MM;
    let descrip = b"medextract";
    header[148..148 + descrip.len()].copy_from_slice(descrip);
    put_i16(&mut header, 252, 0);
    put_i16(&mut header, 254, NIFTI_XFORM_SCANNER_ANAT);
    for (row, offset) in [280usize, 296, 312].into_iter().enumerate() {
        for col in 0..4 {
            put_f32(&mut header, offset + col * 4, affine[row][col] as f32);
        }
    }
    header[344..348].copy_from_slice(b"n+1\0");
    Ok(header)
}

fn put_i16(buf: &mut [u8], offset: usize, value: i16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_f32(buf: &mut [u8], offset: usize, value: f32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
