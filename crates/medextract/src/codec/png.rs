//! PNG encoding

use super::{BitDepth, CodecError, ColorMode, RenderedImage};
use image::{ImageBuffer, ImageFormat, Luma, Rgb};
use std::path::Path;

/// Write `image` as PNG at `path`, overwriting any existing file
pub fn write_png(image: &RenderedImage, path: &Path) -> Result<(), CodecError> {
    let (width, height) = (image.width, image.height);
    let result = match (image.color, image.bit_depth) {
        (ColorMode::Grey, BitDepth::Sixteen) => {
            ImageBuffer::<Luma<u16>, _>::from_raw(width, height, image.samples.clone())
                .ok_or_else(size_mismatch)?
                .save_with_format(path, ImageFormat::Png)
        }
        (ColorMode::Grey, BitDepth::Eight) => {
            ImageBuffer::<Luma<u8>, _>::from_raw(width, height, narrow(&image.samples))
                .ok_or_else(size_mismatch)?
                .save_with_format(path, ImageFormat::Png)
        }
        (ColorMode::Rgb, BitDepth::Sixteen) => {
            ImageBuffer::<Rgb<u16>, _>::from_raw(width, height, image.samples.clone())
                .ok_or_else(size_mismatch)?
                .save_with_format(path, ImageFormat::Png)
        }
        (ColorMode::Rgb, BitDepth::Eight) => {
            ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, narrow(&image.samples))
                .ok_or_else(size_mismatch)?
                .save_with_format(path, ImageFormat::Png)
        }
    };
    result.map_err(|e| CodecError::Encode(format!("{}: {}", path.display(), e)))
}

fn narrow(samples: &[u16]) -> Vec<u8> {
    samples.iter().map(|&s| s.min(u16::from(u8::MAX)) as u8).collect()
}

fn size_mismatch() -> CodecError {
    CodecError::Encode("sample count does not match image dimensions".to_string())
}
