//! Single projection images rendered to PNG

use super::render::{clamp, rescale, scale_to_u16, to_rgb8, window_bounds};
use super::{content_ids, CategoryStrategy, RunContext};
use crate::address::ALL_INSTANCES;
use crate::category::Category;
use crate::codec::{tags, BitDepth, ColorMode, Record, RenderedImage};
use crate::error::ItemError;
use crate::work::WorkItem;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarStrategy;

impl CategoryStrategy for PlanarStrategy {
    fn category(&self) -> Category {
        Category::Planar
    }

    fn render(&self, item: &WorkItem, record: &Record, ctx: &RunContext) -> Result<PathBuf, ItemError> {
        let (subject, study) = content_ids(record)?;
        let pixels = record.pixel_array()?;
        if pixels.frames > 1 {
            debug!(file = %item.path.display(), frames = pixels.frames, "Rendering first frame only");
        }
        let mut frame = pixels.frame(0).map(<[f32]>::to_vec).unwrap_or_default();

        let image = match pixels.samples {
            1 => {
                rescale(&mut frame, record)?;
                if ctx.config.apply_window {
                    if let Some(bounds) = window_bounds(record)? {
                        clamp(&mut frame, bounds);
                    }
                }
                RenderedImage {
                    width: pixels.columns as u32,
                    height: pixels.rows as u32,
                    bit_depth: BitDepth::Sixteen,
                    color: ColorMode::Grey,
                    samples: scale_to_u16(&frame),
                }
            }
            3 => RenderedImage {
                width: pixels.columns as u32,
                height: pixels.rows as u32,
                bit_depth: BitDepth::Eight,
                color: ColorMode::Rgb,
                samples: to_rgb8(&frame),
            },
            other => {
                return Err(ItemError::conversion(
                    "SamplesPerPixel",
                    format!("{} samples per pixel cannot be rendered", other),
                ))
            }
        };

        let path = ctx.resolver.prepare(
            subject,
            study,
            record.string(tags::SOP_INSTANCE_UID),
            ALL_INSTANCES,
            "png",
        )?;
        ctx.codec.encode_image(&image, &path)?;
        Ok(path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::error::ErrorCode;
    use crate::codec::{DicomCodec, Element, Vr};
    use std::sync::Arc;
    use tempfile::TempDir;

    const MG: &str = "1.2.840.10008.5.1.4.1.1.1.2";

    #[test]
    fn test_path_is_content_addressed() {
        let temp = TempDir::new().unwrap();
        let codec = Arc::new(MemoryCodec::default());
        let ctx = context(codec.clone(), temp.path());
        let record = image_record(Some("P1"), MG, &[0, 10, 20, 30], 2, 2);
        let item = WorkItem::new(Category::Planar, "/in/a.dcm");

        let path = PlanarStrategy.render(&item, &record, &ctx).unwrap();
        assert_eq!(
            path,
            ctx.resolver.resolve("P1", "1.2.3", "1.2.3.4.5", "png")
        );
        // Rendering again lands on the same path
        assert_eq!(PlanarStrategy.render(&item, &record, &ctx).unwrap(), path);
    }

    #[test]
    fn test_png_written_with_real_encoder() {
        let temp = TempDir::new().unwrap();
        let ctx = context(Arc::new(DicomCodec::new()), temp.path());
        let record = image_record(Some("P1"), MG, &[0, 100, 200, 400], 2, 2);
        let item = WorkItem::new(Category::Planar, "/in/a.dcm");

        let path = PlanarStrategy.render(&item, &record, &ctx).unwrap();
        let png = image::open(&path).unwrap().into_luma16();
        assert_eq!(png.dimensions(), (2, 2));
        assert_eq!(png.get_pixel(1, 1).0[0], 65535);
        assert_eq!(png.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn test_window_applied_when_enabled() {
        let temp = TempDir::new().unwrap();
        let ctx = context(Arc::new(DicomCodec::new()), temp.path());
        let record = image_record(Some("P1"), MG, &[0, 100, 200, 400], 2, 2)
            .with(Element::text(tags::WINDOW_CENTER, Vr::DS, "150"))
            .with(Element::text(tags::WINDOW_WIDTH, Vr::DS, "100"));
        let item = WorkItem::new(Category::Planar, "/in/a.dcm");

        let path = PlanarStrategy.render(&item, &record, &ctx).unwrap();
        let png = image::open(&path).unwrap().into_luma16();
        // 0 clamps to 100, 400 clamps to 200: both ends stay distinct from 0
        assert_eq!(png.get_pixel(0, 0).0[0], 32767);
        assert_eq!(png.get_pixel(1, 1).0[0], 65535);
    }

    #[test]
    fn test_unsupported_samples() {
        let temp = TempDir::new().unwrap();
        let ctx = context(Arc::new(MemoryCodec::default()), temp.path());
        let record = image_record(Some("P1"), MG, &[0, 1, 2, 3], 1, 2)
            .with(Element::ints(tags::SAMPLES_PER_PIXEL, Vr::US, vec![2]));
        let item = WorkItem::new(Category::Planar, "/in/a.dcm");
        let err = PlanarStrategy.render(&item, &record, &ctx).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conversion);
    }
}
