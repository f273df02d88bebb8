//! Single-file multi-frame volumes (breast tomosynthesis, OCT)

use super::render::{clamp, estimate_laterality, flip_horizontal, rescale, window_bounds, Laterality};
use super::{content_ids, CategoryStrategy, RunContext};
use crate::address::ALL_INSTANCES;
use crate::category::{Category, OPHTHALMIC_TOMOGRAPHY_CLASS, TOMOSYNTHESIS_CLASS};
use crate::codec::{tags, Record, Tag, Volume};
use crate::error::ItemError;
use crate::work::WorkItem;
use std::path::PathBuf;
use tracing::debug;

const IMAGE_LATERALITY: Tag = Tag::new(0x0020, 0x0062);
const LATERALITY: Tag = Tag::new(0x0020, 0x0060);

#[derive(Debug, Clone, Copy, Default)]
pub struct MultiFrameStrategy;

impl CategoryStrategy for MultiFrameStrategy {
    fn category(&self) -> Category {
        Category::VolumetricB
    }

    fn accepts(&self, record: &Record) -> bool {
        matches!(
            record.string(tags::SOP_CLASS_UID),
            Some(TOMOSYNTHESIS_CLASS | OPHTHALMIC_TOMOGRAPHY_CLASS)
        )
    }

    fn render(&self, item: &WorkItem, record: &Record, ctx: &RunContext) -> Result<PathBuf, ItemError> {
        let (subject, study) = content_ids(record)?;
        let pixels = record.pixel_array()?;
        if pixels.samples != 1 {
            return Err(ItemError::conversion(
                "SamplesPerPixel",
                "multi-frame volumes must be greyscale",
            ));
        }

        let mut voxels = pixels.data;
        rescale(&mut voxels, record)?;
        if ctx.config.apply_window {
            if let Some(bounds) = window_bounds(record)? {
                clamp(&mut voxels, bounds);
            }
        }

        let recorded = [tags::FRAME_LATERALITY, IMAGE_LATERALITY, LATERALITY]
            .into_iter()
            .find_map(|tag| record.find_string(tag).and_then(Laterality::parse));
        if let Some(recorded) = recorded {
            let estimated = estimate_laterality(&voxels, pixels.columns);
            if estimated != recorded {
                debug!(
                    file = %item.path.display(),
                    recorded = ?recorded,
                    estimated = ?estimated,
                    "Flipping volume to match recorded laterality"
                );
                flip_horizontal(&mut voxels, pixels.columns);
            }
        }

        let volume = Volume {
            dims: [pixels.columns, pixels.rows, pixels.frames],
            affine: frame_affine(record)?,
            voxels,
        };
        let path = ctx.resolver.prepare(
            subject,
            study,
            record.string(tags::SOP_INSTANCE_UID),
            ALL_INSTANCES,
            "nii.gz",
        )?;
        ctx.codec.encode_volume(&volume, &path)?;
        Ok(path)
    }
}

/// Axis-aligned affine from the (possibly nested) pixel measures
fn frame_affine(record: &Record) -> Result<[[f64; 4]; 4], ItemError> {
    let spacing = record.find_numbers(tags::PIXEL_SPACING)?.unwrap_or_default();
    let row_spacing = spacing.first().copied().unwrap_or(1.0);
    let column_spacing = spacing.get(1).copied().unwrap_or(row_spacing);
    let thickness = record.find_number(tags::SLICE_THICKNESS)?.unwrap_or(1.0);
    Ok([
        [-column_spacing, 0.0, 0.0, 0.0],
        [0.0, -row_spacing, 0.0, 0.0],
        [0.0, 0.0, thickness, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ])
}
