//! Multi-file series (CT, MR) stacked into one volume per directory

use super::render::rescale;
use super::{content_ids, CategoryStrategy, RunContext};
use crate::address::ALL_SERIES;
use crate::category::Category;
use crate::codec::{tags, Record, Volume};
use crate::discovery::has_extension;
use crate::error::ItemError;
use crate::row::{FieldValue, MetadataRow};
use crate::work::WorkItem;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const SERIES_FILE_COUNT_COLUMN: &str = "seriesFileCount";

#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesStrategy;

impl CategoryStrategy for SeriesStrategy {
    fn category(&self) -> Category {
        Category::VolumetricA
    }

    fn annotate(
        &self,
        item: &WorkItem,
        _record: &Record,
        row: &mut MetadataRow,
        ctx: &RunContext,
    ) -> Result<(), ItemError> {
        let files = series_files(item.directory(), &ctx.config.file_extension)?;
        row.insert(SERIES_FILE_COUNT_COLUMN, FieldValue::Int(files.len() as i64));
        Ok(())
    }

    fn render(&self, item: &WorkItem, record: &Record, ctx: &RunContext) -> Result<PathBuf, ItemError> {
        let (subject, study) = content_ids(record)?;
        let series = record.string(tags::SERIES_INSTANCE_UID);

        let mut slices = Vec::new();
        for path in series_files(item.directory(), &ctx.config.file_extension)? {
            let slice = if path == item.path {
                record.clone()
            } else {
                match ctx.codec.read_record(&path, true) {
                    Ok(slice) => slice,
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "Skipping unreadable slice");
                        continue;
                    }
                }
            };
            if slice.string(tags::SERIES_INSTANCE_UID) != series {
                debug!(file = %path.display(), "Ignoring slice from another series");
                continue;
            }
            let instance = slice.int(tags::INSTANCE_NUMBER).ok().flatten();
            slices.push((instance, path, slice));
        }
        if slices.is_empty() {
            return Err(ItemError::unclassified(format!(
                "no usable slices in {}",
                item.directory().display()
            )));
        }
        slices.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

        let mut dims = [0usize; 3];
        let mut voxels = Vec::new();
        for (_, path, slice) in &slices {
            let pixels = slice.pixel_array()?;
            if pixels.samples != 1 {
                return Err(ItemError::conversion(
                    "SamplesPerPixel",
                    "series volumes must be greyscale",
                ));
            }
            if dims[2] == 0 {
                dims = [pixels.columns, pixels.rows, 0];
            } else if dims[0] != pixels.columns || dims[1] != pixels.rows {
                return Err(ItemError::conversion(
                    "Rows",
                    format!(
                        "{} is {}x{}, series is {}x{}",
                        path.display(),
                        pixels.columns,
                        pixels.rows,
                        dims[0],
                        dims[1]
                    ),
                ));
            }
            let mut data = pixels.data;
            rescale(&mut data, slice)?;
            voxels.extend_from_slice(&data);
            dims[2] += pixels.frames;
        }

        let first = &slices[0].2;
        let last = &slices[slices.len() - 1].2;
        let volume = Volume {
            dims,
            affine: series_affine(first, last, slices.len())?,
            voxels,
        };
        let path = ctx
            .resolver
            .prepare(subject, study, series, ALL_SERIES, "nii.gz")?;
        ctx.codec.encode_volume(&volume, &path)?;
        debug!(
            directory = %item.directory().display(),
            slices = slices.len(),
            "Wrote series volume"
        );
        Ok(path)
    }
}

/// Files in `dir` with the configured extension, sorted by path
fn series_files(dir: &Path, extension: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && has_extension(&path, extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Voxel-to-RAS affine from the first and last slice positions
fn series_affine(first: &Record, last: &Record, slice_count: usize) -> Result<[[f64; 4]; 4], ItemError> {
    let orientation = first
        .numbers(tags::IMAGE_ORIENTATION_PATIENT)?
        .filter(|v| v.len() == 6)
        .unwrap_or_else(|| vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    let spacing = first.numbers(tags::PIXEL_SPACING)?.unwrap_or_default();
    let row_spacing = spacing.first().copied().unwrap_or(1.0);
    let column_spacing = spacing.get(1).copied().unwrap_or(row_spacing);
    let origin = position(first)?.unwrap_or([0.0; 3]);

    let row_dir = [orientation[0], orientation[1], orientation[2]];
    let column_dir = [orientation[3], orientation[4], orientation[5]];
    let x = row_dir.map(|v| v * column_spacing);
    let y = column_dir.map(|v| v * row_spacing);
    let z = match position(last)? {
        Some(end) if slice_count > 1 => {
            let steps = (slice_count - 1) as f64;
            [0, 1, 2].map(|i| (end[i] - origin[i]) / steps)
        }
        _ => {
            let thickness = first.number(tags::SLICE_THICKNESS)?.unwrap_or(1.0);
            cross(row_dir, column_dir).map(|v| v * thickness)
        }
    };

    let mut affine = [
        [x[0], y[0], z[0], origin[0]],
        [x[1], y[1], z[1], origin[1]],
        [x[2], y[2], z[2], origin[2]],
        [0.0, 0.0, 0.0, 1.0],
    ];
    // LPS to RAS
    for row in affine.iter_mut().take(2) {
        for value in row.iter_mut() {
            *value = -*value;
        }
    }
    Ok(affine)
}

fn position(record: &Record) -> Result<Option<[f64; 3]>, ItemError> {
    Ok(record
        .numbers(tags::IMAGE_POSITION_PATIENT)?
        .filter(|v| v.len() == 3)
        .map(|v| [v[0], v[1], v[2]]))
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}
