//! Per-category processing
//!
//! Every item goes through the same skeleton, [`process_item`]:
//! read the record, extract fields, optionally render an artifact, emit a
//! row. A [`CategoryStrategy`] supplies the category-specific parts.
//!
//! | Category | Artifact | Leaf identifier |
//! |---|---|---|
//! | VolumetricA | `.nii.gz` of the series directory | SeriesInstanceUID |
//! | VolumetricB | `.nii.gz` of the multi-frame file | SOPInstanceUID |
//! | Planar | `.png` | SOPInstanceUID |
//! | Generic | none | - |

pub mod generic;
pub mod multiframe;
pub mod planar;
pub mod render;
pub mod series;

pub use generic::GenericStrategy;
pub use multiframe::MultiFrameStrategy;
pub use planar::PlanarStrategy;
pub use series::SeriesStrategy;

use crate::address::AddressResolver;
use crate::category::Category;
use crate::codec::{tags, ImageCodec, Record};
use crate::config::ExtractConfig;
use crate::error::ItemError;
use crate::row::MetadataRow;
use crate::work::WorkItem;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Read-only state shared by every worker for one run
#[derive(Clone)]
pub struct RunContext {
    pub config: Arc<ExtractConfig>,
    pub codec: Arc<dyn ImageCodec>,
    pub resolver: AddressResolver,
}

/// Result of processing one item
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Row(MetadataRow),
    /// Intentionally excluded, not an error
    Skipped,
}

/// Category-specific behaviour plugged into [`process_item`]
pub trait CategoryStrategy: Send + Sync {
    fn category(&self) -> Category;

    /// Whether this strategy writes an artifact at all
    fn renders(&self) -> bool {
        true
    }

    /// Items this strategy does not handle are skipped
    fn accepts(&self, _record: &Record) -> bool {
        true
    }

    /// Add category-specific columns
    fn annotate(
        &self,
        _item: &WorkItem,
        _record: &Record,
        _row: &mut MetadataRow,
        _ctx: &RunContext,
    ) -> Result<(), ItemError> {
        Ok(())
    }

    /// Render and write the artifact, returning where it was written
    fn render(&self, item: &WorkItem, record: &Record, ctx: &RunContext)
        -> Result<PathBuf, ItemError>;
}

/// The shared pipeline skeleton. Never fails: errors become error-coded rows.
pub fn process_item(strategy: &dyn CategoryStrategy, item: &WorkItem, ctx: &RunContext) -> Outcome {
    let key = item.key();
    let category = strategy.category();
    let render = ctx.config.save_images && strategy.renders();

    let record = match ctx.codec.read_record(&item.path, render) {
        Ok(record) => record,
        Err(e) => {
            let error = ItemError::from(e);
            warn!(
                file = %key,
                error_code = error.code().as_i64(),
                error = %error,
                "Failed to read record"
            );
            return Outcome::Row(MetadataRow::failed(key, category, &error));
        }
    };

    if !strategy.accepts(&record) {
        debug!(file = %key, category = %category, "Skipping unsupported item");
        return Outcome::Skipped;
    }

    let mut row = MetadataRow::new(key, category);
    row.set_has_pixel_data(record.has_pixel_data());
    row.extend(ctx.codec.extract_fields(&record, &ctx.config.field_options()));

    if let Err(error) = strategy.annotate(item, &record, &mut row, ctx) {
        record_failure(&mut row, &error, "Failed to annotate row");
        return Outcome::Row(row);
    }

    if render && record.has_pixel_data() {
        match strategy.render(item, &record, ctx) {
            Ok(path) => row.set_artifact(&path),
            Err(error) => record_failure(&mut row, &error, "Failed to render artifact"),
        }
    }

    Outcome::Row(row)
}

fn record_failure(row: &mut MetadataRow, error: &ItemError, message: &str) {
    warn!(
        file = %row.file(),
        error_code = error.code().as_i64(),
        error = %error,
        "{}",
        message
    );
    row.set_error(error.code());
}

/// Subject and study identifiers used for artifact placement
pub(crate) fn content_ids(record: &Record) -> Result<(&str, Option<&str>), ItemError> {
    let subject = record
        .string(tags::PATIENT_ID)
        .ok_or_else(|| ItemError::missing("PatientID"))?;
    Ok((subject, record.string(tags::STUDY_INSTANCE_UID)))
}
