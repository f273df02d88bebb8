//! Final catalog merge
//!
//! Two passes over the committed batches: collect the union of their
//! headers, then stream every row in batch id order, leaving columns a
//! batch does not have empty. Only one batch is read at a time.

use crate::batch::{list_batches, PARTIAL_SUFFIX};
use crate::error::Result;
use crate::row::{ARTIFACT_COLUMN, CATEGORY_COLUMN, ERROR_COLUMN, FILE_COLUMN, HAS_PIXELS_COLUMN};
use indexmap::IndexSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Header used when there is nothing to merge
const BOOKKEEPING_COLUMNS: [&str; 5] = [
    FILE_COLUMN,
    ARTIFACT_COLUMN,
    ERROR_COLUMN,
    CATEGORY_COLUMN,
    HAS_PIXELS_COLUMN,
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub batches: usize,
    pub rows: usize,
    pub columns: usize,
}

/// Merge every batch in `meta_dir` into `catalog`, replacing it
pub fn merge_batches(meta_dir: &Path, catalog: &Path) -> Result<MergeSummary> {
    let batches = list_batches(meta_dir)?;

    let mut columns: IndexSet<String> = IndexSet::new();
    for (_, path) in &batches {
        let mut reader = csv::Reader::from_path(path)?;
        columns.extend(reader.headers()?.iter().map(str::to_string));
    }
    if columns.is_empty() {
        columns.extend(BOOKKEEPING_COLUMNS.iter().map(|c| c.to_string()));
    }

    let mut tmp = catalog.as_os_str().to_owned();
    tmp.push(PARTIAL_SUFFIX);
    let tmp = PathBuf::from(tmp);

    let mut writer = csv::Writer::from_path(&tmp)?;
    writer.write_record(&columns)?;
    let mut rows = 0;
    for (id, path) in &batches {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        let positions: Vec<Option<usize>> = columns
            .iter()
            .map(|column| headers.iter().position(|h| h == column.as_str()))
            .collect();

        let mut batch_rows = 0;
        for record in reader.records() {
            let record = record?;
            writer.write_record(
                positions
                    .iter()
                    .map(|position| position.and_then(|i| record.get(i)).unwrap_or("")),
            )?;
            batch_rows += 1;
        }
        debug!(batch_id = id, rows = batch_rows, "Merged batch");
        rows += batch_rows;
    }
    writer.flush()?;
    drop(writer);
    fs::rename(&tmp, catalog)?;

    let summary = MergeSummary {
        batches: batches.len(),
        rows,
        columns: columns.len(),
    };
    info!(
        catalog = %catalog.display(),
        batches = summary.batches,
        rows = summary.rows,
        columns = summary.columns,
        "Merged batches into catalog"
    );
    Ok(summary)
}
