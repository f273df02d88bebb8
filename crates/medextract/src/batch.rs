//! Batch metadata files
//!
//! Rows are buffered by a single [`BatchWriter`] owned by the session and
//! flushed as numbered CSV tables `batch_<n>.csv`. A batch is written to a
//! `.tmp` sibling and renamed into place, so a reader never observes a
//! partial file, and an existing batch is never overwritten.

use crate::error::{ExtractError, Result};
use crate::row::MetadataRow;
use indexmap::IndexSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ============================================================================
// File Naming
// ============================================================================

pub const BATCH_PREFIX: &str = "batch_";
pub const TABLE_EXTENSION: &str = "csv";
pub const PARTIAL_SUFFIX: &str = ".tmp";

pub fn batch_file_name(id: u64) -> String {
    format!("{}{}.{}", BATCH_PREFIX, id, TABLE_EXTENSION)
}

/// Batch id of a file named `batch_<digits>.csv`
pub fn parse_batch_id(file_name: &str) -> Option<u64> {
    let digits = file_name
        .strip_prefix(BATCH_PREFIX)?
        .strip_suffix(TABLE_EXTENSION)?
        .strip_suffix('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Committed batches in `meta_dir`, sorted by id
///
/// A missing directory has no batches. Other files are ignored.
pub fn list_batches(meta_dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    if !meta_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut batches = Vec::new();
    for entry in fs::read_dir(meta_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(id) = name.to_str().and_then(parse_batch_id) {
            batches.push((id, entry.path()));
        }
    }
    batches.sort();
    Ok(batches)
}

/// Remove partial batch files left by an interrupted flush
pub fn remove_partial_batches(meta_dir: &Path) -> Result<usize> {
    if !meta_dir.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in fs::read_dir(meta_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(BATCH_PREFIX) && name.ends_with(PARTIAL_SUFFIX) {
            warn!(file = %entry.path().display(), "Removing partial batch file");
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Write rows as one table at `path` via a temporary sibling
///
/// The header is the union of the rows' columns in first-seen order.
pub fn write_table(path: &Path, rows: &[MetadataRow]) -> Result<()> {
    let columns: IndexSet<&str> = rows.iter().flat_map(MetadataRow::columns).collect();

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(PARTIAL_SUFFIX);
    let tmp = PathBuf::from(tmp);

    let mut writer = csv::Writer::from_path(&tmp)?;
    writer.write_record(&columns)?;
    for row in rows {
        writer.write_record(
            columns
                .iter()
                .map(|column| row.get(column).map(|v| v.to_cell()).unwrap_or_default()),
        )?;
    }
    writer.flush()?;
    drop(writer);
    fs::rename(&tmp, path)?;
    Ok(())
}

// ============================================================================
// Writer
// ============================================================================

/// Buffers rows and flushes them as numbered batches
#[derive(Debug)]
pub struct BatchWriter {
    meta_dir: PathBuf,
    threshold: usize,
    next_id: u64,
    buffer: Vec<MetadataRow>,
    written: Vec<u64>,
    rows_written: usize,
}

impl BatchWriter {
    /// Writer whose first batch gets id `first_id`
    pub fn new(meta_dir: impl Into<PathBuf>, threshold: usize, first_id: u64) -> Self {
        let threshold = threshold.max(1);
        Self {
            meta_dir: meta_dir.into(),
            threshold,
            next_id: first_id,
            buffer: Vec::with_capacity(threshold),
            written: Vec::new(),
            rows_written: 0,
        }
    }

    /// Buffer a row, flushing once the threshold is reached
    ///
    /// Returns the id of the batch written, if any.
    pub fn accumulate(&mut self, row: MetadataRow) -> Result<Option<u64>> {
        self.buffer.push(row);
        if self.buffer.len() >= self.threshold {
            self.flush()
        } else {
            Ok(None)
        }
    }

    /// Write the buffer as the next batch; no-op when empty
    pub fn flush(&mut self) -> Result<Option<u64>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let id = self.next_id;
        let path = self.meta_dir.join(batch_file_name(id));
        if path.exists() {
            return Err(ExtractError::BatchExists(path));
        }

        write_table(&path, &self.buffer)?;
        info!(batch_id = id, rows = self.buffer.len(), path = %path.display(), "Flushed batch");

        self.rows_written += self.buffer.len();
        self.buffer.clear();
        self.written.push(id);
        self.next_id += 1;
        Ok(Some(id))
    }

    /// Flush the remainder and report what was written
    pub fn finish(mut self) -> Result<BatchSummary> {
        self.flush()?;
        Ok(BatchSummary {
            batch_ids: self.written,
            rows: self.rows_written,
        })
    }

    /// Drop buffered rows without writing them, returning how many were dropped
    pub fn discard(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        debug!(rows = dropped, "Discarded unflushed rows");
        dropped
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn written(&self) -> &[u64] {
        &self.written
    }
}

/// What a writer committed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub batch_ids: Vec<u64>,
    pub rows: usize,
}
