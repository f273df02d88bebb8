//! Error types for extraction runs
//!
//! Two families live here. [`ExtractError`] is a run-level failure: it stops
//! the run and surfaces to the operator. [`ItemError`] is a per-item failure:
//! it is caught at the item boundary and recorded in the metadata row as an
//! integer [`ErrorCode`], never propagated to the pool.

use crate::category::Category;
use crate::codec::CodecError;
use crate::registry::StrategySet;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for run-level operations
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Run-level error. Any of these aborts the run.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A category present in the work set has no registered strategy
    #[error("No strategy registered for category {category} in strategy set '{strategy_set}'")]
    UnregisteredCategory {
        category: Category,
        strategy_set: StrategySet,
    },

    /// Prior batches exist but none of their keys matched the work set
    #[error(
        "Resume key mismatch: {recorded_keys} keys recorded across {batch_count} batches, \
         but none matched the {work_items} pending work items. The recorded 'file' values \
         and the work list disagree on key granularity or input root."
    )]
    ResumeKeyMismatch {
        recorded_keys: usize,
        batch_count: usize,
        work_items: usize,
    },

    #[error("Batch file already exists: {0}. Batches are immutable, refusing to overwrite.")]
    BatchExists(PathBuf),

    #[error("Invalid batch file {path}: {reason}")]
    InvalidBatch { path: PathBuf, reason: String },

    #[error("Work list snapshot {path} is unusable: {reason}. Delete it to force re-discovery.")]
    Snapshot { path: PathBuf, reason: String },

    #[error("Run interrupted; {committed_batches} batches committed this run, {discarded_rows} buffered rows discarded")]
    Interrupted {
        committed_batches: usize,
        discarded_rows: usize,
    },

    #[error(transparent)]
    Common(#[from] medextract_common::CommonError),
}

impl ExtractError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a snapshot error
    pub fn snapshot(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Snapshot {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid batch error
    pub fn invalid_batch(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidBatch {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Integer error taxonomy recorded in every metadata row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ErrorCode {
    /// Processed (possibly without a renderable payload)
    Success = 0,
    /// A required field was missing or unreadable
    MissingField = 1,
    /// A value could not be converted or was out of range
    Conversion = 2,
    /// Any other failure during extraction or encoding
    Unclassified = 3,
}

impl ErrorCode {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(ErrorCode::Success),
            1 => Some(ErrorCode::MissingField),
            2 => Some(ErrorCode::Conversion),
            3 => Some(ErrorCode::Unclassified),
            _ => None,
        }
    }
}

/// Per-item failure, recorded rather than thrown
#[derive(Error, Debug)]
pub enum ItemError {
    #[error("missing required field {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {reason}")]
    Conversion { field: String, reason: String },

    #[error("{0}")]
    Unclassified(String),
}

impl ItemError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    pub fn conversion(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conversion {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn unclassified(msg: impl Into<String>) -> Self {
        Self::Unclassified(msg.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ItemError::MissingField(_) => ErrorCode::MissingField,
            ItemError::Conversion { .. } => ErrorCode::Conversion,
            ItemError::Unclassified(_) => ErrorCode::Unclassified,
        }
    }
}

impl From<CodecError> for ItemError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::MissingField(field) => ItemError::MissingField(field),
            CodecError::InvalidValue { field, reason } => ItemError::Conversion { field, reason },
            other => ItemError::Unclassified(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ItemError {
    fn from(err: std::io::Error) -> Self {
        ItemError::Unclassified(format!("IO error: {}", err))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_roundtrip() {
        for code in [
            ErrorCode::Success,
            ErrorCode::MissingField,
            ErrorCode::Conversion,
            ErrorCode::Unclassified,
        ] {
            assert_eq!(ErrorCode::from_i64(code.as_i64()), Some(code));
        }
        assert_eq!(ErrorCode::from_i64(7), None);
    }

    #[test]
    fn test_codec_errors_map_to_taxonomy() {
        let missing: ItemError = CodecError::MissingField("PatientID".into()).into();
        assert_eq!(missing.code(), ErrorCode::MissingField);

        let invalid: ItemError = CodecError::InvalidValue {
            field: "Rows".into(),
            reason: "not a number".into(),
        }
        .into();
        assert_eq!(invalid.code(), ErrorCode::Conversion);

        let malformed: ItemError = CodecError::Malformed("truncated element".into()).into();
        assert_eq!(malformed.code(), ErrorCode::Unclassified);
    }

    #[test]
    fn test_io_errors_are_unclassified() {
        let err: ItemError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert_eq!(err.code(), ErrorCode::Unclassified);
        assert!(err.to_string().contains("disk full"));
    }
}
