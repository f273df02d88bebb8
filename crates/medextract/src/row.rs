//! Metadata rows
//!
//! A [`MetadataRow`] is an ordered field-name to value mapping. The schema
//! varies per item, but every row starts with the bookkeeping columns
//! (`file`, `artifactPath`, `errorCode`, `category`, `hasPixelData`) so that
//! resumption and merge can rely on them.

use crate::category::Category;
use crate::error::{ErrorCode, ItemError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Resumption key column
pub const FILE_COLUMN: &str = "file";
/// Rendered artifact location, empty when nothing was rendered
pub const ARTIFACT_COLUMN: &str = "artifactPath";
/// Integer error taxonomy
pub const ERROR_COLUMN: &str = "errorCode";
pub const CATEGORY_COLUMN: &str = "category";
pub const HAS_PIXELS_COLUMN: &str = "hasPixelData";

/// A single cell value
///
/// Lists are written as backslash-separated values, the multi-value
/// convention of the source format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Cell text as written to a table; `Null` is the empty missing marker
    pub fn to_cell(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str("\\")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// One result row for one work item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRow {
    fields: IndexMap<String, FieldValue>,
}

impl MetadataRow {
    /// Start a successful row for the given resumption key
    pub fn new(file: impl Into<String>, category: Category) -> Self {
        let mut fields = IndexMap::new();
        fields.insert(FILE_COLUMN.to_string(), FieldValue::Text(file.into()));
        fields.insert(ARTIFACT_COLUMN.to_string(), FieldValue::Null);
        fields.insert(
            ERROR_COLUMN.to_string(),
            FieldValue::Int(ErrorCode::Success.as_i64()),
        );
        fields.insert(
            CATEGORY_COLUMN.to_string(),
            FieldValue::Text(category.to_string()),
        );
        fields.insert(HAS_PIXELS_COLUMN.to_string(), FieldValue::Bool(false));
        Self { fields }
    }

    /// Row for an item that failed before any field could be extracted
    pub fn failed(file: impl Into<String>, category: Category, error: &ItemError) -> Self {
        let mut row = Self::new(file, category);
        row.set_error(error.code());
        row
    }

    /// Insert an extracted field. Bookkeeping columns cannot be replaced
    /// this way; a later value for the same name overwrites an earlier one.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        if is_bookkeeping(&name) {
            return;
        }
        self.fields.insert(name, value);
    }

    pub fn extend<I>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (String, FieldValue)>,
    {
        for (name, value) in fields {
            self.insert(name, value);
        }
    }

    pub fn set_artifact(&mut self, path: &Path) {
        self.fields.insert(
            ARTIFACT_COLUMN.to_string(),
            FieldValue::Text(path.to_string_lossy().into_owned()),
        );
    }

    pub fn set_error(&mut self, code: ErrorCode) {
        self.fields
            .insert(ERROR_COLUMN.to_string(), FieldValue::Int(code.as_i64()));
    }

    pub fn set_has_pixel_data(&mut self, present: bool) {
        self.fields
            .insert(HAS_PIXELS_COLUMN.to_string(), FieldValue::Bool(present));
    }

    pub fn file(&self) -> &str {
        match self.fields.get(FILE_COLUMN) {
            Some(FieldValue::Text(file)) => file,
            _ => "",
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self.fields.get(ERROR_COLUMN) {
            Some(FieldValue::Int(code)) => ErrorCode::from_i64(*code),
            _ => None,
        }
    }

    pub fn artifact_path(&self) -> Option<&str> {
        match self.fields.get(ARTIFACT_COLUMN) {
            Some(FieldValue::Text(path)) => Some(path),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn is_bookkeeping(name: &str) -> bool {
    matches!(
        name,
        FILE_COLUMN | ARTIFACT_COLUMN | ERROR_COLUMN | CATEGORY_COLUMN | HAS_PIXELS_COLUMN
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_row_has_bookkeeping_first() {
        let row = MetadataRow::new("/data/a.dcm", Category::Planar);
        let columns: Vec<_> = row.columns().collect();
        assert_eq!(
            columns,
            vec![FILE_COLUMN, ARTIFACT_COLUMN, ERROR_COLUMN, CATEGORY_COLUMN, HAS_PIXELS_COLUMN]
        );
        assert_eq!(row.file(), "/data/a.dcm");
        assert_eq!(row.error_code(), Some(ErrorCode::Success));
        assert_eq!(row.artifact_path(), None);
    }

    #[test]
    fn test_insert_keeps_order_and_overwrites() {
        let mut row = MetadataRow::new("a", Category::Generic);
        row.insert("Modality", "CT".into());
        row.insert("Rows", FieldValue::Int(512));
        row.insert("Modality", "MR".into());

        let columns: Vec<_> = row.columns().skip(5).collect();
        assert_eq!(columns, vec!["Modality", "Rows"]);
        assert_eq!(row.get("Modality"), Some(&FieldValue::Text("MR".into())));
    }

    #[test]
    fn test_bookkeeping_not_overwritten_by_fields() {
        let mut row = MetadataRow::new("a", Category::Generic);
        row.insert(FILE_COLUMN, "b".into());
        row.insert(ERROR_COLUMN, FieldValue::Int(9));
        assert_eq!(row.file(), "a");
        assert_eq!(row.error_code(), Some(ErrorCode::Success));
    }

    #[test]
    fn test_failed_row_carries_code() {
        let row = MetadataRow::failed(
            "a",
            Category::Planar,
            &ItemError::missing("PatientID"),
        );
        assert_eq!(row.error_code(), Some(ErrorCode::MissingField));
    }

    #[test]
    fn test_cell_rendering() {
        assert_eq!(FieldValue::Null.to_cell(), "");
        assert_eq!(FieldValue::Int(-3).to_cell(), "-3");
        assert_eq!(FieldValue::Float(0.5).to_cell(), "0.5");
        assert_eq!(FieldValue::Bool(true).to_cell(), "true");
        assert_eq!(
            FieldValue::List(vec![FieldValue::Float(0.7), FieldValue::Float(0.8)]).to_cell(),
            "0.7\\0.8"
        );
    }
}
