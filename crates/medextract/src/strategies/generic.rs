//! Metadata-only processing

use super::{CategoryStrategy, RunContext};
use crate::category::Category;
use crate::codec::Record;
use crate::error::ItemError;
use crate::work::WorkItem;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default)]
pub struct GenericStrategy;

impl CategoryStrategy for GenericStrategy {
    fn category(&self) -> Category {
        Category::Generic
    }

    fn renders(&self) -> bool {
        false
    }

    fn render(&self, item: &WorkItem, _record: &Record, _ctx: &RunContext) -> Result<PathBuf, ItemError> {
        Err(ItemError::unclassified(format!(
            "{} has no artifact to render",
            item.path.display()
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::super::test_support::*;
    use super::super::{process_item, Outcome};
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_generic_rows_have_no_artifact() {
        let temp = TempDir::new().unwrap();
        let record = image_record(Some("P1"), "1.2.840.10008.5.1.4.1.1.7", &[1, 2, 3, 4], 2, 2);
        let codec = Arc::new(MemoryCodec::default().with("/in/sc.dcm", record));
        let ctx = context(codec.clone(), temp.path());

        let item = WorkItem::new(Category::Generic, "/in/sc.dcm");
        let Outcome::Row(row) = process_item(&GenericStrategy, &item, &ctx) else {
            panic!("expected a row");
        };
        assert!(row.artifact_path().is_none());
        assert!(codec.images.lock().unwrap().is_empty());
        assert_eq!(row.get("category").unwrap().to_cell(), "Generic");
    }
}
