//! Resumption from earlier batches
//!
//! Every committed batch lists the keys it covered in its `file` column.
//! Loading those keys and removing them from the work list is what makes a
//! restarted run pick up where the last one stopped.

use crate::batch::list_batches;
use crate::error::{ExtractError, Result};
use crate::row::FILE_COLUMN;
use crate::work::WorkList;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// What earlier runs committed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeState {
    completed: HashSet<String>,
    batch_count: usize,
    rows: usize,
    next_batch_id: u64,
}

impl ResumeState {
    /// Nothing committed yet
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read every committed batch in `meta_dir`
    ///
    /// # Errors
    ///
    /// `InvalidBatch` when a batch has no `file` column; CSV errors otherwise.
    pub fn load(meta_dir: &Path) -> Result<Self> {
        let mut state = Self::empty();
        for (id, path) in list_batches(meta_dir)? {
            let mut reader = csv::Reader::from_path(&path)?;
            let column = reader
                .headers()?
                .iter()
                .position(|name| name == FILE_COLUMN)
                .ok_or_else(|| ExtractError::invalid_batch(&path, "missing 'file' column"))?;
            for record in reader.records() {
                let record = record?;
                if let Some(key) = record.get(column) {
                    state.completed.insert(key.to_string());
                }
                state.rows += 1;
            }
            state.batch_count += 1;
            state.next_batch_id = state.next_batch_id.max(id + 1);
        }
        if state.batch_count > 0 {
            info!(
                batches = state.batch_count,
                rows = state.rows,
                keys = state.completed.len(),
                next_batch_id = state.next_batch_id,
                "Loaded resume state"
            );
        }
        Ok(state)
    }

    pub fn completed(&self) -> &HashSet<String> {
        &self.completed
    }

    pub fn batch_count(&self) -> usize {
        self.batch_count
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// `max(existing id) + 1`, or 0 when nothing was committed
    pub fn next_batch_id(&self) -> u64 {
        self.next_batch_id
    }

    /// Remove already-committed items from `work`, returning how many
    ///
    /// # Errors
    ///
    /// `ResumeKeyMismatch` when earlier batches recorded rows but none of
    /// their keys match a pending item. That only happens when the recorded
    /// keys and the work list disagree on granularity or input root, and
    /// continuing would reprocess everything.
    pub fn prune(&self, work: &mut WorkList) -> Result<usize> {
        let pending = work.len();
        let removed = work.remove_keys(&self.completed);
        if self.rows > 0 && removed == 0 && pending > 0 {
            return Err(ExtractError::ResumeKeyMismatch {
                recorded_keys: self.completed.len(),
                batch_count: self.batch_count,
                work_items: pending,
            });
        }
        if removed > 0 {
            info!(removed, remaining = work.len(), "Pruned completed items");
        }
        Ok(removed)
    }
}

/// `work` without the items whose key is in `completed`
pub fn prune(mut work: WorkList, completed: &HashSet<String>) -> WorkList {
    work.remove_keys(completed);
    work
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::batch::BatchWriter;
    use crate::category::Category;
    use crate::row::MetadataRow;
    use crate::work::WorkItem;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn commit(meta: &Path, items: &[WorkItem], batch_size: usize, first_id: u64) {
        let mut writer = BatchWriter::new(meta, batch_size, first_id);
        for item in items {
            writer
                .accumulate(MetadataRow::new(item.key(), item.category))
                .unwrap();
        }
        writer.finish().unwrap();
    }

    fn sample() -> WorkList {
        let mut list = WorkList::new();
        for series in 0..3 {
            list.push(Category::VolumetricA, format!("/in/ct/{}/0001.dcm", series));
        }
        for n in 0..5 {
            list.push(Category::Planar, format!("/in/dx/{}.dcm", n));
        }
        list
    }

    #[test]
    fn test_no_batches_is_empty_state() {
        let temp = TempDir::new().unwrap();
        let state = ResumeState::load(&temp.path().join("meta")).unwrap();
        assert_eq!(state, ResumeState::empty());
        assert_eq!(state.next_batch_id(), 0);

        let mut work = sample();
        assert_eq!(state.prune(&mut work).unwrap(), 0);
        assert_eq!(work, sample());
    }

    #[test]
    fn test_prune_removes_committed_items() {
        let temp = TempDir::new().unwrap();
        let items = sample().into_items();
        commit(temp.path(), &items[..4], 2, 0);

        let state = ResumeState::load(temp.path()).unwrap();
        assert_eq!(state.batch_count(), 2);
        assert_eq!(state.rows(), 4);
        assert_eq!(state.next_batch_id(), 2);

        let mut work = sample();
        assert_eq!(state.prune(&mut work).unwrap(), 4);
        assert_eq!(work.len(), 4);
        for item in work.items() {
            assert!(!state.completed().contains(&item.key()));
        }
    }

    #[test]
    fn test_next_id_follows_highest_batch() {
        let temp = TempDir::new().unwrap();
        let items = sample().into_items();
        commit(temp.path(), &items[..1], 1, 0);
        commit(temp.path(), &items[1..2], 1, 7);
        assert_eq!(ResumeState::load(temp.path()).unwrap().next_batch_id(), 8);
    }

    #[test]
    fn test_granularity_mismatch_is_fatal() {
        let temp = TempDir::new().unwrap();
        // Series rows recorded per file instead of per directory
        let mut writer = BatchWriter::new(temp.path(), 10, 0);
        for series in 0..3 {
            writer
                .accumulate(MetadataRow::new(
                    format!("/in/ct/{}/0001.dcm", series),
                    Category::VolumetricA,
                ))
                .unwrap();
        }
        writer.finish().unwrap();

        let state = ResumeState::load(temp.path()).unwrap();
        let mut work = WorkList::new();
        for series in 0..3 {
            work.push(Category::VolumetricA, format!("/in/ct/{}/0001.dcm", series));
        }
        let err = state.prune(&mut work).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::ResumeKeyMismatch { recorded_keys: 3, batch_count: 1, work_items: 3 }
        ));
    }

    #[test]
    fn test_batch_without_file_column_rejected() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("batch_0.csv"), "path,errorCode\n/a,0\n").unwrap();
        let err = ResumeState::load(temp.path()).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidBatch { .. }));
    }

    fn work_list() -> impl Strategy<Value = WorkList> {
        prop::collection::vec((0usize..4, 0u32..50, 0u32..4), 0..60).prop_map(|entries| {
            entries
                .into_iter()
                .map(|(category, dir, file)| {
                    WorkItem::new(
                        Category::ALL[category],
                        format!("/in/d{}/{}.dcm", dir, file),
                    )
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_prune_without_history_is_identity(work in work_list()) {
            prop_assert_eq!(prune(work.clone(), &HashSet::new()), work);
        }

        #[test]
        fn prop_prune_with_full_history_is_empty(work in work_list(), batch_size in 1usize..7) {
            let temp = TempDir::new().unwrap();
            let items = work.clone().into_items();
            commit(temp.path(), &items, batch_size, 0);

            let state = ResumeState::load(temp.path()).unwrap();
            prop_assert!(prune(work, state.completed()).is_empty());
        }

        #[test]
        fn prop_pruned_items_never_recorded(work in work_list(), split in 0usize..60) {
            let temp = TempDir::new().unwrap();
            let items = work.clone().into_items();
            let split = split.min(items.len());
            commit(temp.path(), &items[..split], 5, 0);

            let state = ResumeState::load(temp.path()).unwrap();
            for item in prune(work, state.completed()).items() {
                prop_assert!(!state.completed().contains(&item.key()));
            }
        }
    }
}
