//! Source tree discovery and categorization
//!
//! Walks the input tree, probes each candidate's storage class on the worker
//! pool and buckets the files into a [`WorkList`]. Series categories keep one
//! representative file per directory.

use crate::category::{Category, KeyGranularity};
use crate::codec::{tags, ImageCodec};
use crate::error::{ExtractError, Result};
use crate::executor::Executor;
use crate::progress::{create_progress_bar, create_spinner, ProgressTracker};
use crate::work::WorkList;
use futures::StreamExt;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Case-insensitive extension match; `extension` may carry a leading dot
pub fn has_extension(path: &Path, extension: &str) -> bool {
    let wanted = extension.trim_start_matches('.');
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(wanted))
}

/// Every regular file under `root` with the extension, sorted by path
///
/// Unreadable entries are logged and skipped.
pub fn candidate_files(root: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry during discovery");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && has_extension(entry.path(), extension))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}

/// First file (by sorted path) of each directory
pub fn first_per_directory(files: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    files
        .into_iter()
        .filter(|path| seen.insert(path.parent().map(Path::to_path_buf)))
        .collect()
}

/// Category from the probed storage class; unreadable files are [`Category::Generic`]
pub fn categorize(codec: &dyn ImageCodec, path: &Path) -> Category {
    match codec.probe_header_field(path, tags::SOP_CLASS_UID) {
        Ok(Some(uid)) => Category::from_storage_class(&uid),
        Ok(None) => {
            debug!(file = %path.display(), "No storage class, treating as generic");
            Category::Generic
        }
        Err(e) => {
            warn!(file = %path.display(), error = %e, "Header probe failed, treating as generic");
            Category::Generic
        }
    }
}

/// Discovery pass over one input tree
pub struct Discovery {
    codec: Arc<dyn ImageCodec>,
    executor: Executor,
    extension: String,
    parent_filter: bool,
    show_progress: bool,
}

impl Discovery {
    pub fn new(codec: Arc<dyn ImageCodec>, workers: usize, extension: impl Into<String>) -> Self {
        Self {
            codec,
            executor: Executor::new(workers),
            extension: extension.into(),
            parent_filter: false,
            show_progress: false,
        }
    }

    /// Probe only the first file of each directory and file it under that category
    pub fn with_parent_filter(mut self, enabled: bool) -> Self {
        self.parent_filter = enabled;
        self
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    pub async fn discover(&self, root: &Path) -> Result<WorkList> {
        let walk_root = root.to_path_buf();
        let extension = self.extension.clone();
        let spinner = self.show_progress.then(|| create_spinner("Scanning input tree"));
        let mut files = tokio::task::spawn_blocking(move || candidate_files(&walk_root, &extension))
            .await
            .map_err(|e| ExtractError::Io(std::io::Error::other(e)))?;
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
        let found = files.len();
        if self.parent_filter {
            files = first_per_directory(files);
        }
        info!(
            root = %root.display(),
            files = found,
            probed = files.len(),
            parent_filter = self.parent_filter,
            "Probing candidate files"
        );

        let tracker = if self.show_progress {
            ProgressTracker::new(create_progress_bar(files.len() as u64, "Discovering"))
        } else {
            ProgressTracker::hidden(files.len() as u64)
        };

        let codec = Arc::clone(&self.codec);
        let task_tracker = tracker.clone();
        let mut probes = Box::pin(self.executor.run(files, move |path: PathBuf| {
            let category = categorize(codec.as_ref(), &path);
            task_tracker.record_success();
            category
        }));

        let mut categorized = Vec::new();
        while let Some((path, result)) = probes.next().await {
            let category = result.unwrap_or_else(|e| {
                warn!(file = %path.display(), error = %e, "Probe task failed, treating as generic");
                Category::Generic
            });
            categorized.push((path, category));
        }
        tracker.finish("Discovery complete");

        // Completion order is arbitrary; sort so representatives are stable
        categorized.sort();
        let mut representatives = HashSet::new();
        let mut list = WorkList::new();
        for (path, category) in categorized {
            if category.key_granularity() == KeyGranularity::Directory {
                let directory = path.parent().map(Path::to_path_buf);
                if !representatives.insert(directory) {
                    continue;
                }
            }
            list.push(category, path);
        }

        for (category, count) in list.counts() {
            info!(category = %category, items = count, "Discovered");
        }
        Ok(list)
    }
}
