//! Work items, the categorized work list and its on-disk snapshot

use crate::category::{Category, KeyGranularity};
use crate::error::{ExtractError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::info;

/// Current snapshot layout version
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// One unit of work
///
/// For series categories `path` is the representative file; the item is
/// keyed by its directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    pub category: Category,
    pub path: PathBuf,
}

impl WorkItem {
    pub fn new(category: Category, path: impl Into<PathBuf>) -> Self {
        Self {
            category,
            path: path.into(),
        }
    }

    /// Resumption key, recorded in the `file` column
    pub fn key(&self) -> String {
        match self.category.key_granularity() {
            KeyGranularity::File => path_key(&self.path),
            KeyGranularity::Directory => {
                path_key(self.path.parent().unwrap_or_else(|| Path::new("")))
            }
        }
    }

    /// Directory holding the item's file
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// Canonical string form of a path used for keys
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Work items grouped by category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkList {
    items: BTreeMap<Category, Vec<PathBuf>>,
}

impl WorkList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, category: Category, path: impl Into<PathBuf>) {
        self.items.entry(category).or_default().push(path.into());
    }

    pub fn len(&self) -> usize {
        self.items.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count(&self, category: Category) -> usize {
        self.items.get(&category).map_or(0, Vec::len)
    }

    /// Categories with at least one item
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.items
            .iter()
            .filter(|(_, paths)| !paths.is_empty())
            .map(|(category, _)| *category)
    }

    pub fn items(&self) -> impl Iterator<Item = WorkItem> + '_ {
        self.items.iter().flat_map(|(category, paths)| {
            paths.iter().map(move |path| WorkItem::new(*category, path.clone()))
        })
    }

    /// Flatten into owned items for the worker pool
    pub fn into_items(self) -> Vec<WorkItem> {
        self.items
            .into_iter()
            .flat_map(|(category, paths)| {
                paths.into_iter().map(move |path| WorkItem::new(category, path))
            })
            .collect()
    }

    /// Drop categories outside `keep`, returning how many items were dropped
    pub fn retain_categories(&mut self, keep: &[Category]) -> usize {
        let before = self.len();
        self.items.retain(|category, _| keep.contains(category));
        before - self.len()
    }

    /// Drop items whose key is in `completed`, returning how many were dropped
    pub fn remove_keys(&mut self, completed: &HashSet<String>) -> usize {
        let before = self.len();
        for (category, paths) in self.items.iter_mut() {
            let category = *category;
            paths.retain(|path| {
                !completed.contains(&WorkItem::new(category, path.clone()).key())
            });
        }
        before - self.len()
    }

    /// Per-category counts in category order
    pub fn counts(&self) -> Vec<(Category, usize)> {
        Category::ALL
            .into_iter()
            .map(|category| (category, self.count(category)))
            .collect()
    }

    pub fn save(&self, path: &Path, input_dir: &Path) -> Result<()> {
        let snapshot = WorkListSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            created_at: Utc::now(),
            input_dir: input_dir.to_path_buf(),
            items: self.items.clone(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        info!(path = %path.display(), items = self.len(), "Saved work list snapshot");
        Ok(())
    }

    /// Load a snapshot written by [`WorkList::save`]
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::read_snapshot(path)?.0)
    }

    /// Load a snapshot, refusing one discovered under a different input root
    pub fn load_for_input(path: &Path, input_dir: &Path) -> Result<Self> {
        let (list, recorded) = Self::read_snapshot(path)?;
        if recorded != input_dir {
            return Err(ExtractError::snapshot(
                path,
                format!(
                    "it was discovered under {} but the input directory is {}",
                    recorded.display(),
                    input_dir.display()
                ),
            ));
        }
        Ok(list)
    }

    fn read_snapshot(path: &Path) -> Result<(Self, PathBuf)> {
        let content = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| ExtractError::snapshot(path, format!("not valid JSON ({})", e)))?;

        let version = value.get("format_version").and_then(serde_json::Value::as_u64);
        if version != Some(u64::from(SNAPSHOT_FORMAT_VERSION)) {
            return Err(ExtractError::snapshot(
                path,
                format!(
                    "format version {} is not supported (expected {})",
                    version.map_or_else(|| "missing".to_string(), |v| v.to_string()),
                    SNAPSHOT_FORMAT_VERSION
                ),
            ));
        }

        let snapshot: WorkListSnapshot = serde_json::from_value(value)
            .map_err(|e| ExtractError::snapshot(path, e.to_string()))?;
        Ok((
            Self {
                items: snapshot.items,
            },
            snapshot.input_dir,
        ))
    }
}

impl FromIterator<WorkItem> for WorkList {
    fn from_iter<T: IntoIterator<Item = WorkItem>>(iter: T) -> Self {
        let mut list = WorkList::new();
        for item in iter {
            list.push(item.category, item.path);
        }
        list
    }
}

/// Serialized form of a [`WorkList`]
#[derive(Debug, Serialize, Deserialize)]
struct WorkListSnapshot {
    format_version: u32,
    created_at: DateTime<Utc>,
    input_dir: PathBuf,
    items: BTreeMap<Category, Vec<PathBuf>>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> WorkList {
        let mut list = WorkList::new();
        list.push(Category::VolumetricA, "/in/ct/s1/0001.dcm");
        list.push(Category::Planar, "/in/dx/a.dcm");
        list.push(Category::Planar, "/in/dx/b.dcm");
        list.push(Category::Generic, "/in/sr/r.dcm");
        list
    }

    #[test]
    fn test_keys_by_granularity() {
        let series = WorkItem::new(Category::VolumetricA, "/in/ct/s1/0001.dcm");
        assert_eq!(series.key(), "/in/ct/s1");
        let planar = WorkItem::new(Category::Planar, "/in/dx/a.dcm");
        assert_eq!(planar.key(), "/in/dx/a.dcm");
    }

    #[test]
    fn test_counts_and_flatten() {
        let list = sample();
        assert_eq!(list.len(), 4);
        assert_eq!(list.count(Category::Planar), 2);
        assert_eq!(list.count(Category::VolumetricB), 0);
        assert_eq!(list.clone().into_items().len(), 4);
        let categories: Vec<_> = list.categories().collect();
        assert_eq!(
            categories,
            vec![Category::VolumetricA, Category::Planar, Category::Generic]
        );
    }

    #[test]
    fn test_retain_categories() {
        let mut list = sample();
        let dropped = list.retain_categories(&[Category::Planar]);
        assert_eq!(dropped, 2);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_remove_keys_uses_directory_for_series() {
        let mut list = sample();
        let completed: HashSet<String> =
            ["/in/ct/s1".to_string(), "/in/dx/a.dcm".to_string()].into();
        assert_eq!(list.remove_keys(&completed), 2);
        assert_eq!(list.count(Category::VolumetricA), 0);
        assert_eq!(list.count(Category::Planar), 1);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("worklist.json");
        let list = sample();
        list.save(&path, Path::new("/in")).unwrap();

        let loaded = WorkList::load(&path).unwrap();
        assert_eq!(loaded, list);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["format_version"], 1);
        assert_eq!(raw["items"]["Planar"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_snapshot_unknown_version_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("worklist.json");
        std::fs::write(
            &path,
            r#"{"format_version": 9, "created_at": "2024-01-01T00:00:00Z", "input_dir": "/in", "items": {}}"#,
        )
        .unwrap();
        let err = WorkList::load(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Snapshot { .. }));
        assert!(err.to_string().contains("Delete it"));
    }

    #[test]
    fn test_snapshot_from_other_input_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("worklist.json");
        sample().save(&path, Path::new("/in")).unwrap();

        assert_eq!(WorkList::load_for_input(&path, Path::new("/in")).unwrap(), sample());
        let err = WorkList::load_for_input(&path, Path::new("/elsewhere")).unwrap_err();
        assert!(matches!(err, ExtractError::Snapshot { .. }));
        let message = err.to_string();
        assert!(message.contains("/elsewhere"));
        assert!(message.contains("Delete it"));
    }

    #[test]
    fn test_snapshot_garbage_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("worklist.json");
        std::fs::write(&path, b"\x80\x04pickle").unwrap();
        assert!(WorkList::load(&path).is_err());
    }
}
