//! Output directory layout

use std::path::{Path, PathBuf};

pub const IMAGES_DIR: &str = "extracted-images";
pub const META_DIR: &str = "meta";
pub const SNAPSHOT_FILE: &str = "worklist.json";
pub const CATALOG_FILE: &str = "catalog.csv";
/// Prefix of the daily run log written next to the outputs
pub const RUN_LOG_PREFIX: &str = "extraction";

/// Every path the pipeline writes, derived from the output directory
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.root.join(META_DIR)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.meta_dir().join(CATALOG_FILE)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.root.join(SNAPSHOT_FILE)
    }

    /// Create the output, artifact and metadata directories if absent
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.images_dir())?;
        std::fs::create_dir_all(self.meta_dir())?;
        Ok(())
    }
}
