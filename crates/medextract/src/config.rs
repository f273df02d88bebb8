//! Run configuration
//!
//! Settings come from layered [`ConfigLayer`]s (JSON file, then environment
//! and flags via the CLI) resolved into one immutable [`ExtractConfig`].

use crate::codec::FieldOptions;
use crate::error::{ExtractError, Result};
use crate::registry::StrategySet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Rows buffered before a batch file is written
pub const DEFAULT_SAVE_BATCH_SIZE: usize = 2000;

/// Source file extension, compared case-insensitively
pub const DEFAULT_FILE_EXTENSION: &str = "dcm";

/// Worker count when none is configured
pub fn default_workers() -> usize {
    num_cpus::get().max(1)
}

/// Resolved settings for one run, shared read-only with every worker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractConfig {
    /// Root of the source tree
    pub input_dir: PathBuf,

    /// Where artifacts, batches, the catalog and the snapshot go
    pub output_dir: PathBuf,

    /// Size of the worker pool
    pub workers: usize,

    /// Batch flush threshold
    pub save_batch_size: usize,

    /// Render artifacts at all
    pub save_images: bool,

    /// Drop private (odd group) fields
    pub public_headers_only: bool,

    /// Clamp pixels to the recorded intensity window
    pub apply_window: bool,

    /// Flatten nested groups into prefixed columns
    pub extract_nested: bool,

    /// Accepted but currently has no effect
    pub reorient: bool,

    /// Probe only the first file of each directory during discovery
    pub apply_parent_filter: bool,

    /// Which categories this run extracts
    pub strategy_set: StrategySet,

    /// Extension of source files, without the dot
    pub file_extension: String,
}

impl ExtractConfig {
    /// Config with default settings for the given directories
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            workers: default_workers(),
            save_batch_size: DEFAULT_SAVE_BATCH_SIZE,
            save_images: true,
            public_headers_only: true,
            apply_window: true,
            extract_nested: false,
            reorient: false,
            apply_parent_filter: false,
            strategy_set: StrategySet::default(),
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
        }
    }

    /// Check the settings before anything touches the filesystem
    ///
    /// # Errors
    ///
    /// Returns `ExtractError::Config` for zero workers or batch size, an
    /// empty extension, a missing input directory, or an output directory
    /// inside the input tree.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ExtractError::config("workers must be at least 1"));
        }
        if self.save_batch_size == 0 {
            return Err(ExtractError::config("save_batch_size must be at least 1"));
        }
        if self.file_extension.trim_start_matches('.').is_empty() {
            return Err(ExtractError::config("file_extension cannot be empty"));
        }
        if !self.input_dir.is_dir() {
            return Err(ExtractError::config(format!(
                "input directory {} does not exist",
                self.input_dir.display()
            )));
        }

        let input = self.input_dir.canonicalize()?;
        let output = absolute(&self.output_dir)?;
        if output.starts_with(&input) {
            return Err(ExtractError::config(format!(
                "output directory {} is inside the input directory {}",
                self.output_dir.display(),
                self.input_dir.display()
            )));
        }
        Ok(())
    }

    pub fn field_options(&self) -> FieldOptions {
        FieldOptions {
            public_only: self.public_headers_only,
            expand_nested: self.extract_nested,
        }
    }

    /// Log the resolved settings at the start of a run
    pub fn log_summary(&self) {
        info!(
            input_dir = %self.input_dir.display(),
            output_dir = %self.output_dir.display(),
            workers = self.workers,
            save_batch_size = self.save_batch_size,
            save_images = self.save_images,
            public_headers_only = self.public_headers_only,
            apply_window = self.apply_window,
            extract_nested = self.extract_nested,
            apply_parent_filter = self.apply_parent_filter,
            strategy_set = %self.strategy_set,
            file_extension = %self.file_extension,
            "Resolved configuration"
        );
        if self.reorient {
            warn!("reorient is accepted but not implemented; volumes keep their source orientation");
        }
    }
}

/// Absolute form of a path that may not exist yet
fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    match path.canonicalize() {
        Ok(path) => Ok(path),
        Err(_) => {
            let path = std::path::absolute(path)?;
            // Resolve the closest existing ancestor so symlinks compare equal
            let mut existing = path.as_path();
            let mut rest = Vec::new();
            while !existing.exists() {
                match (existing.parent(), existing.file_name()) {
                    (Some(parent), Some(name)) => {
                        rest.push(name.to_os_string());
                        existing = parent;
                    }
                    _ => return Ok(path),
                }
            }
            let mut resolved = existing.canonicalize()?;
            resolved.extend(rest.iter().rev());
            Ok(resolved)
        }
    }
}

/// One partial source of settings
///
/// Field aliases accept the option names used by older JSON config files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    #[serde(alias = "DICOMHome")]
    pub input_dir: Option<PathBuf>,
    #[serde(alias = "OutputDirectory")]
    pub output_dir: Option<PathBuf>,
    #[serde(alias = "NumProcesses")]
    pub workers: Option<usize>,
    #[serde(alias = "SaveBatchSize")]
    pub save_batch_size: Option<usize>,
    #[serde(alias = "SaveImages", alias = "SavePNGs")]
    pub save_images: Option<bool>,
    #[serde(alias = "PublicHeadersOnly")]
    pub public_headers_only: Option<bool>,
    #[serde(alias = "ApplyVOILUT")]
    pub apply_window: Option<bool>,
    #[serde(alias = "ExtractNested")]
    pub extract_nested: Option<bool>,
    #[serde(alias = "Reorient")]
    pub reorient: Option<bool>,
    #[serde(alias = "ApplyParentFilter")]
    pub apply_parent_filter: Option<bool>,
    #[serde(alias = "Extractor")]
    pub strategy_set: Option<StrategySet>,
    pub file_extension: Option<String>,
}

impl ConfigLayer {
    /// Read a JSON config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExtractError::config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            ExtractError::config(format!("invalid config {}: {}", path.display(), e))
        })
    }

    /// Overlay `over` on top of `self`; values set in `over` win
    pub fn merge(self, over: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            input_dir: over.input_dir.or(self.input_dir),
            output_dir: over.output_dir.or(self.output_dir),
            workers: over.workers.or(self.workers),
            save_batch_size: over.save_batch_size.or(self.save_batch_size),
            save_images: over.save_images.or(self.save_images),
            public_headers_only: over.public_headers_only.or(self.public_headers_only),
            apply_window: over.apply_window.or(self.apply_window),
            extract_nested: over.extract_nested.or(self.extract_nested),
            reorient: over.reorient.or(self.reorient),
            apply_parent_filter: over.apply_parent_filter.or(self.apply_parent_filter),
            strategy_set: over.strategy_set.or(self.strategy_set),
            file_extension: over.file_extension.or(self.file_extension),
        }
    }

    /// Fill unset values with defaults
    ///
    /// # Errors
    ///
    /// Both directories are required.
    pub fn resolve(self) -> Result<ExtractConfig> {
        let input_dir = self
            .input_dir
            .ok_or_else(|| ExtractError::config("input directory is required"))?;
        let output_dir = self
            .output_dir
            .ok_or_else(|| ExtractError::config("output directory is required"))?;

        let mut config = ExtractConfig::new(input_dir, output_dir);
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(size) = self.save_batch_size {
            config.save_batch_size = size;
        }
        if let Some(value) = self.save_images {
            config.save_images = value;
        }
        if let Some(value) = self.public_headers_only {
            config.public_headers_only = value;
        }
        if let Some(value) = self.apply_window {
            config.apply_window = value;
        }
        if let Some(value) = self.extract_nested {
            config.extract_nested = value;
        }
        if let Some(value) = self.reorient {
            config.reorient = value;
        }
        if let Some(value) = self.apply_parent_filter {
            config.apply_parent_filter = value;
        }
        if let Some(set) = self.strategy_set {
            config.strategy_set = set;
        }
        if let Some(extension) = self.file_extension {
            config.file_extension = extension.trim_start_matches('.').to_string();
        }
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ExtractConfig::new("/data/in", "/data/out");
        assert_eq!(config.save_batch_size, DEFAULT_SAVE_BATCH_SIZE);
        assert!(config.workers >= 1);
        assert!(config.save_images);
        assert!(config.public_headers_only);
        assert!(config.apply_window);
        assert!(!config.extract_nested);
        assert!(!config.apply_parent_filter);
        assert_eq!(config.strategy_set, StrategySet::General);
        assert_eq!(config.file_extension, "dcm");
    }

    #[test]
    fn test_validate() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("in");
        std::fs::create_dir(&input).unwrap();

        let config = ExtractConfig::new(&input, temp.path().join("out"));
        assert!(config.validate().is_ok());

        let mut bad = config.clone();
        bad.workers = 0;
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.save_batch_size = 0;
        assert!(bad.validate().is_err());

        let missing = ExtractConfig::new(temp.path().join("nope"), temp.path().join("out"));
        assert!(missing.validate().is_err());
    }

    #[test]
    fn test_output_inside_input_rejected() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("in");
        std::fs::create_dir(&input).unwrap();

        let config = ExtractConfig::new(&input, input.join("derived").join("out"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("inside the input directory"));
    }

    #[test]
    fn test_layer_aliases_and_unknown_fields() {
        let layer: ConfigLayer = serde_json::from_str(
            r#"{"DICOMHome": "/in", "OutputDirectory": "/out", "NumProcesses": 3,
                "SavePNGs": false, "Extractor": "PNG", "ApplyVOILUT": false}"#,
        )
        .unwrap();
        let config = layer.resolve().unwrap();
        assert_eq!(config.input_dir, PathBuf::from("/in"));
        assert_eq!(config.workers, 3);
        assert!(!config.save_images);
        assert!(!config.apply_window);
        assert_eq!(config.strategy_set, StrategySet::Png);

        let unknown = serde_json::from_str::<ConfigLayer>(r#"{"HashSeed": 1}"#);
        assert!(unknown.is_err());
    }

    #[test]
    fn test_merge_precedence() {
        let file = ConfigLayer {
            input_dir: Some("/file/in".into()),
            output_dir: Some("/file/out".into()),
            workers: Some(2),
            ..Default::default()
        };
        let flags = ConfigLayer {
            workers: Some(8),
            file_extension: Some(".DCM".into()),
            ..Default::default()
        };
        let config = file.merge(flags).resolve().unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.input_dir, PathBuf::from("/file/in"));
        assert_eq!(config.file_extension, "DCM");
    }

    #[test]
    fn test_resolve_requires_directories() {
        assert!(ConfigLayer::default().resolve().is_err());
    }

    #[test]
    fn test_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{"input_dir": "/a", "save_batch_size": 10}"#).unwrap();
        let layer = ConfigLayer::from_file(&path).unwrap();
        assert_eq!(layer.save_batch_size, Some(10));

        std::fs::write(&path, "not json").unwrap();
        assert!(ConfigLayer::from_file(&path).is_err());
    }
}
