//! medextract library
//!
//! Resumable, parallel extraction of medical image archives into
//! content-addressed artifacts and a metadata catalog.
//!
//! # Overview
//!
//! - **Discovery**: walk the source tree, probe each file's storage class and
//!   bucket it by [`Category`] (`discovery`, `work`)
//! - **Resumption**: drop items already recorded in earlier batches (`prune`)
//! - **Extraction**: a bounded worker pool runs each item through its
//!   category's strategy (`executor`, `registry`, `strategies`)
//! - **Persistence**: rows flushed as immutable numbered batches, then merged
//!   into one catalog (`batch`, `merge`)
//! - **Codec**: a small DICOM reader plus PNG / NIfTI writers (`codec`)
//!
//! [`ExtractionSession`] ties these together for one run.
//!
//! # Output layout
//!
//! ```text
//! <output>/
//!   extracted-images/<sha224>/<sha224>/<sha224>.{png,nii.gz}
//!   meta/batch_<n>.csv
//!   meta/catalog.csv
//!   worklist.json
//!   extraction.<date>
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod address;
pub mod batch;
pub mod category;
pub mod codec;
pub mod config;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod layout;
pub mod merge;
pub mod progress;
pub mod prune;
pub mod registry;
pub mod row;
pub mod session;
pub mod strategies;
pub mod work;

// Re-export commonly used types
pub use category::Category;
pub use config::{ConfigLayer, ExtractConfig};
pub use error::{ErrorCode, ExtractError, ItemError, Result};
pub use registry::{StrategyRegistry, StrategySet};
pub use row::{FieldValue, MetadataRow};
pub use session::{ExtractionSession, RunSummary, StatusReport};
pub use work::{WorkItem, WorkList};

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// medextract - batch extraction of medical image archives
#[derive(Parser, Debug)]
#[command(name = "medextract")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file; flags and environment override its values
    #[arg(short, long, env = "MEDEXTRACT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ConfigArgs,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover (or load the snapshot), resume, extract and merge
    Run,

    /// Walk the input tree and rewrite the work list snapshot
    Discover,

    /// Rebuild the catalog from committed batches
    Merge,

    /// Show snapshot counts and committed batches
    Status,
}

/// Configuration overrides, highest precedence
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Root of the source tree
    #[arg(short, long, env = "MEDEXTRACT_INPUT", global = true)]
    pub input: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, env = "MEDEXTRACT_OUTPUT", global = true)]
    pub output: Option<PathBuf>,

    /// Worker count (defaults to the number of CPUs)
    #[arg(short = 'j', long, env = "MEDEXTRACT_WORKERS", global = true)]
    pub workers: Option<usize>,

    /// Rows per batch file
    #[arg(long, env = "MEDEXTRACT_BATCH_SIZE", global = true)]
    pub batch_size: Option<usize>,

    /// Render artifacts
    #[arg(long, env = "MEDEXTRACT_SAVE_IMAGES", global = true)]
    pub save_images: Option<bool>,

    /// Drop private fields
    #[arg(long, env = "MEDEXTRACT_PUBLIC_HEADERS_ONLY", global = true)]
    pub public_headers_only: Option<bool>,

    /// Clamp pixels to the recorded intensity window
    #[arg(long, env = "MEDEXTRACT_APPLY_WINDOW", global = true)]
    pub apply_window: Option<bool>,

    /// Flatten nested groups into prefixed columns
    #[arg(long, env = "MEDEXTRACT_EXTRACT_NESTED", global = true)]
    pub extract_nested: Option<bool>,

    /// Accepted for compatibility; has no effect
    #[arg(long, env = "MEDEXTRACT_REORIENT", global = true)]
    pub reorient: Option<bool>,

    /// Probe only the first file of each directory
    #[arg(long, env = "MEDEXTRACT_PARENT_FILTER", global = true)]
    pub apply_parent_filter: Option<bool>,

    /// Categories to extract
    #[arg(long, value_enum, env = "MEDEXTRACT_STRATEGY_SET", global = true)]
    pub strategy_set: Option<StrategySet>,

    /// Source file extension
    #[arg(long, env = "MEDEXTRACT_EXTENSION", global = true)]
    pub extension: Option<String>,
}

impl ConfigArgs {
    pub fn to_layer(&self) -> ConfigLayer {
        ConfigLayer {
            input_dir: self.input.clone(),
            output_dir: self.output.clone(),
            workers: self.workers,
            save_batch_size: self.batch_size,
            save_images: self.save_images,
            public_headers_only: self.public_headers_only,
            apply_window: self.apply_window,
            extract_nested: self.extract_nested,
            reorient: self.reorient,
            apply_parent_filter: self.apply_parent_filter,
            strategy_set: self.strategy_set,
            file_extension: self.extension.clone(),
        }
    }
}

impl Cli {
    /// Config file (if any) overlaid with environment and flags
    pub fn config_layer(&self) -> Result<ConfigLayer> {
        let base = match &self.config {
            Some(path) => ConfigLayer::from_file(path)?,
            None => ConfigLayer::default(),
        };
        Ok(base.merge(self.overrides.to_layer()))
    }
}
