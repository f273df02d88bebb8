//! Content-addressed artifact placement
//!
//! An artifact's location is a pure function of the identifier triple that
//! describes it: each identifier is digested on its own and becomes one
//! directory level. The stored names are one-way digests, so subject ids do
//! not appear on disk.

use medextract_common::digest::sha224_hex;
use std::io;
use std::path::{Path, PathBuf};

/// Substituted when the study identifier is missing
pub const ALL_STUDIES: &str = "ALL-STUDIES";
/// Substituted when a series identifier is missing
pub const ALL_SERIES: &str = "ALL-SERIES";
/// Substituted when an instance identifier is missing
pub const ALL_INSTANCES: &str = "ALL-INSTANCES";

/// Maps identifier triples to paths under an artifact root
#[derive(Debug, Clone)]
pub struct AddressResolver {
    root: PathBuf,
}

impl AddressResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `root/H(subject)/H(group)/H(leaf).extension`
    ///
    /// `extension` is given without the leading dot, e.g. `png` or `nii.gz`.
    pub fn resolve(&self, subject: &str, group: &str, leaf: &str, extension: &str) -> PathBuf {
        self.root
            .join(sha224_hex(subject))
            .join(sha224_hex(group))
            .join(format!("{}.{}", sha224_hex(leaf), extension))
    }

    /// Resolve with sentinels substituted for missing identifiers
    pub fn resolve_optional(
        &self,
        subject: &str,
        group: Option<&str>,
        leaf: Option<&str>,
        leaf_sentinel: &str,
        extension: &str,
    ) -> PathBuf {
        let group = non_empty(group).unwrap_or(ALL_STUDIES);
        let leaf = non_empty(leaf).unwrap_or(leaf_sentinel);
        self.resolve(subject, group, leaf, extension)
    }

    /// Resolve and create the parent directories
    ///
    /// Several workers may create the same directories at once; creation is
    /// create-if-absent.
    pub fn prepare(
        &self,
        subject: &str,
        group: Option<&str>,
        leaf: Option<&str>,
        leaf_sentinel: &str,
        extension: &str,
    ) -> io::Result<PathBuf> {
        let path = self.resolve_optional(subject, group, leaf, leaf_sentinel, extension);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
