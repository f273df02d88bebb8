//! Input categories and their classification
//!
//! A category decides which strategy processes an item and at which
//! granularity the item is keyed for resumption.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// CT and MR storage classes, processed as whole series
const VOLUMETRIC_SERIES_CLASSES: &[&str] = &[
    "1.2.840.10008.5.1.4.1.1.2",     // CT Image Storage
    "1.2.840.10008.5.1.4.1.1.2.1",   // Enhanced CT Image Storage
    "1.2.840.10008.5.1.4.1.1.2.2",   // Legacy Converted Enhanced CT Image Storage
    "1.2.840.10008.5.1.4.1.1.4",     // MR Image Storage
    "1.2.840.10008.5.1.4.1.1.4.1",   // Enhanced MR Image Storage
    "1.2.840.10008.5.1.4.1.1.4.3",   // Enhanced MR Color Image Storage
    "1.2.840.10008.5.1.4.1.1.4.4",   // Legacy Converted Enhanced MR Image Storage
];

/// Multi-frame classes stored as one file per volume
pub const TOMOSYNTHESIS_CLASS: &str = "1.2.840.10008.5.1.4.1.1.13.1.3";
pub const OPHTHALMIC_TOMOGRAPHY_CLASS: &str = "1.2.840.10008.5.1.4.1.1.77.1.5.4";

const VOLUMETRIC_FRAME_CLASSES: &[&str] = &[TOMOSYNTHESIS_CLASS, OPHTHALMIC_TOMOGRAPHY_CLASS];

/// Projection radiography classes
const PLANAR_CLASSES: &[&str] = &[
    "1.2.840.10008.5.1.4.1.1.1",       // Computed Radiography
    "1.2.840.10008.5.1.4.1.1.1.1",     // Digital X-Ray, for presentation
    "1.2.840.10008.5.1.4.1.1.1.1.1",   // Digital X-Ray, for processing
    "1.2.840.10008.5.1.4.1.1.1.2",     // Digital Mammography, for presentation
    "1.2.840.10008.5.1.4.1.1.1.2.1",   // Digital Mammography, for processing
    "1.2.840.10008.5.1.4.1.1.1.3",     // Digital Intra-Oral, for presentation
    "1.2.840.10008.5.1.4.1.1.1.3.1",   // Digital Intra-Oral, for processing
    "1.2.840.10008.5.1.4.1.1.12.1",    // X-Ray Angiographic
    "1.2.840.10008.5.1.4.1.1.12.2",    // X-Ray Radiofluoroscopic
    "1.2.840.10008.5.1.4.1.1.13.1.4",  // Breast Projection, for presentation
    "1.2.840.10008.5.1.4.1.1.13.1.5",  // Breast Projection, for processing
];

/// Closed set of input categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// Multi-file series (CT, MR); one work item per series directory
    VolumetricA,
    /// Single-file multi-frame volumes (tomosynthesis, OCT)
    VolumetricB,
    /// Single projection images
    Planar,
    /// Everything else, metadata only
    Generic,
}

/// How a category's items are keyed for resumption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyGranularity {
    /// The source file path
    File,
    /// The directory containing the representative file
    Directory,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::VolumetricA,
        Category::VolumetricB,
        Category::Planar,
        Category::Generic,
    ];

    /// Classify by storage class identifier; unknown classes are `Generic`
    pub fn from_storage_class(uid: &str) -> Self {
        let uid = uid.trim_end_matches(['\0', ' ']);
        if VOLUMETRIC_SERIES_CLASSES.contains(&uid) {
            Category::VolumetricA
        } else if VOLUMETRIC_FRAME_CLASSES.contains(&uid) {
            Category::VolumetricB
        } else if PLANAR_CLASSES.contains(&uid) {
            Category::Planar
        } else {
            Category::Generic
        }
    }

    pub fn key_granularity(self) -> KeyGranularity {
        match self {
            Category::VolumetricA => KeyGranularity::Directory,
            Category::VolumetricB | Category::Planar | Category::Generic => KeyGranularity::File,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::VolumetricA => "VolumetricA",
            Category::VolumetricB => "VolumetricB",
            Category::Planar => "Planar",
            Category::Generic => "Generic",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            Category::from_storage_class("1.2.840.10008.5.1.4.1.1.2"),
            Category::VolumetricA
        );
        assert_eq!(
            Category::from_storage_class("1.2.840.10008.5.1.4.1.1.4.1"),
            Category::VolumetricA
        );
        assert_eq!(
            Category::from_storage_class(TOMOSYNTHESIS_CLASS),
            Category::VolumetricB
        );
        assert_eq!(
            Category::from_storage_class("1.2.840.10008.5.1.4.1.1.1.2"),
            Category::Planar
        );
        assert_eq!(
            Category::from_storage_class("1.2.840.10008.5.1.4.1.1.88.11"),
            Category::Generic
        );
    }

    #[test]
    fn test_classification_ignores_padding() {
        assert_eq!(
            Category::from_storage_class("1.2.840.10008.5.1.4.1.1.2\0"),
            Category::VolumetricA
        );
    }

    #[test]
    fn test_prefix_is_not_a_match() {
        // A longer class sharing the CT prefix is not CT
        assert_eq!(
            Category::from_storage_class("1.2.840.10008.5.1.4.1.1.2.9"),
            Category::Generic
        );
    }

    #[test]
    fn test_key_granularity() {
        assert_eq!(Category::VolumetricA.key_granularity(), KeyGranularity::Directory);
        assert_eq!(Category::VolumetricB.key_granularity(), KeyGranularity::File);
        assert_eq!(Category::Planar.key_granularity(), KeyGranularity::File);
        assert_eq!(Category::Generic.key_granularity(), KeyGranularity::File);
    }

    #[test]
    fn test_parse_display() {
        for category in Category::ALL {
            assert_eq!(category.to_string().parse::<Category>().unwrap(), category);
        }
        assert_eq!("planar".parse::<Category>().unwrap(), Category::Planar);
        assert!("Volumetric".parse::<Category>().is_err());
    }
}
