//! Category → strategy table
//!
//! The registry is filled once at startup and frozen into a [`Dispatcher`]
//! before any item is processed. Asking for a dispatcher over a category
//! with no registered strategy fails immediately, so a misconfigured run
//! stops before touching the source tree.

use crate::category::Category;
use crate::error::{ExtractError, Result};
use crate::strategies::{
    process_item, CategoryStrategy, GenericStrategy, MultiFrameStrategy, Outcome, PlanarStrategy,
    RunContext, SeriesStrategy,
};
use crate::work::WorkItem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Named selection of categories to extract
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum StrategySet {
    /// Every category
    #[default]
    #[serde(alias = "General")]
    General,
    /// Planar images to PNG
    #[serde(alias = "PNG")]
    Png,
    /// Series volumes to NIfTI
    #[serde(alias = "NIFTI", alias = "NIfTI")]
    Nifti,
    /// Multi-frame tomosynthesis / OCT volumes
    #[serde(alias = "TOMO")]
    Tomo,
}

impl StrategySet {
    pub fn categories(self) -> &'static [Category] {
        match self {
            StrategySet::General => &Category::ALL,
            StrategySet::Png => &[Category::Planar],
            StrategySet::Nifti => &[Category::VolumetricA],
            StrategySet::Tomo => &[Category::VolumetricB],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrategySet::General => "general",
            StrategySet::Png => "png",
            StrategySet::Nifti => "nifti",
            StrategySet::Tomo => "tomo",
        }
    }
}

impl fmt::Display for StrategySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategySet {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "general" => Ok(StrategySet::General),
            "png" => Ok(StrategySet::Png),
            "nifti" => Ok(StrategySet::Nifti),
            "tomo" => Ok(StrategySet::Tomo),
            other => Err(ExtractError::config(format!(
                "unknown strategy set '{}' (expected general, png, nifti or tomo)",
                other
            ))),
        }
    }
}

/// Mutable table used during startup
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<Category, Arc<dyn CategoryStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in strategy for every category
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SeriesStrategy));
        registry.register(Arc::new(MultiFrameStrategy));
        registry.register(Arc::new(PlanarStrategy));
        registry.register(Arc::new(GenericStrategy));
        registry
    }

    /// Register a strategy under its own category, replacing any previous one
    pub fn register(&mut self, strategy: Arc<dyn CategoryStrategy>) {
        self.strategies.insert(strategy.category(), strategy);
    }

    pub fn contains(&self, category: Category) -> bool {
        self.strategies.contains_key(&category)
    }

    /// Freeze the table for the given categories
    ///
    /// # Errors
    ///
    /// `UnregisteredCategory` if any requested category has no strategy.
    pub fn dispatcher(&self, categories: &[Category], set: StrategySet) -> Result<Dispatcher> {
        let mut table = BTreeMap::new();
        for &category in categories {
            let strategy = self
                .strategies
                .get(&category)
                .ok_or(ExtractError::UnregisteredCategory {
                    category,
                    strategy_set: set,
                })?;
            table.insert(category, Arc::clone(strategy));
        }
        Ok(Dispatcher {
            strategies: Arc::new(table),
        })
    }
}

/// Frozen, cheaply clonable lookup shared with workers
#[derive(Clone)]
pub struct Dispatcher {
    strategies: Arc<BTreeMap<Category, Arc<dyn CategoryStrategy>>>,
}

impl Dispatcher {
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.strategies.keys().copied()
    }

    /// Run one item through its category's strategy
    ///
    /// Items whose category was not frozen into this dispatcher are skipped;
    /// the session never hands those over since it filters the work list
    /// against the same category set first.
    pub fn process(&self, item: &WorkItem, ctx: &RunContext) -> Outcome {
        match self.strategies.get(&item.category) {
            Some(strategy) => process_item(strategy.as_ref(), item, ctx),
            None => Outcome::Skipped,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_all_categories() {
        let registry = StrategyRegistry::builtin();
        for category in Category::ALL {
            assert!(registry.contains(category));
        }
        let dispatcher = registry
            .dispatcher(StrategySet::General.categories(), StrategySet::General)
            .unwrap();
        assert_eq!(dispatcher.categories().count(), 4);
    }

    #[test]
    fn test_unregistered_category_fails_early() {
        let mut registry = StrategyRegistry::new();
        registry.register(Arc::new(PlanarStrategy));

        assert!(registry
            .dispatcher(StrategySet::Png.categories(), StrategySet::Png)
            .is_ok());
        let err = registry
            .dispatcher(StrategySet::Nifti.categories(), StrategySet::Nifti)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ExtractError::UnregisteredCategory {
                category: Category::VolumetricA,
                strategy_set: StrategySet::Nifti
            }
        ));
    }

    #[test]
    fn test_strategy_set_parsing() {
        assert_eq!("PNG".parse::<StrategySet>().unwrap(), StrategySet::Png);
        assert_eq!("General".parse::<StrategySet>().unwrap(), StrategySet::General);
        assert!("dicom".parse::<StrategySet>().is_err());

        let set: StrategySet = serde_json::from_str("\"TOMO\"").unwrap();
        assert_eq!(set, StrategySet::Tomo);
        assert_eq!(serde_json::to_string(&StrategySet::Nifti).unwrap(), "\"nifti\"");
    }

    #[test]
    fn test_strategy_set_categories() {
        assert_eq!(StrategySet::General.categories().len(), 4);
        assert_eq!(StrategySet::Tomo.categories(), &[Category::VolumetricB]);
    }
}
