//! Immutable reference data shared by every component.
//!
//! Built once at startup and handed around behind an `Arc`, so matchers can
//! be tested against injected tables.

use serde::Deserialize;

use crate::chains::{ChainIdentity, ChainTable, ChainTableError};
use crate::normalize::normalize;

/// Analytics categories that describe venues or infrastructure, not dapps.
pub const DEFAULT_EXCLUDED_CATEGORIES: [&str; 3] = ["CEX", "Chain", "Canonical Bridge"];

/// Errors raised while loading reference data.
#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    /// YAML could not be parsed
    #[error("Reference data parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Chain table failed validation
    #[error("Invalid chain table: {0}")]
    Table(#[from] ChainTableError),
}

#[derive(Debug, Deserialize)]
struct ReferenceFile {
    chains: Vec<ChainIdentity>,
    #[serde(default)]
    excluded_categories: Option<Vec<String>>,
}

/// Chain table plus the excluded-category list.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    /// Validated chain table
    pub chains: ChainTable,
    /// Analytics categories that are never matched to a dapp
    pub excluded_categories: Vec<String>,
}

impl ReferenceData {
    /// Assemble reference data from parts.
    pub fn new(chains: ChainTable, excluded_categories: Vec<String>) -> Self {
        Self {
            chains,
            excluded_categories,
        }
    }

    /// Built-in chain table and default exclusions.
    pub fn builtin() -> Self {
        Self::new(
            ChainTable::builtin(),
            DEFAULT_EXCLUDED_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        )
    }

    /// Load from YAML. A missing `excluded_categories` key keeps the defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ReferenceError> {
        let file: ReferenceFile = serde_yaml::from_str(yaml)?;
        let chains = ChainTable::new(file.chains)?;
        let excluded = file.excluded_categories.unwrap_or_else(|| {
            DEFAULT_EXCLUDED_CATEGORIES.iter().map(|c| c.to_string()).collect()
        });
        Ok(Self::new(chains, excluded))
    }

    /// Whether an analytics category is excluded (normalized comparison).
    pub fn is_excluded_category(&self, category: &str) -> bool {
        let category = normalize(category);
        !category.is_empty()
            && self
                .excluded_categories
                .iter()
                .any(|c| normalize(c) == category)
    }
}

impl Default for ReferenceData {
    fn default() -> Self {
        Self::builtin()
    }
}
