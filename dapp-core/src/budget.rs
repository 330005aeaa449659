//! Size-bounded serialization of [`UnifiedMetadata`].
//!
//! The store keeps the unified object as one opaque field with a hard size
//! limit. When the plain serialization is too large the object is degraded
//! step by step, re-measuring after each step:
//!
//! 1. shrink `description` in proportion to the overage (not below 500 chars)
//! 2. drop the `chainTvl` breakdown
//! 3. hard-truncate `description` to 1000 chars
//!
//! If the result still does not fit, the record is rejected.

use serde::Serialize;
use tracing::debug;

use crate::metadata::{strip_ellipsis, truncate_with_ellipsis, UnifiedMetadata};

/// Default byte budget for the stored blob.
pub const DEFAULT_BUDGET_BYTES: usize = 250_000;

/// One applied degradation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationStep {
    /// Description shortened in proportion to the overage
    ShrinkDescription,
    /// Per-chain TVL breakdown removed
    DropChainTvl,
    /// Description cut to the hard limit
    TruncateDescription,
}

/// Errors from budgeted serialization.
#[derive(Debug, thiserror::Error)]
pub enum BudgetError {
    /// Even the most degraded form is over budget
    #[error("Metadata needs {bytes} bytes after degradation, budget is {budget}")]
    Exhausted { bytes: usize, budget: usize },

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A serialized object that fits the budget.
#[derive(Debug, Clone)]
pub struct BudgetedMetadata {
    /// JSON text, at most `budget` bytes
    pub json: String,
    /// Steps applied, in order
    pub steps: Vec<DegradationStep>,
}

impl BudgetedMetadata {
    /// Size of the JSON text in bytes.
    pub fn bytes(&self) -> usize {
        self.json.len()
    }

    /// Whether any degradation was needed.
    pub fn is_degraded(&self) -> bool {
        !self.steps.is_empty()
    }
}

/// Serializes unified metadata under a byte budget.
#[derive(Debug, Clone)]
pub struct SizeBudgetSerializer {
    /// Floor for the proportional shrink (characters)
    pub min_description_chars: usize,
    /// Length for the final hard truncation (characters)
    pub hard_description_chars: usize,
}

impl Default for SizeBudgetSerializer {
    fn default() -> Self {
        Self {
            min_description_chars: 500,
            hard_description_chars: 1000,
        }
    }
}

impl SizeBudgetSerializer {
    /// Create a serializer with the default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `unified` into at most `budget` UTF-8 bytes.
    pub fn serialize(
        &self,
        unified: &UnifiedMetadata,
        budget: usize,
    ) -> Result<BudgetedMetadata, BudgetError> {
        let mut meta = unified.clone();
        let mut steps = Vec::new();

        let mut json = serde_json::to_string(&meta)?;
        if json.len() <= budget {
            return Ok(BudgetedMetadata { json, steps });
        }

        if let Some(description) = meta.description.as_deref() {
            let current = description.chars().count();
            let overage = json.len() - budget;
            let target = current
                .saturating_sub(overage.div_ceil(2))
                .max(self.min_description_chars);
            if target < current {
                meta.description = Some(truncate_with_ellipsis(strip_ellipsis(description), target));
                json = self.measure(&meta, DegradationStep::ShrinkDescription, &mut steps)?;
            }
        }

        if json.len() > budget && !meta.chain_tvl.is_empty() {
            meta.chain_tvl.clear();
            meta.sources.remove("chainTvl");
            json = self.measure(&meta, DegradationStep::DropChainTvl, &mut steps)?;
        }

        if json.len() > budget {
            if let Some(description) = meta.description.as_deref() {
                if description.chars().count() > self.hard_description_chars {
                    meta.description =
                        Some(truncate_with_ellipsis(description, self.hard_description_chars));
                    json = self.measure(&meta, DegradationStep::TruncateDescription, &mut steps)?;
                }
            }
        }

        if json.len() > budget {
            return Err(BudgetError::Exhausted {
                bytes: json.len(),
                budget,
            });
        }

        Ok(BudgetedMetadata { json, steps })
    }

    fn measure(
        &self,
        meta: &UnifiedMetadata,
        step: DegradationStep,
        steps: &mut Vec<DegradationStep>,
    ) -> Result<String, BudgetError> {
        let json = serde_json::to_string(meta)?;
        debug!(?step, bytes = json.len(), "Applied degradation step");
        steps.push(step);
        Ok(json)
    }
}
