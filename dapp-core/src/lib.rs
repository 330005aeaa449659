//! Dapp Core - Reconciliation Engine for the Dapp Directory
//!
//! Turns records from three heterogeneous sources (the curated record
//! store, a third-party dapp directory, a DeFi analytics provider) into
//! one canonical, deduplicated, size-bounded record per dapp.
//!
//! # Architecture
//!
//! ```text
//! raw records ──► normalize ──► ChainMatcher ──► DuplicateResolver
//!                                                      │
//!                                          canonical store record
//!                                                      │
//!                     directory + analytics ──► SourceReconciler
//!                                                      │
//!                                              UnifiedMetadata
//!                                                      │
//!                                           SizeBudgetSerializer ──► JSON blob
//! ```
//!
//! Everything here is pure and synchronous; I/O lives in `dapp-sources`
//! and the pass orchestration in `dapp-sync`.

pub mod budget;
pub mod chains;
pub mod duplicates;
pub mod metadata;
pub mod normalize;
pub mod reconcile;
pub mod reference;
pub mod types;

// Re-export main types for convenience
pub use budget::{BudgetError, BudgetedMetadata, DegradationStep, SizeBudgetSerializer};
pub use chains::{compare_priority, ChainBatch, ChainIdentity, ChainMatcher, ChainTable, ChainTableError};
pub use duplicates::{DuplicateGroup, DuplicateResolver, MergeOutcome};
pub use metadata::{DataQuality, FieldSource, MetadataMode, UnifiedMetadata};
pub use normalize::{identity_key, normalize, MatchMode};
pub use reconcile::SourceReconciler;
pub use reference::{ReferenceData, ReferenceError};
pub use types::*;
