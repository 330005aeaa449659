//! Dapp Sync - Reconciliation Passes for the Dapp Directory
//!
//! Keeps the curated record store canonical: collapses duplicates, imports
//! dapps the store lacks, and writes one size-bounded unified metadata blob
//! per record. See [`service`] for the passes and [`config`] for settings.

pub mod config;
pub mod service;
pub mod summary;

pub use config::{ConfigError, SyncConfig, ThrottleConfig};
pub use service::{AnalyticsCatalog, RankedRecord, SyncError, SyncService};
pub use summary::SyncSummary;
