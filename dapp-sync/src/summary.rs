//! Per-run counters.

use serde::{Deserialize, Serialize};

/// Error messages kept verbatim; later ones are only counted.
pub const MAX_REPORTED_ERRORS: usize = 20;

/// Outcome counts for one run of one or more passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub run_id: String,
    pub created: u32,
    pub updated: u32,
    pub merged: u32,
    pub deleted: u32,
    pub skipped: u32,
    pub failed: u32,
    /// First error messages, in order of occurrence
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl SyncSummary {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            ..Default::default()
        }
    }

    /// Count a failure and keep its message if there is room.
    pub fn record_failure(&mut self, message: impl Into<String>) {
        self.failed += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(message.into());
        }
    }

    /// Count a skipped record whose reason should be reported.
    pub fn record_skip(&mut self, message: impl Into<String>) {
        self.skipped += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(message.into());
        }
    }

    /// Fold another summary's counts into this one.
    pub fn absorb(&mut self, other: SyncSummary) {
        self.created += other.created;
        self.updated += other.updated;
        self.merged += other.merged;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.failed += other.failed;
        let room = MAX_REPORTED_ERRORS.saturating_sub(self.errors.len());
        self.errors.extend(other.errors.into_iter().take(room));
    }

    /// Whether anything failed.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}
