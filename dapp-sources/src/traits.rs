//! Core traits for the external collaborators.
//!
//! The record store is read-write; the dapp directory and the analytics
//! provider are read-only. Every call is a suspension point and may fail
//! with a [`SourceError`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use dapp_core::{AnalyticsRecord, DirectoryRecord, StorePatch, StoreRecord};

/// Error types for external calls.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Service is not reachable
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// Request was rejected
    #[error("Request failed ({status}): {message}")]
    RequestFailed { status: u16, message: String },

    /// Rate limited by the service
    #[error("Rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Response body could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl SourceError {
    /// Whether waiting and re-running could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceError::Unavailable(_) | SourceError::RateLimited { .. } | SourceError::NetworkError(_)
        )
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::ParseError(err.to_string())
        } else if err.is_connect() || err.is_timeout() {
            SourceError::Unavailable(err.to_string())
        } else {
            SourceError::NetworkError(err.to_string())
        }
    }
}

/// Filter for listing store records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilter {
    /// Content type to list, e.g. "dapp" or "chain"
    pub content_type: String,
    /// Exact-match field predicates
    #[serde(default)]
    pub field_predicates: Vec<(String, String)>,
    /// Field to order by; prefix with `-` for descending
    #[serde(default)]
    pub order_by: Option<String>,
}

impl ListFilter {
    /// List every record of a content type.
    pub fn of_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            ..Default::default()
        }
    }

    /// Add an exact-match predicate.
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.field_predicates.push((field.into(), value.into()));
        self
    }

    /// Set the ordering.
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }
}

/// One page of the directory listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryPage {
    pub records: Vec<DirectoryRecord>,
    pub has_more: bool,
}

/// The curated record store.
///
/// Listing is eventually consistent: a record created or updated moments
/// ago may not show up yet.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// List records matching a filter.
    async fn list(&self, filter: &ListFilter) -> Result<Vec<StoreRecord>, SourceError>;

    /// Fetch one record.
    async fn get(&self, id: &str) -> Result<StoreRecord, SourceError>;

    /// Create a draft record.
    async fn create(&self, content_type: &str, payload: &StorePatch) -> Result<StoreRecord, SourceError>;

    /// Apply a partial update.
    async fn update(&self, id: &str, payload: &StorePatch) -> Result<StoreRecord, SourceError>;

    /// Publish the latest version of a record.
    async fn publish(&self, id: &str) -> Result<(), SourceError>;

    /// Delete a record.
    async fn destroy(&self, id: &str) -> Result<(), SourceError>;
}

/// The third-party dapp directory.
#[async_trait]
pub trait DirectoryProvider: Send + Sync {
    /// Fetch one listing page, starting at 1.
    async fn list_page(&self, page: u32) -> Result<DirectoryPage, SourceError>;

    /// Fetch full detail for a slug. `Ok(None)` on 404.
    async fn get_detail(&self, slug: &str) -> Result<Option<DirectoryRecord>, SourceError>;
}

/// The DeFi analytics provider.
#[async_trait]
pub trait AnalyticsProvider: Send + Sync {
    /// All protocols in summary form.
    async fn list_protocols(&self) -> Result<Vec<AnalyticsRecord>, SourceError>;

    /// Full detail for one protocol, by slug or identifier.
    async fn get_protocol(&self, id: &str) -> Result<AnalyticsRecord, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_filter_builder() {
        let filter = ListFilter::of_type("dapp")
            .with_field("status", "published")
            .order_by("-createdAt");
        assert_eq!(filter.content_type, "dapp");
        assert_eq!(filter.field_predicates, vec![("status".to_string(), "published".to_string())]);
        assert_eq!(filter.order_by.as_deref(), Some("-createdAt"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(SourceError::RateLimited { retry_after_secs: None }.is_transient());
        assert!(SourceError::NetworkError("reset".to_string()).is_transient());
        assert!(!SourceError::NotFound("x".to_string()).is_transient());
        assert!(!SourceError::ParseError("bad".to_string()).is_transient());
    }
}
