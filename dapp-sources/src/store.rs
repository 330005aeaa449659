//! REST record-store client.
//!
//! Talks to a content-store management API:
//!
//! | call | request |
//! |---|---|
//! | list | `GET /entries?content_type=..&fields.<f>=..&order=..&skip=..&limit=..` |
//! | get | `GET /entries/{id}` |
//! | create | `POST /entries?content_type=..` |
//! | update | `PATCH /entries/{id}` |
//! | publish | `PUT /entries/{id}/published` |
//! | destroy | `DELETE /entries/{id}` |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use dapp_core::{StorePatch, StoreRecord};

use crate::http::{build_client, check_status, decode, join, DEFAULT_TIMEOUT};
use crate::traits::{ListFilter, RecordStore, SourceError};

/// Entries requested per list call.
pub const DEFAULT_STORE_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct EntryList {
    items: Vec<StoreRecord>,
    #[serde(default)]
    total: Option<usize>,
}

/// HTTP-backed [`RecordStore`].
pub struct HttpRecordStore {
    client: Client,
    base_url: String,
    page_size: usize,
}

impl HttpRecordStore {
    /// Create a client for the store at `base_url`.
    pub fn new(base_url: impl Into<String>, token: Option<&str>) -> Result<Self, SourceError> {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client(token, timeout)?,
            base_url: base_url.into(),
            page_size: DEFAULT_STORE_PAGE_SIZE,
        })
    }

    /// Set the number of entries requested per list call.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn entry_url(&self, id: &str) -> String {
        join(&self.base_url, &format!("entries/{}", id))
    }

    fn list_query(filter: &ListFilter) -> Vec<(String, String)> {
        let mut query = vec![("content_type".to_string(), filter.content_type.clone())];
        for (field, value) in &filter.field_predicates {
            query.push((format!("fields.{}", field), value.clone()));
        }
        if let Some(order) = &filter.order_by {
            query.push(("order".to_string(), order.clone()));
        }
        query
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    /// Follows `skip`/`limit` paging until `total` entries are read. Without
    /// a `total`, a short page ends the listing.
    async fn list(&self, filter: &ListFilter) -> Result<Vec<StoreRecord>, SourceError> {
        let base_query = Self::list_query(filter);
        let mut records = Vec::new();

        loop {
            let response = self
                .client
                .get(join(&self.base_url, "entries"))
                .query(&base_query)
                .query(&[("skip", records.len()), ("limit", self.page_size)])
                .send()
                .await?;
            let page: EntryList = decode(check_status(response, "entries").await?).await?;
            let fetched = page.items.len();
            records.extend(page.items);

            let done = match page.total {
                Some(total) => records.len() >= total,
                None => fetched < self.page_size,
            };
            if fetched == 0 || done {
                break;
            }
        }

        debug!(content_type = %filter.content_type, count = records.len(), "Listed store entries");
        Ok(records)
    }

    async fn get(&self, id: &str) -> Result<StoreRecord, SourceError> {
        let response = self.client.get(self.entry_url(id)).send().await?;
        decode(check_status(response, id).await?).await
    }

    async fn create(&self, content_type: &str, payload: &StorePatch) -> Result<StoreRecord, SourceError> {
        let response = self
            .client
            .post(join(&self.base_url, "entries"))
            .query(&[("content_type", content_type)])
            .json(payload)
            .send()
            .await?;
        decode(check_status(response, content_type).await?).await
    }

    async fn update(&self, id: &str, payload: &StorePatch) -> Result<StoreRecord, SourceError> {
        let response = self
            .client
            .patch(self.entry_url(id))
            .json(payload)
            .send()
            .await?;
        decode(check_status(response, id).await?).await
    }

    async fn publish(&self, id: &str) -> Result<(), SourceError> {
        let response = self
            .client
            .put(format!("{}/published", self.entry_url(id)))
            .send()
            .await?;
        check_status(response, id).await?;
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), SourceError> {
        let response = self.client.delete(self.entry_url(id)).send().await?;
        check_status(response, id).await?;
        Ok(())
    }
}
