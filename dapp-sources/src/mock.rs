//! In-memory collaborators for tests and dry runs.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use dapp_core::{AnalyticsRecord, DirectoryRecord, PublishStatus, StorePatch, StoreRecord};

use crate::traits::*;

/// A call made against [`InMemoryRecordStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    List(String),
    Get(String),
    Create(String),
    Update(String),
    Publish(String),
    Destroy(String),
}

/// Record store backed by a vector of `(content_type, record)` pairs.
///
/// Listing returns records in insertion order unless the filter orders
/// them. Updating a published record moves it to `Changed`, as a real
/// store would.
pub struct InMemoryRecordStore {
    records: RwLock<Vec<(String, StoreRecord)>>,
    calls: RwLock<Vec<StoreCall>>,
    next_id: AtomicU32,
    failing_updates: HashSet<String>,
    failing_destroys: HashSet<String>,
    failing_lists: HashSet<String>,
}

impl InMemoryRecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            calls: RwLock::new(Vec::new()),
            next_id: AtomicU32::new(1),
            failing_updates: HashSet::new(),
            failing_destroys: HashSet::new(),
            failing_lists: HashSet::new(),
        }
    }

    /// Seed a record.
    pub fn with_record(mut self, content_type: impl Into<String>, record: StoreRecord) -> Self {
        self.records.get_mut().push((content_type.into(), record));
        self
    }

    /// Seed several records of one content type.
    pub fn with_records(
        mut self,
        content_type: &str,
        records: impl IntoIterator<Item = StoreRecord>,
    ) -> Self {
        let seeded = self.records.get_mut();
        for record in records {
            seeded.push((content_type.to_string(), record));
        }
        self
    }

    /// Make updates to `id` fail.
    pub fn with_failing_update(mut self, id: impl Into<String>) -> Self {
        self.failing_updates.insert(id.into());
        self
    }

    /// Make deleting `id` fail.
    pub fn with_failing_destroy(mut self, id: impl Into<String>) -> Self {
        self.failing_destroys.insert(id.into());
        self
    }

    /// Make listing `content_type` fail.
    pub fn with_failing_list(mut self, content_type: impl Into<String>) -> Self {
        self.failing_lists.insert(content_type.into());
        self
    }

    /// Current state of one record.
    pub async fn record(&self, id: &str) -> Option<StoreRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|(_, r)| r.id == id)
            .map(|(_, r)| r.clone())
    }

    /// All records of a content type, in insertion order.
    pub async fn records_of(&self, content_type: &str) -> Vec<StoreRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|(t, _)| t == content_type)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Every call made so far.
    pub async fn calls(&self) -> Vec<StoreCall> {
        self.calls.read().await.clone()
    }

    /// Number of mutating calls made so far.
    pub async fn mutation_count(&self) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| !matches!(c, StoreCall::List(_) | StoreCall::Get(_)))
            .count()
    }

    async fn log(&self, call: StoreCall) {
        self.calls.write().await.push(call);
    }

    fn injected_failure(id: &str) -> SourceError {
        SourceError::RequestFailed {
            status: 500,
            message: format!("injected failure for {}", id),
        }
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Field value as a comparable string; missing fields compare as empty.
fn field_text(record: &StoreRecord, field: &str) -> String {
    let value = serde_json::to_value(record).unwrap_or(Value::Null);
    match value.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn compare_field(a: &StoreRecord, b: &StoreRecord, field: &str) -> CmpOrdering {
    let (x, y) = (field_text(a, field), field_text(b, field));
    match (x.parse::<f64>(), y.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(CmpOrdering::Equal),
        _ => x.cmp(&y),
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn list(&self, filter: &ListFilter) -> Result<Vec<StoreRecord>, SourceError> {
        self.log(StoreCall::List(filter.content_type.clone())).await;
        if self.failing_lists.contains(&filter.content_type) {
            return Err(SourceError::Unavailable(format!(
                "injected failure listing {}",
                filter.content_type
            )));
        }

        let mut records: Vec<StoreRecord> = self
            .records
            .read()
            .await
            .iter()
            .filter(|(t, _)| *t == filter.content_type)
            .filter(|(_, r)| {
                filter
                    .field_predicates
                    .iter()
                    .all(|(field, value)| field_text(r, field) == *value)
            })
            .map(|(_, r)| r.clone())
            .collect();

        if let Some(order) = &filter.order_by {
            let (field, descending) = match order.strip_prefix('-') {
                Some(field) => (field, true),
                None => (order.as_str(), false),
            };
            records.sort_by(|a, b| {
                let ord = compare_field(a, b, field);
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }

        Ok(records)
    }

    async fn get(&self, id: &str) -> Result<StoreRecord, SourceError> {
        self.log(StoreCall::Get(id.to_string())).await;
        self.record(id)
            .await
            .ok_or_else(|| SourceError::NotFound(id.to_string()))
    }

    async fn create(&self, content_type: &str, payload: &StorePatch) -> Result<StoreRecord, SourceError> {
        self.log(StoreCall::Create(content_type.to_string())).await;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut record = StoreRecord::new(format!("new{}", n), "");
        payload.apply_to(&mut record);

        self.records
            .write()
            .await
            .push((content_type.to_string(), record.clone()));
        Ok(record)
    }

    async fn update(&self, id: &str, payload: &StorePatch) -> Result<StoreRecord, SourceError> {
        self.log(StoreCall::Update(id.to_string())).await;
        if self.failing_updates.contains(id) {
            return Err(Self::injected_failure(id));
        }

        let mut records = self.records.write().await;
        let (_, record) = records
            .iter_mut()
            .find(|(_, r)| r.id == id)
            .ok_or_else(|| SourceError::NotFound(id.to_string()))?;
        payload.apply_to(record);
        if record.status == PublishStatus::Published {
            record.status = PublishStatus::Changed;
        }
        Ok(record.clone())
    }

    async fn publish(&self, id: &str) -> Result<(), SourceError> {
        self.log(StoreCall::Publish(id.to_string())).await;
        let mut records = self.records.write().await;
        let (_, record) = records
            .iter_mut()
            .find(|(_, r)| r.id == id)
            .ok_or_else(|| SourceError::NotFound(id.to_string()))?;
        record.status = PublishStatus::Published;
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), SourceError> {
        self.log(StoreCall::Destroy(id.to_string())).await;
        if self.failing_destroys.contains(id) {
            return Err(Self::injected_failure(id));
        }

        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|(_, r)| r.id != id);
        if records.len() == before {
            return Err(SourceError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

/// Directory serving fixed pages.
pub struct StaticDirectory {
    pages: Vec<Vec<DirectoryRecord>>,
    details: HashMap<String, DirectoryRecord>,
    failing_details: bool,
    pages_fetched: AtomicU32,
}

impl StaticDirectory {
    /// Serve `pages` in order; page numbers start at 1.
    pub fn new(pages: Vec<Vec<DirectoryRecord>>) -> Self {
        Self {
            pages,
            details: HashMap::new(),
            failing_details: false,
            pages_fetched: AtomicU32::new(0),
        }
    }

    /// Serve all records as a single page.
    pub fn single_page(records: Vec<DirectoryRecord>) -> Self {
        Self::new(vec![records])
    }

    /// Override the detail returned for a slug.
    pub fn with_detail(mut self, record: DirectoryRecord) -> Self {
        self.details.insert(record.slug.clone(), record);
        self
    }

    /// Make every detail call fail with a 503.
    pub fn with_failing_details(mut self) -> Self {
        self.failing_details = true;
        self
    }

    /// Number of pages fetched so far.
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryProvider for StaticDirectory {
    async fn list_page(&self, page: u32) -> Result<DirectoryPage, SourceError> {
        self.pages_fetched.fetch_add(1, Ordering::SeqCst);
        let index = page.saturating_sub(1) as usize;
        let records = self.pages.get(index).cloned().unwrap_or_default();
        Ok(DirectoryPage {
            records,
            has_more: index + 1 < self.pages.len(),
        })
    }

    async fn get_detail(&self, slug: &str) -> Result<Option<DirectoryRecord>, SourceError> {
        if self.failing_details {
            return Err(detail_failure(slug));
        }
        if let Some(detail) = self.details.get(slug) {
            return Ok(Some(detail.clone()));
        }
        Ok(self.pages.iter().flatten().find(|r| r.slug == slug).cloned())
    }
}

/// Analytics provider serving a fixed protocol list.
pub struct StaticAnalytics {
    protocols: Vec<AnalyticsRecord>,
    details: HashMap<String, AnalyticsRecord>,
    failing_details: bool,
    detail_calls: AtomicU32,
}

impl StaticAnalytics {
    /// Serve `protocols` from the listing.
    pub fn new(protocols: Vec<AnalyticsRecord>) -> Self {
        Self {
            protocols,
            details: HashMap::new(),
            failing_details: false,
            detail_calls: AtomicU32::new(0),
        }
    }

    /// Override the detail returned for a protocol id.
    pub fn with_detail(mut self, record: AnalyticsRecord) -> Self {
        self.details.insert(record.id.clone(), record);
        self
    }

    /// Make every detail call fail with a 503.
    pub fn with_failing_details(mut self) -> Self {
        self.failing_details = true;
        self
    }

    /// Number of detail fetches so far.
    pub fn detail_calls(&self) -> u32 {
        self.detail_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalyticsProvider for StaticAnalytics {
    async fn list_protocols(&self) -> Result<Vec<AnalyticsRecord>, SourceError> {
        Ok(self.protocols.clone())
    }

    async fn get_protocol(&self, id: &str) -> Result<AnalyticsRecord, SourceError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_details {
            return Err(detail_failure(id));
        }
        if let Some(detail) = self.details.get(id) {
            return Ok(detail.clone());
        }
        self.protocols
            .iter()
            .find(|p| p.id == id || p.slug.as_deref() == Some(id))
            .cloned()
            .ok_or_else(|| SourceError::NotFound(id.to_string()))
    }
}

fn detail_failure(key: &str) -> SourceError {
    SourceError::RequestFailed {
        status: 503,
        message: format!("injected detail failure for {}", key),
    }
}
