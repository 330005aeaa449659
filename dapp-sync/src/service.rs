//! Sync Service
//!
//! Runs the reconciliation passes against the record store:
//!
//! 1. `dedupe`: group store records by identity, fold losers into the
//!    canonical record, then delete the losers
//! 2. `import`: create store records for directory dapps the store lacks
//! 3. `enrich`: reconcile each canonical record with its directory and
//!    analytics counterparts and write the size-bounded metadata blob back
//! 4. `rank`: report records ordered by the best chain they touch
//!
//! Processing is strictly sequential. Every mutating call is followed by a
//! fixed delay from [`ThrottleConfig`] to stay under the services' rate
//! limits. Per-record failures are counted in the [`SyncSummary`] and never
//! abort a pass; only failing to list the store's records does.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use dapp_core::{
    compare_priority, identity_key, AnalyticsRecord, ChainMatcher, ChainRef, DirectoryRecord,
    DuplicateGroup, DuplicateResolver, ReferenceData, SizeBudgetSerializer, SourceReconciler,
    StorePatch, StoreRecord,
};
use dapp_sources::{AnalyticsProvider, DirectoryProvider, ListFilter, RecordStore, SourceError};

use crate::config::{ConfigError, SyncConfig, ThrottleConfig};
use crate::summary::SyncSummary;

// ============================================================================
// Types
// ============================================================================

/// Errors that abort a pass.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The record store could not be listed at all
    #[error("Record store unavailable: {0}")]
    StoreUnavailable(#[source] SourceError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A store record placed by the chains it touches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedRecord {
    pub id: String,
    pub title: String,
    /// Best chain priority; `None` when no chain matched
    pub priority: Option<u32>,
    pub category: Option<String>,
    /// Canonical names of the matched chains
    pub chains: Vec<String>,
}

/// Analytics protocols indexed for lookup by id and by identity key.
///
/// Protocols in excluded categories are never indexed.
pub struct AnalyticsCatalog {
    protocols: Vec<AnalyticsRecord>,
    by_id: HashMap<String, usize>,
    by_key: HashMap<String, usize>,
    indexed: usize,
}

impl AnalyticsCatalog {
    pub fn new(protocols: Vec<AnalyticsRecord>, reference: &ReferenceData) -> Self {
        let mut by_id = HashMap::new();
        let mut by_key = HashMap::new();
        let mut indexed = 0;
        for (i, protocol) in protocols.iter().enumerate() {
            if protocol
                .category
                .as_deref()
                .is_some_and(|c| reference.is_excluded_category(c))
            {
                continue;
            }
            indexed += 1;
            by_id.entry(protocol.id.clone()).or_insert(i);
            if let Some(slug) = &protocol.slug {
                by_id.entry(slug.clone()).or_insert(i);
            }
            let key = identity_key(&protocol.name);
            if !key.is_empty() {
                by_key.entry(key).or_insert(i);
            }
        }
        Self {
            protocols,
            by_id,
            by_key,
            indexed,
        }
    }

    /// An explicit protocol id wins over a name match.
    pub fn lookup(&self, analytics_id: Option<&str>, key: &str) -> Option<&AnalyticsRecord> {
        let index = analytics_id
            .and_then(|id| self.by_id.get(id))
            .or_else(|| self.by_key.get(key))?;
        self.protocols.get(*index)
    }

    /// Number of protocols eligible for matching.
    pub fn len(&self) -> usize {
        self.indexed
    }

    pub fn is_empty(&self) -> bool {
        self.indexed == 0
    }
}

// ============================================================================
// Sync Service
// ============================================================================

/// Drives the passes against injected collaborators.
pub struct SyncService<S: RecordStore, D: DirectoryProvider, A: AnalyticsProvider> {
    config: SyncConfig,
    reference: Arc<ReferenceData>,
    store: Arc<S>,
    directory: Arc<D>,
    analytics: Arc<A>,
    matcher: ChainMatcher,
    resolver: DuplicateResolver,
    reconciler: SourceReconciler,
    serializer: SizeBudgetSerializer,
}

impl<S: RecordStore, D: DirectoryProvider, A: AnalyticsProvider> SyncService<S, D, A> {
    /// Create a service over the given collaborators.
    pub fn new(
        config: SyncConfig,
        reference: Arc<ReferenceData>,
        store: Arc<S>,
        directory: Arc<D>,
        analytics: Arc<A>,
    ) -> Self {
        let matcher = ChainMatcher::new(reference.clone())
            .with_min_containment_len(config.metadata.min_containment_len);
        let reconciler = SourceReconciler::new(reference.clone())
            .with_matcher(matcher.clone())
            .with_mode(config.metadata.mode);

        Self {
            config,
            reference,
            store,
            directory,
            analytics,
            matcher,
            resolver: DuplicateResolver::new(),
            reconciler,
            serializer: SizeBudgetSerializer::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn throttle(&self) -> &ThrottleConfig {
        &self.config.throttle
    }

    /// Run dedupe, import and enrich in order under one run id.
    pub async fn run_all(&self) -> Result<SyncSummary, SyncError> {
        let run_id = Uuid::new_v4().to_string();
        info!(run_id = %run_id, dry_run = self.config.dry_run, "Starting full sync");

        let mut summary = SyncSummary::new(run_id.clone());
        summary.absorb(self.dedupe_pass(&run_id).await?);
        summary.absorb(self.import_pass(&run_id).await?);
        summary.absorb(self.enrich_pass(&run_id).await?);

        info!(
            run_id = %run_id,
            created = summary.created,
            updated = summary.updated,
            merged = summary.merged,
            deleted = summary.deleted,
            skipped = summary.skipped,
            failed = summary.failed,
            "Full sync completed"
        );
        Ok(summary)
    }

    /// Collapse duplicate store records.
    pub async fn dedupe(&self) -> Result<SyncSummary, SyncError> {
        self.dedupe_pass(&Uuid::new_v4().to_string()).await
    }

    /// Create store records for directory dapps the store lacks.
    pub async fn import(&self) -> Result<SyncSummary, SyncError> {
        self.import_pass(&Uuid::new_v4().to_string()).await
    }

    /// Write unified metadata onto every canonical store record.
    pub async fn enrich(&self) -> Result<SyncSummary, SyncError> {
        self.enrich_pass(&Uuid::new_v4().to_string()).await
    }

    /// Store records ordered by best chain priority, unmatched last.
    pub async fn rank(&self) -> Result<Vec<RankedRecord>, SyncError> {
        let run_id = Uuid::new_v4().to_string();
        let records = self.list_records(&run_id).await?;
        let lookup = self.chain_lookup(&run_id).await;

        let mut ranked: Vec<RankedRecord> = records
            .into_iter()
            .map(|mut record| {
                self.resolve_refs(&run_id, &mut record, &lookup);
                let batch = self.matcher.resolve_batch(record.chain_names());
                RankedRecord {
                    id: record.id,
                    title: record.title,
                    priority: batch.priority,
                    category: batch.category,
                    chains: batch
                        .identities
                        .into_iter()
                        .map(|identity| identity.canonical_name)
                        .collect(),
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            compare_priority(a.priority, b.priority)
                .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
                .then_with(|| a.id.cmp(&b.id))
        });

        let matched = ranked.iter().filter(|r| r.priority.is_some()).count();
        info!(run_id = %run_id, total = ranked.len(), matched, "Ranked store records");
        Ok(ranked)
    }

    // ------------------------------------------------------------------------
    // Passes
    // ------------------------------------------------------------------------

    async fn dedupe_pass(&self, run_id: &str) -> Result<SyncSummary, SyncError> {
        let mut summary = SyncSummary::new(run_id);
        let records = self.list_records(run_id).await?;
        let groups = self.resolver.group_and_resolve(&records);
        let duplicates: Vec<&DuplicateGroup> = groups.iter().filter(|g| g.is_duplicate()).collect();

        info!(
            run_id = %run_id,
            records = records.len(),
            groups = groups.len(),
            duplicate_groups = duplicates.len(),
            "Starting dedupe pass"
        );

        for group in duplicates {
            self.resolve_group(run_id, group, &mut summary).await;
        }

        info!(
            run_id = %run_id,
            merged = summary.merged,
            deleted = summary.deleted,
            failed = summary.failed,
            "Dedupe pass completed"
        );
        Ok(summary)
    }

    /// Merge then delete. Deletes are only issued once the merge is written.
    async fn resolve_group(&self, run_id: &str, group: &DuplicateGroup, summary: &mut SyncSummary) {
        let canonical = group.canonical();
        let outcome = group.merge();
        info!(
            run_id = %run_id,
            key = %group.key,
            canonical = %canonical.id,
            score = group.members[0].score,
            losers = group.members.len() - 1,
            "Resolving duplicate group"
        );

        if !outcome.patch.is_empty() {
            if let Err(e) = self.update_record(run_id, &canonical.id, &outcome.patch).await {
                warn!(run_id = %run_id, record_id = %canonical.id, error = %e, "Merge write failed, keeping duplicates");
                summary.record_failure(format!("merge into {} failed: {}", canonical.id, e));
                return;
            }
            if canonical.is_published() {
                if let Err(e) = self.publish_record(run_id, &canonical.id).await {
                    warn!(run_id = %run_id, record_id = %canonical.id, error = %e, "Republish failed");
                    summary.record_failure(format!("publish {} failed: {}", canonical.id, e));
                }
            }
        }
        summary.merged += 1;

        for loser in group.losers() {
            match self.destroy_record(run_id, &loser.id).await {
                Ok(()) => {
                    debug!(run_id = %run_id, record_id = %loser.id, canonical = %canonical.id, "Deleted duplicate");
                    summary.deleted += 1;
                }
                Err(e) => {
                    warn!(run_id = %run_id, record_id = %loser.id, error = %e, "Delete failed");
                    summary.record_failure(format!("delete {} failed: {}", loser.id, e));
                }
            }
        }
    }

    async fn import_pass(&self, run_id: &str) -> Result<SyncSummary, SyncError> {
        let mut summary = SyncSummary::new(run_id);
        let records = self.list_records(run_id).await?;

        let mut titles: HashMap<String, String> = HashMap::new();
        for record in &records {
            let key = identity_key(&record.title);
            if !key.is_empty() {
                titles.entry(key).or_insert_with(|| record.id.clone());
            }
        }
        info!(run_id = %run_id, existing = titles.len(), "Starting import pass");

        let dapps = self.fetch_directory(run_id, &mut summary).await;
        for dapp in dapps {
            let key = identity_key(&dapp.name);
            if key.is_empty() {
                debug!(run_id = %run_id, slug = %dapp.slug, "Directory entry has no usable name");
                summary.skipped += 1;
                continue;
            }
            if let Some(existing) = titles.get(&key) {
                debug!(run_id = %run_id, slug = %dapp.slug, existing = %existing, "Name already in store");
                summary.skipped += 1;
                continue;
            }

            let payload = self.import_payload(&dapp);
            match self.create_record(run_id, &payload).await {
                Ok(created) => {
                    let id = created.map(|r| r.id).unwrap_or_else(|| format!("dry-run:{}", dapp.slug));
                    info!(run_id = %run_id, record_id = %id, name = %dapp.name, "Imported directory dapp");
                    summary.created += 1;
                    if let Err(e) = self.publish_record(run_id, &id).await {
                        warn!(run_id = %run_id, record_id = %id, error = %e, "Publish failed");
                        summary.record_failure(format!("publish {} failed: {}", id, e));
                    }
                    titles.insert(key, id);
                }
                Err(e) => {
                    warn!(run_id = %run_id, slug = %dapp.slug, error = %e, "Create failed");
                    summary.record_failure(format!("create {} failed: {}", dapp.slug, e));
                }
            }
        }

        info!(
            run_id = %run_id,
            created = summary.created,
            skipped = summary.skipped,
            failed = summary.failed,
            "Import pass completed"
        );
        Ok(summary)
    }

    fn import_payload(&self, dapp: &DirectoryRecord) -> StorePatch {
        let chains: Vec<ChainRef> = dapp
            .chains
            .iter()
            .map(|c| ChainRef::Name(self.matcher.canonical_name(c)))
            .collect();

        StorePatch {
            title: Some(dapp.name.trim().to_string()),
            slug: Some(dapp.slug.clone()),
            short_description: dapp.description.clone(),
            chains: (!chains.is_empty()).then_some(chains),
            directory_enrichment: serde_json::to_value(dapp).ok(),
            ..Default::default()
        }
    }

    async fn enrich_pass(&self, run_id: &str) -> Result<SyncSummary, SyncError> {
        let mut summary = SyncSummary::new(run_id);
        let records = self.list_records(run_id).await?;
        let lookup = self.chain_lookup(run_id).await;

        let mut directory_index: HashMap<String, DirectoryRecord> = HashMap::new();
        for dapp in self.fetch_directory(run_id, &mut summary).await {
            let key = identity_key(&dapp.name);
            if !key.is_empty() {
                directory_index.entry(key).or_insert(dapp);
            }
        }

        let protocols = match self.analytics.list_protocols().await {
            Ok(protocols) => protocols,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Analytics listing failed, enriching without it");
                summary.record_failure(format!("analytics listing failed: {}", e));
                Vec::new()
            }
        };
        let catalog = AnalyticsCatalog::new(protocols, &self.reference);

        let groups = self.resolver.group_and_resolve(&records);
        info!(
            run_id = %run_id,
            records = groups.len(),
            directory = directory_index.len(),
            analytics = catalog.len(),
            mode = ?self.reconciler.mode(),
            "Starting enrich pass"
        );

        for group in &groups {
            if group.is_duplicate() {
                debug!(run_id = %run_id, key = %group.key, "Enriching canonical only; duplicates pending dedupe");
                summary.skipped += (group.members.len() - 1) as u32;
            }
            let mut record = group.canonical().clone();
            self.resolve_refs(run_id, &mut record, &lookup);
            self.enrich_record(run_id, record, &directory_index, &catalog, &mut summary)
                .await;
        }

        info!(
            run_id = %run_id,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            "Enrich pass completed"
        );
        Ok(summary)
    }

    async fn enrich_record(
        &self,
        run_id: &str,
        record: StoreRecord,
        directory_index: &HashMap<String, DirectoryRecord>,
        catalog: &AnalyticsCatalog,
        summary: &mut SyncSummary,
    ) {
        let key = identity_key(&record.title);
        let directory = match directory_index.get(&key) {
            Some(listed) => Some(self.directory_detail(run_id, listed).await),
            None => None,
        };
        let analytics = match catalog.lookup(record.analytics_id.as_deref(), &key) {
            Some(listed) => Some(self.analytics_detail(run_id, listed).await),
            None => None,
        };
        debug!(
            run_id = %run_id,
            record_id = %record.id,
            directory = directory.is_some(),
            analytics = analytics.is_some(),
            "Matched sources"
        );

        let unified = self
            .reconciler
            .reconcile(&record, directory.as_ref(), analytics.as_ref());
        let budgeted = match self.serializer.serialize(&unified, self.config.metadata.budget_bytes) {
            Ok(budgeted) => budgeted,
            Err(e) => {
                warn!(run_id = %run_id, record_id = %record.id, error = %e, "Metadata does not fit, skipping");
                summary.record_skip(format!("{}: {}", record.id, e));
                return;
            }
        };
        if budgeted.is_degraded() {
            info!(
                run_id = %run_id,
                record_id = %record.id,
                bytes = budgeted.bytes(),
                steps = ?budgeted.steps,
                "Metadata degraded to fit budget"
            );
        }

        if is_unchanged(run_id, &record, &budgeted.json) {
            debug!(run_id = %run_id, record_id = %record.id, "Metadata unchanged");
            summary.skipped += 1;
            return;
        }

        let patch = StorePatch {
            unified_metadata: Some(budgeted.json),
            tvl_usd: analytics.as_ref().and_then(|a| a.tvl_usd).filter(|v| v.is_finite() && *v > 0.0),
            token_price_usd: analytics.as_ref().and_then(|a| a.token_price_usd),
            analytics_id: match (&record.analytics_id, &analytics) {
                (None, Some(a)) => Some(a.id.clone()),
                _ => None,
            },
            directory_enrichment: directory.as_ref().and_then(|d| serde_json::to_value(d).ok()),
            last_synced_at: Some(Utc::now()),
            ..Default::default()
        };

        if let Err(e) = self.update_record(run_id, &record.id, &patch).await {
            warn!(run_id = %run_id, record_id = %record.id, error = %e, "Update failed");
            summary.record_failure(format!("update {} failed: {}", record.id, e));
            return;
        }
        summary.updated += 1;
        info!(run_id = %run_id, record_id = %record.id, title = %record.title, "Enriched record");

        if record.is_published() {
            if let Err(e) = self.publish_record(run_id, &record.id).await {
                warn!(run_id = %run_id, record_id = %record.id, error = %e, "Republish failed");
                summary.record_failure(format!("publish {} failed: {}", record.id, e));
            }
        }
    }

    /// Full directory detail, falling back to the listing entry.
    async fn directory_detail(&self, run_id: &str, listed: &DirectoryRecord) -> DirectoryRecord {
        match self.directory.get_detail(&listed.slug).await {
            Ok(Some(detail)) => detail,
            Ok(None) => listed.clone(),
            Err(e) => {
                warn!(run_id = %run_id, slug = %listed.slug, error = %e, "Directory detail failed, using listing");
                listed.clone()
            }
        }
    }

    /// Full protocol detail, gaps filled from the listing summary.
    async fn analytics_detail(&self, run_id: &str, listed: &AnalyticsRecord) -> AnalyticsRecord {
        let id = listed.slug.as_deref().unwrap_or(&listed.id);
        match self.analytics.get_protocol(id).await {
            Ok(detail) => fill_from_summary(detail, listed),
            Err(e) => {
                warn!(run_id = %run_id, protocol = %id, error = %e, "Analytics detail failed, using summary");
                listed.clone()
            }
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    async fn list_records(&self, run_id: &str) -> Result<Vec<StoreRecord>, SyncError> {
        let filter = ListFilter::of_type(&self.config.store.content_type);
        let records = self
            .store
            .list(&filter)
            .await
            .map_err(SyncError::StoreUnavailable)?;
        debug!(run_id = %run_id, count = records.len(), "Listed store records");
        Ok(records)
    }

    /// Chain entry id to name, for resolving id references.
    async fn chain_lookup(&self, run_id: &str) -> HashMap<String, String> {
        let filter = ListFilter::of_type(&self.config.store.chain_content_type);
        match self.store.list(&filter).await {
            Ok(chains) => chains.into_iter().map(|c| (c.id, c.title)).collect(),
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Chain entries unavailable, id references will be dropped");
                HashMap::new()
            }
        }
    }

    fn resolve_refs(&self, run_id: &str, record: &mut StoreRecord, lookup: &HashMap<String, String>) {
        let unresolved = record.resolve_chain_refs(lookup);
        if !unresolved.is_empty() {
            debug!(run_id = %run_id, record_id = %record.id, ids = ?unresolved, "Dropped unresolvable chain references");
        }
    }

    /// Every directory page up to the configured limit.
    async fn fetch_directory(&self, run_id: &str, summary: &mut SyncSummary) -> Vec<DirectoryRecord> {
        let mut dapps = Vec::new();
        for page in 1..=self.config.directory.max_pages {
            let result = self.directory.list_page(page).await;
            pause(self.throttle().page_fetch()).await;
            match result {
                Ok(listing) => {
                    dapps.extend(listing.records);
                    if !listing.has_more {
                        break;
                    }
                }
                Err(e) => {
                    warn!(run_id = %run_id, page, error = %e, "Directory page failed, stopping pagination");
                    summary.record_failure(format!("directory page {} failed: {}", page, e));
                    break;
                }
            }
        }
        debug!(run_id = %run_id, count = dapps.len(), "Fetched directory");
        dapps
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    async fn create_record(&self, run_id: &str, payload: &StorePatch) -> Result<Option<StoreRecord>, SourceError> {
        let content_type = &self.config.store.content_type;
        if self.config.dry_run {
            info!(run_id = %run_id, content_type = %content_type, title = ?payload.title, "Dry run: would create");
            return Ok(None);
        }
        let result = self.store.create(content_type, payload).await;
        pause(self.throttle().create()).await;
        result.map(Some)
    }

    async fn update_record(&self, run_id: &str, id: &str, patch: &StorePatch) -> Result<(), SourceError> {
        if self.config.dry_run {
            info!(run_id = %run_id, record_id = %id, patch = ?patch_fields(patch), "Dry run: would update");
            return Ok(());
        }
        let result = self.store.update(id, patch).await;
        pause(self.throttle().update()).await;
        result.map(|_| ())
    }

    async fn publish_record(&self, run_id: &str, id: &str) -> Result<(), SourceError> {
        if self.config.dry_run {
            info!(run_id = %run_id, record_id = %id, "Dry run: would publish");
            return Ok(());
        }
        let result = self.store.publish(id).await;
        pause(self.throttle().publish()).await;
        result
    }

    async fn destroy_record(&self, run_id: &str, id: &str) -> Result<(), SourceError> {
        if self.config.dry_run {
            info!(run_id = %run_id, record_id = %id, "Dry run: would delete");
            return Ok(());
        }
        let result = self.store.destroy(id).await;
        pause(self.throttle().destroy()).await;
        result
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Field names a patch would write.
fn patch_fields(patch: &StorePatch) -> Vec<String> {
    match serde_json::to_value(patch) {
        Ok(Value::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

/// Whether the stored blob already equals the new one.
///
/// A malformed stored blob counts as absent.
fn is_unchanged(run_id: &str, record: &StoreRecord, json: &str) -> bool {
    let Some(previous) = record.unified_metadata.as_deref() else {
        return false;
    };
    let previous: Value = match serde_json::from_str(previous) {
        Ok(value) => value,
        Err(e) => {
            warn!(run_id = %run_id, record_id = %record.id, error = %e, "Stored metadata is malformed, replacing it");
            return false;
        }
    };
    serde_json::from_str::<Value>(json).is_ok_and(|current| current == previous)
}

fn fill_from_summary(mut detail: AnalyticsRecord, summary: &AnalyticsRecord) -> AnalyticsRecord {
    if detail.slug.is_none() {
        detail.slug = summary.slug.clone();
    }
    if detail.category.is_none() {
        detail.category = summary.category.clone();
    }
    if detail.chains.is_empty() {
        detail.chains = summary.chains.clone();
    }
    if detail.tvl_usd.is_none() {
        detail.tvl_usd = summary.tvl_usd;
    }
    if detail.chain_tvl.is_empty() {
        detail.chain_tvl = summary.chain_tvl.clone();
    }
    detail.change_1h = detail.change_1h.or(summary.change_1h);
    detail.change_1d = detail.change_1d.or(summary.change_1d);
    detail.change_7d = detail.change_7d.or(summary.change_7d);
    detail.token_symbol = detail.token_symbol.or_else(|| summary.token_symbol.clone());
    detail.market_cap_usd = detail.market_cap_usd.or(summary.market_cap_usd);
    detail.url = detail.url.or_else(|| summary.url.clone());
    detail.twitter = detail.twitter.or_else(|| summary.twitter.clone());
    if detail.github.is_empty() {
        detail.github = summary.github.clone();
    }
    detail
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol(id: &str, name: &str, category: Option<&str>) -> AnalyticsRecord {
        AnalyticsRecord {
            id: id.to_string(),
            name: name.to_string(),
            category: category.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_catalog_excludes_categories() {
        let catalog = AnalyticsCatalog::new(
            vec![
                protocol("1", "Binance CEX", Some("CEX")),
                protocol("2", "Aave", Some("Lending")),
            ],
            &ReferenceData::builtin(),
        );
        assert!(catalog.lookup(None, &identity_key("Binance CEX")).is_none());
        assert!(catalog.lookup(Some("1"), "").is_none());
        assert_eq!(catalog.lookup(None, "aave").map(|p| p.id.as_str()), Some("2"));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_catalog_prefers_explicit_id() {
        let catalog = AnalyticsCatalog::new(
            vec![protocol("10", "Foo", None), protocol("11", "Bar", None)],
            &ReferenceData::builtin(),
        );
        let hit = catalog.lookup(Some("11"), "foo").unwrap();
        assert_eq!(hit.id, "11");
        let fallback = catalog.lookup(Some("missing"), "foo").unwrap();
        assert_eq!(fallback.id, "10");
    }

    #[test]
    fn test_is_unchanged() {
        let mut record = StoreRecord::new("rec1", "Foo");
        assert!(!is_unchanged("run", &record, r#"{"name":"Foo"}"#));

        record.unified_metadata = Some(r#"{ "name": "Foo" }"#.to_string());
        assert!(is_unchanged("run", &record, r#"{"name":"Foo"}"#));
        assert!(!is_unchanged("run", &record, r#"{"name":"Bar"}"#));

        record.unified_metadata = Some("{not json".to_string());
        assert!(!is_unchanged("run", &record, r#"{"name":"Foo"}"#));
    }

    #[test]
    fn test_fill_from_summary() {
        let mut summary = protocol("1", "Foo", Some("Dexes"));
        summary.change_1h = Some(0.5);
        summary.tvl_usd = Some(10.0);
        let mut detail = protocol("1", "Foo", None);
        detail.tvl_usd = Some(12.0);

        let filled = fill_from_summary(detail, &summary);
        assert_eq!(filled.category.as_deref(), Some("Dexes"));
        assert_eq!(filled.change_1h, Some(0.5));
        assert_eq!(filled.tvl_usd, Some(12.0));
    }

    #[test]
    fn test_patch_fields() {
        let patch = StorePatch {
            tvl_usd: Some(1.0),
            unified_metadata: Some("{}".to_string()),
            ..Default::default()
        };
        assert_eq!(patch_fields(&patch), vec!["tvlUsd", "unifiedMetadata"]);
    }
}
