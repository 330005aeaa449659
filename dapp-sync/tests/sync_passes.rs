//! End-to-end pass tests against the in-memory collaborators.

use std::collections::BTreeMap;
use std::sync::Arc;

use dapp_core::{
    AnalyticsRecord, ChainRef, DirectoryRecord, Links, MetadataMode, PublishStatus, ReferenceData,
    StoreRecord,
};
use dapp_sources::{InMemoryRecordStore, StaticAnalytics, StaticDirectory, StoreCall};
use dapp_sync::{SyncConfig, SyncError, SyncService, ThrottleConfig};
use serde_json::Value;

type Service = SyncService<InMemoryRecordStore, StaticDirectory, StaticAnalytics>;

fn test_config() -> SyncConfig {
    SyncConfig {
        throttle: ThrottleConfig::none(),
        ..Default::default()
    }
}

fn service_with(
    config: SyncConfig,
    store: Arc<InMemoryRecordStore>,
    directory: StaticDirectory,
    analytics: StaticAnalytics,
) -> Service {
    SyncService::new(
        config,
        Arc::new(ReferenceData::builtin()),
        store,
        Arc::new(directory),
        Arc::new(analytics),
    )
}

fn service(store: Arc<InMemoryRecordStore>) -> Service {
    service_with(
        test_config(),
        store,
        StaticDirectory::new(Vec::new()),
        StaticAnalytics::new(Vec::new()),
    )
}

fn dapp(slug: &str, name: &str) -> DirectoryRecord {
    DirectoryRecord {
        slug: slug.to_string(),
        name: name.to_string(),
        ..Default::default()
    }
}

fn foo_duplicates() -> Vec<StoreRecord> {
    let mut described = StoreRecord::new("rec1", "Foo Protocol");
    described.short_description = Some("Lending for everyone".to_string());
    described.tvl_usd = Some(500.0);

    let mut canonical = StoreRecord::new("rec2", "Foo");
    canonical.analytics_id = Some("foo".to_string());
    canonical.tvl_usd = Some(1000.0);
    canonical.status = PublishStatus::Published;

    vec![described, canonical]
}

// ============================================================================
// Dedupe
// ============================================================================

#[tokio::test]
async fn test_dedupe_merges_before_deleting() {
    let store = Arc::new(
        InMemoryRecordStore::new()
            .with_records("dapp", foo_duplicates())
            .with_record("dapp", StoreRecord::new("rec3", "Bar")),
    );
    let summary = service(store.clone()).dedupe().await.unwrap();

    assert_eq!(summary.merged, 1);
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.failed, 0);

    let survivor = store.record("rec2").await.unwrap();
    assert_eq!(survivor.short_description.as_deref(), Some("Lending for everyone"));
    assert_eq!(survivor.tvl_usd, Some(1000.0));
    assert!(survivor.is_published());
    assert!(store.record("rec1").await.is_none());
    assert!(store.record("rec3").await.is_some());

    let calls = store.calls().await;
    assert_eq!(
        calls,
        vec![
            StoreCall::List("dapp".to_string()),
            StoreCall::Update("rec2".to_string()),
            StoreCall::Publish("rec2".to_string()),
            StoreCall::Destroy("rec1".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_dedupe_is_idempotent() {
    let store = Arc::new(InMemoryRecordStore::new().with_records("dapp", foo_duplicates()));
    let service = service(store.clone());

    service.dedupe().await.unwrap();
    let second = service.dedupe().await.unwrap();

    assert_eq!(second.merged, 0);
    assert_eq!(second.deleted, 0);
    assert_eq!(store.records_of("dapp").await.len(), 1);
}

#[tokio::test]
async fn test_failed_delete_does_not_stop_other_groups() {
    let mut strong_baz = StoreRecord::new("rec3", "Baz");
    strong_baz.tvl_usd = Some(42.0);
    let store = Arc::new(
        InMemoryRecordStore::new()
            .with_records("dapp", foo_duplicates())
            .with_record("dapp", strong_baz)
            .with_record("dapp", StoreRecord::new("rec4", "Baz DAO"))
            .with_failing_destroy("rec1"),
    );
    let summary = service(store.clone()).dedupe().await.unwrap();

    assert_eq!(summary.merged, 2);
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.errors.len(), 1);
    assert!(store.record("rec1").await.is_some());
    assert!(store.record("rec4").await.is_none());
}

#[tokio::test]
async fn test_failed_merge_keeps_losers() {
    let store = Arc::new(
        InMemoryRecordStore::new()
            .with_records("dapp", foo_duplicates())
            .with_failing_update("rec2"),
    );
    let summary = service(store.clone()).dedupe().await.unwrap();

    assert_eq!(summary.merged, 0);
    assert_eq!(summary.deleted, 0);
    assert_eq!(summary.failed, 1);
    assert!(store.record("rec1").await.is_some());
    assert!(!store
        .calls()
        .await
        .iter()
        .any(|c| matches!(c, StoreCall::Destroy(_))));
}

#[tokio::test]
async fn test_store_listing_failure_is_fatal() {
    let store = Arc::new(InMemoryRecordStore::new().with_failing_list("dapp"));
    let result = service(store).run_all().await;
    assert!(matches!(result, Err(SyncError::StoreUnavailable(_))));
}

#[tokio::test]
async fn test_dry_run_makes_no_mutations() {
    let store = Arc::new(InMemoryRecordStore::new().with_records("dapp", foo_duplicates()));
    let config = SyncConfig {
        dry_run: true,
        ..test_config()
    };
    let service = service_with(
        config,
        store.clone(),
        StaticDirectory::single_page(vec![dapp("new-thing", "New Thing")]),
        StaticAnalytics::new(Vec::new()),
    );

    let summary = service.run_all().await.unwrap();
    assert_eq!(summary.merged, 1);
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.created, 1);
    assert_eq!(store.mutation_count().await, 0);
    assert_eq!(store.records_of("dapp").await.len(), 2);
}

// ============================================================================
// Import
// ============================================================================

#[tokio::test]
async fn test_import_creates_missing_and_detects_collisions() {
    let store = Arc::new(InMemoryRecordStore::new().with_record("dapp", StoreRecord::new("rec1", "Uniswap")));
    let mut aave = dapp("aave-v3", "Aave V3");
    aave.chains = vec!["Arbitrum".to_string()];
    let directory = StaticDirectory::new(vec![
        vec![dapp("uniswap", "Uniswap"), aave],
        vec![dapp("curve-finance", "Curve Finance"), dapp("curve", "Curve")],
    ]);
    let service = service_with(test_config(), store.clone(), directory, StaticAnalytics::new(Vec::new()));

    let summary = service.import().await.unwrap();
    assert_eq!(summary.created, 2);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.failed, 0);

    let records = store.records_of("dapp").await;
    assert_eq!(records.len(), 3);
    let imported = records.iter().find(|r| r.title == "Aave V3").unwrap();
    assert_eq!(imported.slug.as_deref(), Some("aave-v3"));
    assert_eq!(imported.chains, vec![ChainRef::Name("Arbitrum One".to_string())]);
    assert!(imported.directory_enrichment.is_some());
    assert!(imported.is_published());
}

// ============================================================================
// Enrich
// ============================================================================

fn uniswap_sources() -> (StaticDirectory, StaticAnalytics) {
    let mut listed = dapp("uniswap", "Uniswap");
    listed.chains = vec!["Base".to_string()];
    listed.links = Links {
        website: Some("https://app.uniswap.org".to_string()),
        ..Default::default()
    };
    listed.featured = true;

    let protocol = AnalyticsRecord {
        id: "1".to_string(),
        name: "Uniswap".to_string(),
        slug: Some("uniswap".to_string()),
        category: Some("Dexes".to_string()),
        tvl_usd: Some(5e9),
        chain_tvl: BTreeMap::from([
            ("Ethereum".to_string(), 4e9),
            ("Base".to_string(), 1e9),
            ("Ethereum-staking".to_string(), 1.0),
        ]),
        twitter: Some("Uniswap".to_string()),
        ..Default::default()
    };

    (
        StaticDirectory::single_page(vec![listed]),
        StaticAnalytics::new(vec![protocol]),
    )
}

fn uniswap_store() -> InMemoryRecordStore {
    let mut record = StoreRecord::new("rec1", "Uniswap");
    record.chains = vec![ChainRef::Reference { id: "c1".to_string() }];
    record.status = PublishStatus::Published;
    InMemoryRecordStore::new()
        .with_record("dapp", record)
        .with_record("chain", StoreRecord::new("c1", "Ethereum"))
}

fn stored_metadata(record: &StoreRecord) -> Value {
    serde_json::from_str(record.unified_metadata.as_deref().unwrap()).unwrap()
}

#[tokio::test]
async fn test_enrich_writes_unified_metadata() {
    let store = Arc::new(uniswap_store());
    let (directory, analytics) = uniswap_sources();
    let service = service_with(test_config(), store.clone(), directory, analytics);

    let summary = service.enrich().await.unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.failed, 0);

    let record = store.record("rec1").await.unwrap();
    assert_eq!(record.tvl_usd, Some(5e9));
    assert_eq!(record.analytics_id.as_deref(), Some("1"));
    assert!(record.last_synced_at.is_some());
    assert_eq!(record.status, PublishStatus::Published);

    let meta = stored_metadata(&record);
    assert_eq!(meta["name"], "Uniswap");
    assert_eq!(meta["tvlUsd"], 5e9);
    assert_eq!(meta["isDefiProtocol"], true);
    assert_eq!(meta["websiteUrl"], "https://app.uniswap.org");
    assert_eq!(meta["twitterUrl"], "https://twitter.com/Uniswap");
    assert_eq!(meta["featured"], true);
    assert_eq!(meta["sources"]["tvlUsd"], "analytics");

    let chains: Vec<&str> = meta["chains"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(chains.contains(&"Ethereum"));
    assert!(chains.contains(&"Base"));
    assert!(!chains.iter().any(|c| c.contains("staking")));
    assert!(meta["chainTvl"].get("Ethereum-staking").is_none());
}

#[tokio::test]
async fn test_enrich_falls_back_to_listings_when_details_fail() {
    let store = Arc::new(uniswap_store());
    let (directory, analytics) = uniswap_sources();
    let service = service_with(
        test_config(),
        store.clone(),
        directory.with_failing_details(),
        analytics.with_failing_details(),
    );

    let summary = service.enrich().await.unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.skipped, 0);

    let meta = stored_metadata(&store.record("rec1").await.unwrap());
    assert_eq!(meta["tvlUsd"], 5e9);
    assert_eq!(meta["featured"], true);
    assert_eq!(meta["websiteUrl"], "https://app.uniswap.org");
}

#[tokio::test]
async fn test_enrich_skips_unchanged_records() {
    let store = Arc::new(uniswap_store());
    let (directory, analytics) = uniswap_sources();
    let service = service_with(test_config(), store.clone(), directory, analytics);

    service.enrich().await.unwrap();
    let second = service.enrich().await.unwrap();

    assert_eq!(second.updated, 0);
    assert_eq!(second.skipped, 1);
}

#[tokio::test]
async fn test_enrich_replaces_malformed_blob() {
    let mut record = StoreRecord::new("rec1", "Uniswap");
    record.unified_metadata = Some("{\"name\": ".to_string());
    let store = Arc::new(InMemoryRecordStore::new().with_record("dapp", record));
    let (directory, analytics) = uniswap_sources();
    let service = service_with(test_config(), store.clone(), directory, analytics);

    let summary = service.enrich().await.unwrap();
    assert_eq!(summary.updated, 1);
    let meta = stored_metadata(&store.record("rec1").await.unwrap());
    assert_eq!(meta["name"], "Uniswap");
}

#[tokio::test]
async fn test_enrich_minimal_mode_drops_chain_tvl() {
    let store = Arc::new(uniswap_store());
    let (directory, analytics) = uniswap_sources();
    let mut config = test_config();
    config.metadata.mode = MetadataMode::Minimal;
    let service = service_with(config, store.clone(), directory, analytics);

    service.enrich().await.unwrap();
    let meta = stored_metadata(&store.record("rec1").await.unwrap());
    assert!(meta.get("chainTvl").is_none());
    assert!(meta["sources"].get("chainTvl").is_none());
}

#[tokio::test]
async fn test_enrich_skips_records_over_budget() {
    let store = Arc::new(uniswap_store());
    let (directory, analytics) = uniswap_sources();
    let mut config = test_config();
    config.metadata.budget_bytes = 10;
    let service = service_with(config, store.clone(), directory, analytics);

    let summary = service.enrich().await.unwrap();
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.errors.len(), 1);
    assert!(store.record("rec1").await.unwrap().unified_metadata.is_none());
}

#[tokio::test]
async fn test_enrich_ignores_excluded_analytics_categories() {
    let store = Arc::new(InMemoryRecordStore::new().with_record("dapp", StoreRecord::new("rec1", "Binance")));
    let exchange = AnalyticsRecord {
        id: "270".to_string(),
        name: "Binance".to_string(),
        category: Some("CEX".to_string()),
        tvl_usd: Some(1e11),
        ..Default::default()
    };
    let service = service_with(
        test_config(),
        store.clone(),
        StaticDirectory::new(Vec::new()),
        StaticAnalytics::new(vec![exchange]),
    );

    service.enrich().await.unwrap();
    let record = store.record("rec1").await.unwrap();
    assert_eq!(record.tvl_usd, None);
    assert!(stored_metadata(&record).get("tvlUsd").is_none());
}

// ============================================================================
// Rank
// ============================================================================

#[tokio::test]
async fn test_rank_orders_unmatched_last() {
    let with_chains = |id: &str, title: &str, chains: &[&str]| {
        let mut record = StoreRecord::new(id, title);
        record.chains = chains.iter().map(|c| ChainRef::Name(c.to_string())).collect();
        record
    };
    let store = Arc::new(InMemoryRecordStore::new().with_records(
        "dapp",
        vec![
            with_chains("r1", "Zeta", &["Solana"]),
            with_chains("r2", "NoChain", &[]),
            with_chains("r3", "Beta", &["Base", "Ethereum"]),
            with_chains("r4", "Alpha", &["Ethereum"]),
        ],
    ));

    let ranked = service(store).rank().await.unwrap();
    let titles: Vec<&str> = ranked.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Alpha", "Beta", "Zeta", "NoChain"]);
    assert_eq!(ranked[0].priority, Some(1));
    assert_eq!(ranked[1].chains, vec!["Base", "Ethereum"]);
    assert_eq!(ranked[1].priority, Some(1));
    assert_eq!(ranked[1].category.as_deref(), Some("L1"));
    assert_eq!(ranked[3].priority, None);
    assert_eq!(ranked[3].category, None);
}
