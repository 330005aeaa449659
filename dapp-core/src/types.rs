//! Record model for the three upstream sources.
//!
//! Each source has its own explicit shape; [`RawSourceRecord`] tags them by
//! provenance so nothing downstream has to probe a catch-all object.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which upstream a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Hand-curated record store
    Store,
    /// Third-party dapp directory
    Directory,
    /// DeFi analytics provider
    Analytics,
}

/// Publication state of a store record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    #[default]
    Draft,
    Changed,
    Published,
    Archived,
}

/// A chain reference as stored on a store record.
///
/// Store payloads mix plain names, embedded objects and links to chain
/// entries by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChainRef {
    /// Plain chain name
    Name(String),
    /// Embedded chain object
    Object {
        #[serde(alias = "title")]
        name: String,
    },
    /// Opaque link to a chain entry in the store
    Reference { id: String },
}

impl ChainRef {
    /// The chain name, if this reference carries one directly.
    pub fn name(&self) -> Option<&str> {
        match self {
            ChainRef::Name(name) | ChainRef::Object { name } => Some(name.as_str()),
            ChainRef::Reference { .. } => None,
        }
    }
}

/// Per-kind external links.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Links {
    pub website: Option<String>,
    pub twitter: Option<String>,
    pub github: Option<String>,
    pub discord: Option<String>,
    pub docs: Option<String>,
}

/// A persisted record from the curated store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRecord {
    /// Store-assigned identifier
    pub id: String,
    /// Display title, the record's identity name
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    /// Store-hosted logo asset
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub chains: Vec<ChainRef>,
    #[serde(default)]
    pub defi_category: Option<String>,
    /// Analytics provider protocol identifier
    #[serde(default)]
    pub analytics_id: Option<String>,
    #[serde(default)]
    pub tvl_usd: Option<f64>,
    #[serde(default)]
    pub token_price_usd: Option<f64>,
    /// Raw directory enrichment blob kept from an earlier sync
    #[serde(default)]
    pub directory_enrichment: Option<serde_json::Value>,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: PublishStatus,
    /// Serialized unified metadata written by the previous run
    #[serde(default)]
    pub unified_metadata: Option<String>,
}

impl StoreRecord {
    /// Create a draft record.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    /// Chain names carried directly on the record.
    pub fn chain_names(&self) -> Vec<String> {
        self.chains
            .iter()
            .filter_map(ChainRef::name)
            .map(str::to_string)
            .collect()
    }

    /// Replace id references with names from `lookup`. Unknown ids are dropped.
    ///
    /// Returns the ids that could not be resolved.
    pub fn resolve_chain_refs(&mut self, lookup: &HashMap<String, String>) -> Vec<String> {
        let mut unresolved = Vec::new();
        let mut resolved = Vec::with_capacity(self.chains.len());
        for chain in self.chains.drain(..) {
            match chain {
                ChainRef::Reference { id } => match lookup.get(&id) {
                    Some(name) => resolved.push(ChainRef::Name(name.clone())),
                    None => unresolved.push(id),
                },
                other => resolved.push(other),
            }
        }
        self.chains = resolved;
        unresolved
    }

    /// Whether the record is live.
    pub fn is_published(&self) -> bool {
        self.status == PublishStatus::Published
    }
}

/// Partial store update. `None` fields are left untouched by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chains: Option<Vec<ChainRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defi_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvl_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_price_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory_enrichment: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unified_metadata: Option<String>,
}

impl StorePatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the patch to an in-memory record.
    pub fn apply_to(&self, record: &mut StoreRecord) {
        if let Some(v) = &self.title {
            record.title = v.clone();
        }
        if let Some(v) = &self.slug {
            record.slug = Some(v.clone());
        }
        if let Some(v) = &self.short_description {
            record.short_description = Some(v.clone());
        }
        if let Some(v) = &self.logo_url {
            record.logo_url = Some(v.clone());
        }
        if let Some(v) = &self.chains {
            record.chains = v.clone();
        }
        if let Some(v) = &self.defi_category {
            record.defi_category = Some(v.clone());
        }
        if let Some(v) = &self.analytics_id {
            record.analytics_id = Some(v.clone());
        }
        if let Some(v) = self.tvl_usd {
            record.tvl_usd = Some(v);
        }
        if let Some(v) = self.token_price_usd {
            record.token_price_usd = Some(v);
        }
        if let Some(v) = &self.directory_enrichment {
            record.directory_enrichment = Some(v.clone());
        }
        if let Some(v) = self.last_synced_at {
            record.last_synced_at = Some(v);
        }
        if let Some(v) = &self.unified_metadata {
            record.unified_metadata = Some(v.clone());
        }
    }
}

/// A dapp as listed by the third-party directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryRecord {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub long_description: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub chains: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub links: Links,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub verified: bool,
}

/// A protocol as reported by the DeFi analytics provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRecord {
    /// Provider protocol identifier
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub chains: Vec<String>,
    #[serde(default)]
    pub tvl_usd: Option<f64>,
    /// Per-chain TVL breakdown keyed by the provider's chain names
    #[serde(default)]
    pub chain_tvl: BTreeMap<String, f64>,
    #[serde(default)]
    pub change_1h: Option<f64>,
    #[serde(default)]
    pub change_1d: Option<f64>,
    #[serde(default)]
    pub change_7d: Option<f64>,
    #[serde(default)]
    pub token_symbol: Option<String>,
    #[serde(default)]
    pub token_price_usd: Option<f64>,
    #[serde(default)]
    pub market_cap_usd: Option<f64>,
    #[serde(default)]
    pub url: Option<String>,
    /// Twitter handle or URL
    #[serde(default)]
    pub twitter: Option<String>,
    /// GitHub organisations or URLs
    #[serde(default)]
    pub github: Vec<String>,
}

/// A record as it arrives from one source, tagged by provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provenanceSource", rename_all = "lowercase")]
pub enum RawSourceRecord {
    Store(StoreRecord),
    Directory(DirectoryRecord),
    Analytics(AnalyticsRecord),
}

impl RawSourceRecord {
    /// Which source produced this record.
    pub fn provenance(&self) -> Provenance {
        match self {
            RawSourceRecord::Store(_) => Provenance::Store,
            RawSourceRecord::Directory(_) => Provenance::Directory,
            RawSourceRecord::Analytics(_) => Provenance::Analytics,
        }
    }

    /// The name the record identifies itself by.
    pub fn identity_name(&self) -> &str {
        match self {
            RawSourceRecord::Store(r) => &r.title,
            RawSourceRecord::Directory(r) => &r.name,
            RawSourceRecord::Analytics(r) => &r.name,
        }
    }
}

/// Returns the trimmed string when it is non-empty.
pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Returns the value when it is finite and strictly positive.
pub(crate) fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_ref_shapes_deserialize() {
        let json = r#"{"id":"r1","title":"Foo","chains":["Ethereum",{"name":"Base"},{"title":"Scroll"},{"id":"c9"}]}"#;
        let record: StoreRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.chains.len(), 4);
        assert_eq!(record.chain_names(), vec!["Ethereum", "Base", "Scroll"]);
        assert_eq!(record.chains[3], ChainRef::Reference { id: "c9".to_string() });
    }

    #[test]
    fn test_resolve_chain_refs() {
        let mut record = StoreRecord::new("r1", "Foo");
        record.chains = vec![
            ChainRef::Reference { id: "c1".to_string() },
            ChainRef::Name("Base".to_string()),
            ChainRef::Reference { id: "missing".to_string() },
        ];
        let lookup = HashMap::from([("c1".to_string(), "Ethereum".to_string())]);

        let unresolved = record.resolve_chain_refs(&lookup);
        assert_eq!(unresolved, vec!["missing"]);
        assert_eq!(record.chain_names(), vec!["Ethereum", "Base"]);
    }

    #[test]
    fn test_patch_apply_and_empty() {
        let mut record = StoreRecord::new("r1", "Foo");
        let patch = StorePatch {
            tvl_usd: Some(10.0),
            short_description: Some("A dapp".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
        assert!(StorePatch::default().is_empty());

        patch.apply_to(&mut record);
        assert_eq!(record.tvl_usd, Some(10.0));
        assert_eq!(record.short_description.as_deref(), Some("A dapp"));
        assert_eq!(record.title, "Foo");
    }

    #[test]
    fn test_patch_serializes_sparse() {
        let patch = StorePatch {
            analytics_id: Some("aave".to_string()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&patch).unwrap(), r#"{"analyticsId":"aave"}"#);
    }

    #[test]
    fn test_raw_record_tagging() {
        let raw = RawSourceRecord::Directory(DirectoryRecord {
            slug: "arbitrum".to_string(),
            name: "Arbitrum".to_string(),
            ..Default::default()
        });
        assert_eq!(raw.provenance(), Provenance::Directory);
        assert_eq!(raw.identity_name(), "Arbitrum");

        let json = serde_json::to_value(&raw).unwrap();
        assert_eq!(json["provenanceSource"], "directory");
        let back: RawSourceRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_value_helpers() {
        assert_eq!(non_empty(Some("  x ")), Some("x"));
        assert_eq!(non_empty(Some("   ")), None);
        assert_eq!(positive(Some(0.0)), None);
        assert_eq!(positive(Some(f64::NAN)), None);
        assert_eq!(positive(Some(3.5)), Some(3.5));
    }
}
