//! Unified metadata: the single output object per canonical dapp.
//!
//! The object is sparse. Absent values are omitted from the JSON entirely
//! and every present field has exactly one entry in `sources`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Description cap in full mode (characters).
pub const FULL_DESCRIPTION_CHARS: usize = 3000;
/// Description cap in minimal mode (characters).
pub const MINIMAL_DESCRIPTION_CHARS: usize = 500;

const ELLIPSIS: &str = "...";

/// Fields counted by the completeness score, as JSON keys.
pub const COMPLETENESS_FIELDS: [&str; 10] = [
    "name",
    "slug",
    "description",
    "logoUrl",
    "tvlUsd",
    "categories",
    "chains",
    "websiteUrl",
    "twitterUrl",
    "githubUrl",
];

/// Which provider(s) supplied a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum FieldSource {
    Store,
    Directory,
    Analytics,
    /// Two or more providers contributed
    Both,
}

impl FieldSource {
    /// Combine two contributions to the same field.
    pub fn combine(self, other: FieldSource) -> FieldSource {
        if self == other {
            self
        } else {
            FieldSource::Both
        }
    }

    /// Fold a set of contributions. `None` when nothing contributed.
    pub fn fold<I: IntoIterator<Item = FieldSource>>(sources: I) -> Option<FieldSource> {
        sources.into_iter().reduce(FieldSource::combine)
    }
}

/// Output size profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataMode {
    /// Everything, descriptions up to 3000 characters
    #[default]
    Full,
    /// Descriptions up to 500 characters, no per-chain TVL breakdown
    Minimal,
}

impl MetadataMode {
    /// Maximum description length in characters.
    pub fn description_cap(self) -> usize {
        match self {
            MetadataMode::Full => FULL_DESCRIPTION_CHARS,
            MetadataMode::Minimal => MINIMAL_DESCRIPTION_CHARS,
        }
    }
}

/// Derived quality indicators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct DataQuality {
    /// Percentage (0-100) of [`COMPLETENESS_FIELDS`] that are non-empty
    pub completeness_score: u8,
}

/// The reconciled record for one dapp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct UnifiedMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvl_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvl_change_1h: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvl_change_1d: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvl_change_7d: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub chain_tvl: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_defi_protocol: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_price_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap_usd: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,

    pub data_quality: DataQuality,
    /// Provenance per present field, keyed by JSON field name
    #[serde(default)]
    pub sources: BTreeMap<String, FieldSource>,
}

impl UnifiedMetadata {
    /// Record which provider supplied `field`.
    pub fn attribute(&mut self, field: &str, source: FieldSource) {
        self.sources.insert(field.to_string(), source);
    }

    /// JSON keys of the fields that carry a value.
    pub fn present_fields(&self) -> BTreeSet<String> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map
                .into_iter()
                .filter(|(key, value)| {
                    key != "sources" && key != "dataQuality" && !is_empty_value(value)
                })
                .map(|(key, _)| key)
                .collect(),
            _ => BTreeSet::new(),
        }
    }

    /// Fields whose presence and provenance disagree.
    ///
    /// Empty when every present field is attributed and every attribution
    /// points at a present field.
    pub fn provenance_mismatches(&self) -> Vec<String> {
        let present = self.present_fields();
        let attributed: BTreeSet<String> = self.sources.keys().cloned().collect();
        present
            .symmetric_difference(&attributed)
            .cloned()
            .collect()
    }

    /// Drop attributions for absent fields and recompute the quality score.
    pub fn finalize(&mut self) {
        let present = self.present_fields();
        self.sources.retain(|field, _| present.contains(field));
        self.data_quality.completeness_score = completeness_score(&present);
    }
}

/// Percentage of the completeness checklist present, rounded.
pub fn completeness_score(present: &BTreeSet<String>) -> u8 {
    let filled = COMPLETENESS_FIELDS
        .iter()
        .filter(|field| present.contains(**field))
        .count();
    ((filled as f64 / COMPLETENESS_FIELDS.len() as f64) * 100.0).round() as u8
}

fn is_empty_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Array(a) => a.is_empty(),
        serde_json::Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Truncate to at most `max_chars` characters, ending in `...` when cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.truncate(out.trim_end().len());
    out.push_str(ELLIPSIS);
    out
}

/// Remove a trailing ellipsis left by an earlier truncation.
pub(crate) fn strip_ellipsis(text: &str) -> &str {
    text.strip_suffix(ELLIPSIS).unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_source_fold() {
        assert_eq!(FieldSource::fold([]), None);
        assert_eq!(
            FieldSource::fold([FieldSource::Store, FieldSource::Store]),
            Some(FieldSource::Store)
        );
        assert_eq!(
            FieldSource::fold([FieldSource::Directory, FieldSource::Analytics]),
            Some(FieldSource::Both)
        );
    }

    #[test]
    fn test_sparse_serialization() {
        let meta = UnifiedMetadata {
            name: Some("Foo".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&meta).unwrap();
        let obj = json.as_object().unwrap();
        assert!(obj.contains_key("name"));
        assert!(!obj.contains_key("websiteUrl"));
        assert!(!obj.contains_key("chains"));
        assert!(!obj.contains_key("chainTvl"));
    }

    #[test]
    fn test_finalize_prunes_orphans_and_scores() {
        let mut meta = UnifiedMetadata {
            name: Some("Foo".to_string()),
            chains: vec!["Base".to_string()],
            ..Default::default()
        };
        meta.attribute("name", FieldSource::Store);
        meta.attribute("chains", FieldSource::Directory);
        meta.attribute("websiteUrl", FieldSource::Directory);
        assert_eq!(meta.provenance_mismatches(), vec!["websiteUrl"]);

        meta.finalize();
        assert!(meta.provenance_mismatches().is_empty());
        assert_eq!(meta.data_quality.completeness_score, 20);
    }

    #[test]
    fn test_unattributed_value_is_reported() {
        let meta = UnifiedMetadata {
            tvl_usd: Some(5.0),
            ..Default::default()
        };
        assert_eq!(meta.provenance_mismatches(), vec!["tvlUsd"]);
    }

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("short", 10), "short");
        assert_eq!(truncate_with_ellipsis("abcdefghij", 8), "abcde...");
        assert_eq!(truncate_with_ellipsis("abc  defgh", 8), "abc...");
        assert_eq!(truncate_with_ellipsis("ééééé", 4), "é...");
        assert_eq!(strip_ellipsis("abc..."), "abc");
    }

    #[test]
    fn test_mode_caps() {
        assert_eq!(MetadataMode::Full.description_cap(), 3000);
        assert_eq!(MetadataMode::Minimal.description_cap(), 500);
    }
}
