//! Duplicate detection and canonical-record selection.
//!
//! Store records are grouped by [`identity_key`]. Within a group every
//! record is scored, the best one survives as canonical and the rest are
//! merged into it (fill-only) before the caller deletes them.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::debug;

use crate::normalize::identity_key;
use crate::types::{non_empty, positive, StorePatch, StoreRecord};

// ============================================================================
// Scoring
// ============================================================================

pub const SCORE_DESCRIPTION: u32 = 10;
pub const SCORE_ANALYTICS_ID: u32 = 20;
pub const SCORE_TVL: u32 = 30;
pub const SCORE_DEFI_CATEGORY: u32 = 10;
pub const SCORE_DIRECTORY_ENRICHMENT: u32 = 20;
pub const SCORE_LAST_SYNCED: u32 = 10;
pub const SCORE_TOKEN_PRICE: u32 = 10;
pub const SCORE_PUBLISHED: u32 = 15;

/// Additive completeness score used to pick the canonical record.
pub fn score(record: &StoreRecord) -> u32 {
    let mut total = 0;
    if non_empty(record.short_description.as_deref()).is_some() {
        total += SCORE_DESCRIPTION;
    }
    if non_empty(record.analytics_id.as_deref()).is_some() {
        total += SCORE_ANALYTICS_ID;
    }
    if positive(record.tvl_usd).is_some() {
        total += SCORE_TVL;
    }
    if non_empty(record.defi_category.as_deref()).is_some() {
        total += SCORE_DEFI_CATEGORY;
    }
    if has_enrichment(record) {
        total += SCORE_DIRECTORY_ENRICHMENT;
    }
    if record.last_synced_at.is_some() {
        total += SCORE_LAST_SYNCED;
    }
    if record.token_price_usd.is_some_and(f64::is_finite) {
        total += SCORE_TOKEN_PRICE;
    }
    if record.is_published() {
        total += SCORE_PUBLISHED;
    }
    total
}

fn has_enrichment(record: &StoreRecord) -> bool {
    match &record.directory_enrichment {
        None | Some(serde_json::Value::Null) => false,
        Some(serde_json::Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

/// Digit-aware identifier ordering: digit runs compare by numeric value.
///
/// `"rec100"` sorts after `"rec99"`. Identifiers without digits compare
/// lexicographically.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let ln = take_digits(&mut left);
                let rn = take_digits(&mut right);
                let ordering = ln.len().cmp(&rn.len()).then_with(|| ln.cmp(&rn));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(l), Some(r)) => {
                if l != r {
                    return l.cmp(&r);
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
        digits.push(c);
        chars.next();
    }
    let trimmed = digits.trim_start_matches('0');
    trimmed.to_string()
}

// ============================================================================
// Groups
// ============================================================================

/// A scored member of a duplicate group.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: StoreRecord,
    pub score: u32,
}

/// Records sharing one identity key, ranked best first.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    /// Normalized identity key
    pub key: String,
    /// Members ranked by score, then identifier; the first is canonical
    pub members: Vec<ScoredRecord>,
}

/// Result of folding losers into the canonical record.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Canonical record with merged fields applied
    pub record: StoreRecord,
    /// Fields the store must write before any loser is deleted
    pub patch: StorePatch,
}

impl DuplicateGroup {
    /// The surviving record.
    pub fn canonical(&self) -> &StoreRecord {
        &self.members[0].record
    }

    /// Records to delete after the merge is written.
    pub fn losers(&self) -> impl Iterator<Item = &StoreRecord> {
        self.members.iter().skip(1).map(|m| &m.record)
    }

    /// Whether the group actually contains duplicates.
    pub fn is_duplicate(&self) -> bool {
        self.members.len() > 1
    }

    /// Fill fields the canonical record is missing from the losers.
    ///
    /// Never overwrites a present canonical value. Losers are visited in
    /// rank order, so the best loser fills text fields first. A missing TVL
    /// takes the largest positive TVL among all losers.
    pub fn merge(&self) -> MergeOutcome {
        let mut record = self.canonical().clone();
        let mut patch = StorePatch::default();

        if positive(record.tvl_usd).is_none() {
            let best = self
                .losers()
                .filter_map(|loser| positive(loser.tvl_usd).map(|tvl| (loser, tvl)))
                .fold(None::<(&StoreRecord, f64)>, |best, (loser, tvl)| match best {
                    Some((_, current)) if current >= tvl => best,
                    _ => Some((loser, tvl)),
                });
            if let Some((loser, tvl)) = best {
                debug!(canonical = %record.id, from = %loser.id, tvl, "Merging TVL");
                record.tvl_usd = Some(tvl);
                patch.tvl_usd = Some(tvl);
            }
        }

        for loser in self.losers() {
            if non_empty(record.short_description.as_deref()).is_none() {
                if let Some(description) = non_empty(loser.short_description.as_deref()) {
                    debug!(canonical = %record.id, from = %loser.id, "Merging description");
                    record.short_description = Some(description.to_string());
                    patch.short_description = Some(description.to_string());
                }
            }

            if !has_enrichment(&record) && has_enrichment(loser) {
                debug!(canonical = %record.id, from = %loser.id, "Merging directory enrichment");
                record.directory_enrichment = loser.directory_enrichment.clone();
                patch.directory_enrichment = loser.directory_enrichment.clone();
            }
        }

        MergeOutcome { record, patch }
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Groups store records and picks one canonical survivor per group.
#[derive(Debug, Clone, Default)]
pub struct DuplicateResolver;

impl DuplicateResolver {
    /// Create a resolver.
    pub fn new() -> Self {
        Self
    }

    /// Group records by identity key and rank each group.
    ///
    /// Pure and deterministic: groups come out ordered by key and members
    /// by (score desc, identifier desc), so re-running on the same input
    /// selects the same canonical records. Records whose title normalizes
    /// to nothing are never grouped with anything.
    pub fn group_and_resolve(&self, records: &[StoreRecord]) -> Vec<DuplicateGroup> {
        let mut buckets: BTreeMap<String, Vec<ScoredRecord>> = BTreeMap::new();
        let mut ungrouped: Vec<DuplicateGroup> = Vec::new();

        for record in records {
            let scored = ScoredRecord {
                score: score(record),
                record: record.clone(),
            };
            let key = identity_key(&record.title);
            if key.is_empty() {
                ungrouped.push(DuplicateGroup {
                    key,
                    members: vec![scored],
                });
            } else {
                buckets.entry(key).or_default().push(scored);
            }
        }

        let mut groups: Vec<DuplicateGroup> = buckets
            .into_iter()
            .map(|(key, mut members)| {
                members.sort_by(rank);
                if members.len() > 1 {
                    debug!(
                        key = %key,
                        canonical = %members[0].record.id,
                        size = members.len(),
                        "Duplicate group resolved"
                    );
                }
                DuplicateGroup { key, members }
            })
            .collect();

        ungrouped.sort_by(|a, b| compare_ids(&a.canonical().id, &b.canonical().id));
        groups.extend(ungrouped);
        groups
    }
}

/// Best first: higher score, then larger identifier.
fn rank(a: &ScoredRecord, b: &ScoredRecord) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| compare_ids(&b.record.id, &a.record.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PublishStatus;
    use chrono::Utc;

    fn record(id: &str, title: &str) -> StoreRecord {
        StoreRecord::new(id, title)
    }

    #[test]
    fn test_score_components() {
        let mut r = record("r1", "Foo");
        assert_eq!(score(&r), 0);

        r.short_description = Some("desc".to_string());
        r.analytics_id = Some("foo".to_string());
        r.tvl_usd = Some(1.0);
        r.defi_category = Some("Dexes".to_string());
        r.directory_enrichment = Some(serde_json::json!({"slug": "foo"}));
        r.last_synced_at = Some(Utc::now());
        r.token_price_usd = Some(0.5);
        r.status = PublishStatus::Published;
        assert_eq!(score(&r), 10 + 20 + 30 + 10 + 20 + 10 + 10 + 15);
    }

    #[test]
    fn test_score_ignores_empty_values() {
        let mut r = record("r1", "Foo");
        r.short_description = Some("   ".to_string());
        r.tvl_usd = Some(0.0);
        r.directory_enrichment = Some(serde_json::json!({}));
        assert_eq!(score(&r), 0);
    }

    #[test]
    fn test_compare_ids() {
        assert_eq!(compare_ids("rec100", "rec99"), Ordering::Greater);
        assert_eq!(compare_ids("abc", "abd"), Ordering::Less);
        assert_eq!(compare_ids("a2b", "a2b"), Ordering::Equal);
        assert_eq!(compare_ids("a02", "a2"), Ordering::Less);
        assert_eq!(compare_ids("rec", "rec1"), Ordering::Less);
    }

    #[test]
    fn test_grouping_strips_business_suffixes() {
        let records = vec![
            record("1", "Foo Protocol"),
            record("2", "Foo"),
            record("3", "Bar Finance"),
        ];
        let groups = DuplicateResolver::new().group_and_resolve(&records);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "bar");
        assert_eq!(groups[1].key, "foo");
        assert!(groups[1].is_duplicate());
        assert!(!groups[0].is_duplicate());
    }

    #[test]
    fn test_free_text_names_are_not_containment_matched() {
        let records = vec![record("1", "Uniswap"), record("2", "Uniswap X")];
        let groups = DuplicateResolver::new().group_and_resolve(&records);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_highest_score_is_canonical() {
        let mut rich = record("a1", "Foo");
        rich.tvl_usd = Some(10.0);
        let records = vec![rich, record("z9", "Foo DAO")];
        let groups = DuplicateResolver::new().group_and_resolve(&records);
        assert_eq!(groups[0].canonical().id, "a1");
        assert_eq!(groups[0].losers().count(), 1);
    }

    #[test]
    fn test_tie_break_prefers_larger_id() {
        let records = vec![record("rec99", "Foo"), record("rec100", "Foo")];
        let groups = DuplicateResolver::new().group_and_resolve(&records);
        assert_eq!(groups[0].canonical().id, "rec100");
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut a = record("rec7", "Foo Network");
        a.status = PublishStatus::Published;
        let mut b = record("rec8", "foo");
        b.defi_category = Some("Dexes".to_string());
        b.last_synced_at = Some(Utc::now());
        let records = vec![a, b, record("rec9", "The Foo"), record("x", "Bar")];

        let resolver = DuplicateResolver::new();
        let first = resolver.group_and_resolve(&records);
        let second = resolver.group_and_resolve(&records);
        assert_eq!(first, second);

        let mut reversed = records.clone();
        reversed.reverse();
        let third = resolver.group_and_resolve(&reversed);
        let ids = |groups: &[DuplicateGroup]| {
            groups
                .iter()
                .map(|g| g.canonical().id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&third));
    }

    #[test]
    fn test_merge_is_fill_only() {
        let mut canonical = record("rec2", "Foo");
        canonical.tvl_usd = Some(1000.0);
        canonical.status = PublishStatus::Published;
        let mut loser = record("rec1", "Foo");
        loser.tvl_usd = Some(500.0);
        loser.short_description = Some("From the loser".to_string());

        let groups = DuplicateResolver::new().group_and_resolve(&[canonical, loser]);
        let outcome = groups[0].merge();

        assert_eq!(outcome.record.id, "rec2");
        assert_eq!(outcome.record.tvl_usd, Some(1000.0));
        assert_eq!(outcome.patch.tvl_usd, None);
        assert_eq!(outcome.record.short_description.as_deref(), Some("From the loser"));
        assert_eq!(outcome.patch.short_description.as_deref(), Some("From the loser"));
    }

    #[test]
    fn test_merge_fills_missing_tvl_and_enrichment() {
        let mut canonical = record("rec2", "Foo");
        canonical.status = PublishStatus::Published;
        canonical.analytics_id = Some("foo".to_string());
        canonical.defi_category = Some("Dexes".to_string());
        canonical.last_synced_at = Some(Utc::now());
        let mut loser = record("rec1", "Foo");
        loser.tvl_usd = Some(500.0);
        loser.directory_enrichment = Some(serde_json::json!({"slug": "foo"}));

        let groups = DuplicateResolver::new().group_and_resolve(&[canonical, loser]);
        assert_eq!(groups[0].canonical().id, "rec2");
        let outcome = groups[0].merge();
        assert_eq!(outcome.patch.tvl_usd, Some(500.0));
        assert!(outcome.patch.directory_enrichment.is_some());
        assert!(outcome.patch.short_description.is_none());
    }

    #[test]
    fn test_merge_takes_largest_loser_tvl() {
        let mut canonical = record("rec9", "Foo");
        canonical.status = PublishStatus::Published;
        canonical.analytics_id = Some("foo".to_string());
        canonical.directory_enrichment = Some(serde_json::json!({"slug": "foo"}));
        let mut small = record("rec2", "Foo");
        small.tvl_usd = Some(100.0);
        small.short_description = Some("Small".to_string());
        let mut large = record("rec1", "Foo");
        large.tvl_usd = Some(500.0);

        let groups = DuplicateResolver::new().group_and_resolve(&[large, canonical, small]);
        let ids: Vec<&str> = groups[0].members.iter().map(|m| m.record.id.as_str()).collect();
        assert_eq!(ids, vec!["rec9", "rec2", "rec1"]);

        let outcome = groups[0].merge();
        assert_eq!(outcome.record.tvl_usd, Some(500.0));
        assert_eq!(outcome.patch.tvl_usd, Some(500.0));
        assert_eq!(outcome.patch.short_description.as_deref(), Some("Small"));
    }

    #[test]
    fn test_untitled_records_stay_apart() {
        let records = vec![record("1", "???"), record("2", "")];
        let groups = DuplicateResolver::new().group_and_resolve(&records);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| !g.is_duplicate()));
    }
}
