//! Multi-source reconciliation into [`UnifiedMetadata`].
//!
//! Each field is resolved independently with a fixed precedence:
//!
//! | field | precedence |
//! |---|---|
//! | name | store title, directory name if strictly longer |
//! | description | longest of store / directory short / directory long |
//! | logoUrl | store asset, then directory logo |
//! | chains | union of all three, canonicalized and sorted |
//! | categories | store DeFi category plus directory categories |
//! | TVL, trends, token | analytics only |
//! | links | directory, overridden by analytics website/twitter/github |
//! | featured, verified | directory, else `false` |

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::chains::ChainMatcher;
use crate::metadata::{truncate_with_ellipsis, FieldSource, MetadataMode, UnifiedMetadata};
use crate::reference::ReferenceData;
use crate::types::{non_empty, positive, AnalyticsRecord, DirectoryRecord, RawSourceRecord, StoreRecord};

/// Per-chain TVL keys that are accounting buckets, not chains.
const TVL_BUCKETS: [&str; 9] = [
    "staking",
    "pool2",
    "borrowed",
    "vesting",
    "offers",
    "treasury",
    "doublecounted",
    "liquidstaking",
    "dcandlsoverlap",
];

/// Fuses a store record with its directory and analytics counterparts.
#[derive(Debug, Clone)]
pub struct SourceReconciler {
    matcher: ChainMatcher,
    mode: MetadataMode,
}

impl SourceReconciler {
    /// Create a reconciler in full mode.
    pub fn new(reference: Arc<ReferenceData>) -> Self {
        Self {
            matcher: ChainMatcher::new(reference),
            mode: MetadataMode::Full,
        }
    }

    /// Use a specific chain matcher.
    pub fn with_matcher(mut self, matcher: ChainMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Set the output mode.
    pub fn with_mode(mut self, mode: MetadataMode) -> Self {
        self.mode = mode;
        self
    }

    /// Current output mode.
    pub fn mode(&self) -> MetadataMode {
        self.mode
    }

    /// Reconcile a set of raw records. The first record of each provenance
    /// is used; `None` when no store record is present.
    pub fn reconcile_raw(&self, records: &[RawSourceRecord]) -> Option<UnifiedMetadata> {
        let mut store = None;
        let mut directory = None;
        let mut analytics = None;
        for record in records {
            match record {
                RawSourceRecord::Store(r) => {
                    store.get_or_insert(r);
                }
                RawSourceRecord::Directory(r) => {
                    directory.get_or_insert(r);
                }
                RawSourceRecord::Analytics(r) => {
                    analytics.get_or_insert(r);
                }
            }
        }
        store.map(|store| self.reconcile(store, directory, analytics))
    }

    /// Build the unified record for one canonical store record.
    pub fn reconcile(
        &self,
        store: &StoreRecord,
        directory: Option<&DirectoryRecord>,
        analytics: Option<&AnalyticsRecord>,
    ) -> UnifiedMetadata {
        let mut meta = UnifiedMetadata::default();

        self.resolve_identity(&mut meta, store, directory);
        self.resolve_description(&mut meta, store, directory);
        self.resolve_chains(&mut meta, store, directory, analytics);
        resolve_categories(&mut meta, store, directory);
        if let Some(analytics) = analytics {
            resolve_financials(&mut meta, analytics);
        }
        resolve_links(&mut meta, directory, analytics);

        // Without a directory listing the flags default to false on the
        // canonical store record.
        let (featured, verified, source) = match directory {
            Some(directory) => (directory.featured, directory.verified, FieldSource::Directory),
            None => (false, false, FieldSource::Store),
        };
        meta.featured = Some(featured);
        meta.verified = Some(verified);
        meta.attribute("featured", source);
        meta.attribute("verified", source);

        meta.finalize();
        meta
    }

    fn resolve_identity(
        &self,
        meta: &mut UnifiedMetadata,
        store: &StoreRecord,
        directory: Option<&DirectoryRecord>,
    ) {
        let store_name = non_empty(Some(store.title.as_str()));
        let directory_name = directory.and_then(|d| non_empty(Some(d.name.as_str())));
        let name = match (store_name, directory_name) {
            (Some(s), Some(d)) if d.chars().count() > s.chars().count() => {
                Some((d, FieldSource::Directory))
            }
            (Some(s), _) => Some((s, FieldSource::Store)),
            (None, Some(d)) => Some((d, FieldSource::Directory)),
            (None, None) => None,
        };
        if let Some((name, source)) = name {
            meta.name = Some(name.to_string());
            meta.attribute("name", source);
        }

        let slug = non_empty(store.slug.as_deref())
            .map(|s| (s, FieldSource::Store))
            .or_else(|| {
                directory
                    .and_then(|d| non_empty(Some(d.slug.as_str())))
                    .map(|s| (s, FieldSource::Directory))
            });
        if let Some((slug, source)) = slug {
            meta.slug = Some(slug.to_string());
            meta.attribute("slug", source);
        }

        let logo = non_empty(store.logo_url.as_deref())
            .map(|l| (l, FieldSource::Store))
            .or_else(|| {
                directory
                    .and_then(|d| non_empty(d.logo_url.as_deref()))
                    .map(|l| (l, FieldSource::Directory))
            });
        if let Some((logo, source)) = logo {
            meta.logo_url = Some(logo.to_string());
            meta.attribute("logoUrl", source);
        }
    }

    fn resolve_description(
        &self,
        meta: &mut UnifiedMetadata,
        store: &StoreRecord,
        directory: Option<&DirectoryRecord>,
    ) {
        let mut candidates = vec![(store.short_description.as_deref(), FieldSource::Store)];
        if let Some(directory) = directory {
            candidates.push((directory.description.as_deref(), FieldSource::Directory));
            candidates.push((directory.long_description.as_deref(), FieldSource::Directory));
        }

        // Ties keep the earlier candidate.
        let mut best: Option<(&str, FieldSource)> = None;
        for (text, source) in candidates {
            let Some(text) = non_empty(text) else { continue };
            if best.is_none_or(|(b, _)| text.chars().count() > b.chars().count()) {
                best = Some((text, source));
            }
        }

        if let Some((text, source)) = best {
            meta.description = Some(truncate_with_ellipsis(text, self.mode.description_cap()));
            meta.attribute("description", source);
        }
    }

    fn resolve_chains(
        &self,
        meta: &mut UnifiedMetadata,
        store: &StoreRecord,
        directory: Option<&DirectoryRecord>,
        analytics: Option<&AnalyticsRecord>,
    ) {
        // Lower-cased canonical name -> display name; BTreeMap keeps them sorted.
        let mut chains: BTreeMap<String, String> = BTreeMap::new();
        let mut contributors = Vec::new();

        let mut add = |raw: &str, source: FieldSource, chains: &mut BTreeMap<String, String>| {
            let name = self.matcher.canonical_name(raw);
            if name.is_empty() {
                return;
            }
            chains.entry(name.to_lowercase()).or_insert(name);
            if !contributors.contains(&source) {
                contributors.push(source);
            }
        };

        for name in store.chain_names() {
            add(&name, FieldSource::Store, &mut chains);
        }
        if let Some(directory) = directory {
            for name in &directory.chains {
                add(name, FieldSource::Directory, &mut chains);
            }
        }

        let mut chain_tvl: BTreeMap<String, f64> = BTreeMap::new();
        if let Some(analytics) = analytics {
            for (key, value) in &analytics.chain_tvl {
                if is_tvl_bucket(key) {
                    continue;
                }
                add(key, FieldSource::Analytics, &mut chains);
                if let Some(value) = positive(Some(*value)) {
                    *chain_tvl.entry(self.matcher.canonical_name(key)).or_insert(0.0) += value;
                }
            }
        }

        if let Some(source) = FieldSource::fold(contributors) {
            meta.chains = chains.into_values().collect();
            meta.attribute("chains", source);
        }

        if self.mode == MetadataMode::Full && !chain_tvl.is_empty() {
            meta.chain_tvl = chain_tvl;
            meta.attribute("chainTvl", FieldSource::Analytics);
        }
    }
}

fn resolve_categories(
    meta: &mut UnifiedMetadata,
    store: &StoreRecord,
    directory: Option<&DirectoryRecord>,
) {
    let mut categories: Vec<String> = Vec::new();
    let mut contributors = Vec::new();

    let mut add = |raw: &str, source: FieldSource| {
        let Some(category) = non_empty(Some(raw)) else { return };
        if !categories.iter().any(|c| c.eq_ignore_ascii_case(category)) {
            categories.push(category.to_string());
        }
        if !contributors.contains(&source) {
            contributors.push(source);
        }
    };

    if let Some(category) = store.defi_category.as_deref() {
        add(category, FieldSource::Store);
    }
    if let Some(directory) = directory {
        for category in &directory.categories {
            add(category, FieldSource::Directory);
        }
    }

    if let Some(source) = FieldSource::fold(contributors) {
        meta.categories = categories;
        meta.attribute("categories", source);
    }
}

fn resolve_financials(meta: &mut UnifiedMetadata, analytics: &AnalyticsRecord) {
    if let Some(tvl) = positive(analytics.tvl_usd) {
        meta.tvl_usd = Some(tvl);
        meta.is_defi_protocol = Some(true);
        meta.attribute("tvlUsd", FieldSource::Analytics);
        meta.attribute("isDefiProtocol", FieldSource::Analytics);
    }

    let trends = [
        ("tvlChange1h", analytics.change_1h, &mut meta.tvl_change_1h),
        ("tvlChange1d", analytics.change_1d, &mut meta.tvl_change_1d),
        ("tvlChange7d", analytics.change_7d, &mut meta.tvl_change_7d),
    ];
    let mut attributed = Vec::new();
    for (field, value, slot) in trends {
        if let Some(value) = value.filter(|v| v.is_finite()) {
            *slot = Some(value);
            attributed.push(field);
        }
    }

    if let Some(symbol) = non_empty(analytics.token_symbol.as_deref()) {
        meta.token_symbol = Some(symbol.to_string());
        attributed.push("tokenSymbol");
    }
    if let Some(price) = positive(analytics.token_price_usd) {
        meta.token_price_usd = Some(price);
        attributed.push("tokenPriceUsd");
    }
    if let Some(cap) = positive(analytics.market_cap_usd) {
        meta.market_cap_usd = Some(cap);
        attributed.push("marketCapUsd");
    }

    for field in attributed {
        meta.attribute(field, FieldSource::Analytics);
    }
}

fn resolve_links(
    meta: &mut UnifiedMetadata,
    directory: Option<&DirectoryRecord>,
    analytics: Option<&AnalyticsRecord>,
) {
    let links = directory.map(|d| &d.links);
    let analytics_website = analytics.and_then(|a| non_empty(a.url.as_deref())).map(str::to_string);
    let analytics_twitter = analytics
        .and_then(|a| non_empty(a.twitter.as_deref()))
        .map(twitter_url);
    let analytics_github = analytics
        .and_then(|a| a.github.iter().find_map(|g| non_empty(Some(g.as_str()))))
        .map(github_url);

    let resolved = [
        (
            "websiteUrl",
            links.and_then(|l| non_empty(l.website.as_deref())),
            analytics_website,
        ),
        (
            "twitterUrl",
            links.and_then(|l| non_empty(l.twitter.as_deref())),
            analytics_twitter,
        ),
        (
            "githubUrl",
            links.and_then(|l| non_empty(l.github.as_deref())),
            analytics_github,
        ),
        ("discordUrl", links.and_then(|l| non_empty(l.discord.as_deref())), None),
        ("docsUrl", links.and_then(|l| non_empty(l.docs.as_deref())), None),
    ];

    for (field, from_directory, from_analytics) in resolved {
        let (value, source) = match (from_directory, from_analytics) {
            (Some(_), Some(a)) => (a, FieldSource::Both),
            (None, Some(a)) => (a, FieldSource::Analytics),
            (Some(d), None) => (d.to_string(), FieldSource::Directory),
            (None, None) => continue,
        };
        let slot = match field {
            "websiteUrl" => &mut meta.website_url,
            "twitterUrl" => &mut meta.twitter_url,
            "githubUrl" => &mut meta.github_url,
            "discordUrl" => &mut meta.discord_url,
            _ => &mut meta.docs_url,
        };
        *slot = Some(value);
        meta.attribute(field, source);
    }
}

/// Whether a per-chain TVL key is an accounting bucket such as
/// `"staking"` or `"Ethereum-borrowed"`.
pub fn is_tvl_bucket(key: &str) -> bool {
    let lowered = key.trim().to_lowercase();
    let suffix = lowered.rsplit('-').next().unwrap_or(lowered.as_str());
    TVL_BUCKETS.contains(&lowered.as_str()) || (lowered.contains('-') && TVL_BUCKETS.contains(&suffix))
}

fn twitter_url(handle: &str) -> String {
    if handle.starts_with("http://") || handle.starts_with("https://") {
        handle.to_string()
    } else {
        format!("https://twitter.com/{}", handle.trim_start_matches('@'))
    }
}

fn github_url(org: &str) -> String {
    if org.starts_with("http://") || org.starts_with("https://") {
        org.to_string()
    } else {
        format!("https://github.com/{}", org)
    }
}
