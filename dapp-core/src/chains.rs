//! Chain identity resolution.
//!
//! A [`ChainTable`] is the curated list of chains the directory knows
//! about. [`ChainMatcher`] resolves free-form chain names against it in
//! three passes: exact canonical name, exact alias, containment. The first
//! hit wins and earlier table entries take precedence within a pass.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::normalize::{normalize, same_identity, MatchMode};
use crate::reference::ReferenceData;

/// Containment matches on names shorter than this are logged.
const SHORT_NAME_LEN: usize = 4;

/// Canonical chain entity from the reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainIdentity {
    /// Display name used in unified metadata
    pub canonical_name: String,
    /// Alternative spellings seen in upstream sources
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Support tier, 1 = most supported
    pub priority: u32,
    /// Chain family, e.g. "L1" or "L2"
    #[serde(default)]
    pub category: Option<String>,
}

impl ChainIdentity {
    /// Create an identity with no aliases.
    pub fn new(canonical_name: impl Into<String>, priority: u32) -> Self {
        Self {
            canonical_name: canonical_name.into(),
            aliases: Vec::new(),
            priority,
            category: None,
        }
    }

    /// Add aliases.
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    /// Set the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Errors raised while loading a chain table.
#[derive(Debug, thiserror::Error)]
pub enum ChainTableError {
    /// Canonical name normalizes to nothing
    #[error("Chain entry {index} has an empty canonical name")]
    EmptyName { index: usize },

    /// Two entries claim the same normalized name
    #[error("Alias collision: '{alias}' is claimed by both '{first}' and '{second}'")]
    AliasCollision {
        alias: String,
        first: String,
        second: String,
    },
}

#[derive(Debug, Clone)]
struct NormalizedEntry {
    canonical: String,
    aliases: Vec<String>,
}

/// Immutable, validated chain reference table.
///
/// Normalized names (canonical and aliases) are pairwise disjoint across
/// entries; a table violating this is rejected by [`ChainTable::new`].
#[derive(Debug, Clone)]
pub struct ChainTable {
    entries: Vec<ChainIdentity>,
    normalized: Vec<NormalizedEntry>,
}

impl ChainTable {
    /// Validate and build a table. Declaration order is match precedence.
    pub fn new(entries: Vec<ChainIdentity>) -> Result<Self, ChainTableError> {
        let mut owners: HashMap<String, usize> = HashMap::new();
        let mut normalized = Vec::with_capacity(entries.len());

        for (index, entry) in entries.iter().enumerate() {
            let canonical = normalize(&entry.canonical_name);
            if canonical.is_empty() {
                return Err(ChainTableError::EmptyName { index });
            }

            let mut aliases: Vec<String> = Vec::new();
            for alias in &entry.aliases {
                let alias = normalize(alias);
                if alias.is_empty() || alias == canonical || aliases.contains(&alias) {
                    continue;
                }
                aliases.push(alias);
            }

            for name in std::iter::once(&canonical).chain(aliases.iter()) {
                if let Some(&owner) = owners.get(name) {
                    return Err(ChainTableError::AliasCollision {
                        alias: name.clone(),
                        first: entries[owner].canonical_name.clone(),
                        second: entry.canonical_name.clone(),
                    });
                }
                owners.insert(name.clone(), index);
            }

            normalized.push(NormalizedEntry { canonical, aliases });
        }

        Ok(Self {
            entries,
            normalized,
        })
    }

    /// The built-in table of chains the directory tracks.
    pub fn builtin() -> Self {
        let entries = vec![
            ChainIdentity::new("Ethereum", 1)
                .with_aliases(["Ethereum Mainnet", "ETH"])
                .with_category("L1"),
            ChainIdentity::new("Arbitrum One", 1)
                .with_aliases(["Arbitrum", "Arbitrum Mainnet", "ARB"])
                .with_category("L2"),
            ChainIdentity::new("Base", 1)
                .with_aliases(["Base Mainnet"])
                .with_category("L2"),
            ChainIdentity::new("OP Mainnet", 1)
                .with_aliases(["Optimism", "Optimism Mainnet"])
                .with_category("L2"),
            ChainIdentity::new("Polygon", 1)
                .with_aliases(["Polygon PoS", "Polygon Mainnet", "Matic"])
                .with_category("Sidechain"),
            ChainIdentity::new("Polygon zkEVM", 2)
                .with_aliases(["Polygon zkEVM Mainnet", "zkEVM"])
                .with_category("L2"),
            ChainIdentity::new("zkSync Era", 2)
                .with_aliases(["zkSync", "ZKsync Era Mainnet"])
                .with_category("L2"),
            ChainIdentity::new("Linea", 2)
                .with_aliases(["Linea Mainnet"])
                .with_category("L2"),
            ChainIdentity::new("Scroll", 2).with_category("L2"),
            ChainIdentity::new("BNB Smart Chain", 2)
                .with_aliases(["BNB Chain", "BSC", "Binance Smart Chain", "Binance"])
                .with_category("L1"),
            ChainIdentity::new("Avalanche", 2)
                .with_aliases(["Avalanche C-Chain", "AVAX"])
                .with_category("L1"),
            ChainIdentity::new("Blast", 2).with_category("L2"),
            ChainIdentity::new("Mantle", 2).with_category("L2"),
            ChainIdentity::new("Arbitrum Nova", 3)
                .with_aliases(["Nova"])
                .with_category("L2"),
            ChainIdentity::new("Zora", 3).with_category("L2"),
            ChainIdentity::new("Mode", 3).with_category("L2"),
            ChainIdentity::new("Ink", 3).with_category("L2"),
            ChainIdentity::new("Gnosis", 3)
                .with_aliases(["Gnosis Chain", "xDai"])
                .with_category("Sidechain"),
            ChainIdentity::new("Celo", 3).with_category("L2"),
            ChainIdentity::new("Fantom", 3)
                .with_aliases(["Fantom Opera"])
                .with_category("L1"),
            ChainIdentity::new("Solana", 3).with_category("Non-EVM"),
        ];

        Self::new(entries).expect("built-in chain table has disjoint aliases")
    }

    /// Entries in declaration order.
    pub fn entries(&self) -> &[ChainIdentity] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of resolving every chain a dapp touches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBatch {
    /// Distinct matched identities, in first-seen order
    pub identities: Vec<ChainIdentity>,
    /// Best (lowest) priority among matches, `None` if nothing matched
    pub priority: Option<u32>,
    /// Category of the best-priority chain
    pub category: Option<String>,
}

impl ChainBatch {
    /// Whether any chain matched.
    pub fn is_matched(&self) -> bool {
        self.priority.is_some()
    }

    /// Ordering by best priority; unmatched batches sort last.
    pub fn cmp_priority(&self, other: &Self) -> Ordering {
        compare_priority(self.priority, other.priority)
    }
}

/// Compare optional priorities with `None` after every `Some`.
pub fn compare_priority(a: Option<u32>, b: Option<u32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Resolves raw chain names to [`ChainIdentity`] values.
#[derive(Debug, Clone)]
pub struct ChainMatcher {
    reference: Arc<ReferenceData>,
    min_containment_len: usize,
}

impl ChainMatcher {
    /// Create a matcher over the shared reference data.
    pub fn new(reference: Arc<ReferenceData>) -> Self {
        Self {
            reference,
            min_containment_len: 0,
        }
    }

    /// Refuse containment matches where the shorter name is below `len`.
    ///
    /// The default of 0 leaves containment unbounded.
    pub fn with_min_containment_len(mut self, len: usize) -> Self {
        self.min_containment_len = len;
        self
    }

    /// Resolve one raw chain name.
    pub fn resolve(&self, raw: &str) -> Option<&ChainIdentity> {
        let input = normalize(raw);
        if input.is_empty() {
            return None;
        }
        let table = &self.reference.chains;

        if let Some(i) = table.normalized.iter().position(|n| n.canonical == input) {
            return table.entries.get(i);
        }

        if let Some(i) = table
            .normalized
            .iter()
            .position(|n| n.aliases.iter().any(|a| *a == input))
        {
            return table.entries.get(i);
        }

        for (i, entry) in table.normalized.iter().enumerate() {
            let hit = std::iter::once(&entry.canonical)
                .chain(entry.aliases.iter())
                .find(|name| {
                    input.len().min(name.len()) >= self.min_containment_len
                        && same_identity(&input, name, MatchMode::Containment)
                });
            if let Some(name) = hit {
                if name.len().min(input.len()) < SHORT_NAME_LEN {
                    debug!(input = %input, matched = %name, "Short-name containment match");
                }
                return table.entries.get(i);
            }
        }

        None
    }

    /// Canonical display name for `raw`, or the trimmed input when unmatched.
    pub fn canonical_name(&self, raw: &str) -> String {
        match self.resolve(raw) {
            Some(identity) => identity.canonical_name.clone(),
            None => raw.trim().to_string(),
        }
    }

    /// Resolve every name a dapp touches and rank it by its best chain.
    ///
    /// Ties on priority go to the identity declared first in the table.
    pub fn resolve_batch<I, S>(&self, names: I) -> ChainBatch
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut identities: Vec<ChainIdentity> = Vec::new();
        for name in names {
            if let Some(identity) = self.resolve(name.as_ref()) {
                if !identities.contains(identity) {
                    identities.push(identity.clone());
                }
            }
        }

        let entries = self.reference.chains.entries();
        let best = identities.iter().min_by_key(|identity| {
            let position = entries
                .iter()
                .position(|e| e == *identity)
                .unwrap_or(usize::MAX);
            (identity.priority, position)
        });

        ChainBatch {
            priority: best.map(|b| b.priority),
            category: best.and_then(|b| b.category.clone()),
            identities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> ChainMatcher {
        ChainMatcher::new(Arc::new(ReferenceData::builtin()))
    }

    #[test]
    fn test_builtin_table_is_valid() {
        let table = ChainTable::builtin();
        assert!(!table.is_empty());
        assert_eq!(table.entries()[0].canonical_name, "Ethereum");
    }

    #[test]
    fn test_alias_collision_rejected() {
        let result = ChainTable::new(vec![
            ChainIdentity::new("Optimism", 1),
            ChainIdentity::new("OP Mainnet", 1).with_aliases(["Optimism Mainnet"]),
        ]);
        match result {
            Err(ChainTableError::AliasCollision { alias, first, second }) => {
                assert_eq!(alias, "optimism");
                assert_eq!(first, "Optimism");
                assert_eq!(second, "OP Mainnet");
            }
            other => panic!("expected collision, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_canonical_rejected() {
        let result = ChainTable::new(vec![ChainIdentity::new("  ??? ", 1)]);
        assert!(matches!(result, Err(ChainTableError::EmptyName { index: 0 })));
    }

    #[test]
    fn test_resolve_exact_and_alias() {
        let m = matcher();
        assert_eq!(m.resolve("ethereum").unwrap().canonical_name, "Ethereum");
        assert_eq!(m.resolve("BSC").unwrap().canonical_name, "BNB Smart Chain");
        assert_eq!(m.resolve("Optimism").unwrap().canonical_name, "OP Mainnet");
    }

    #[test]
    fn test_resolve_containment() {
        let m = matcher();
        let a = m.resolve("Polygon zkEVM Mainnet").unwrap();
        let b = m.resolve("polygon zkevm").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.canonical_name, "Polygon zkEVM");

        assert_eq!(
            m.resolve("Arbitrum One Rollup").unwrap().canonical_name,
            "Arbitrum One"
        );
    }

    #[test]
    fn test_resolve_exact_beats_containment() {
        let m = matcher();
        // "polygon" is contained in "polygon zkevm" but the exact pass runs first
        assert_eq!(m.resolve("Polygon zkEVM").unwrap().canonical_name, "Polygon zkEVM");
        assert_eq!(m.resolve("Arbitrum Nova").unwrap().canonical_name, "Arbitrum Nova");
    }

    #[test]
    fn test_resolve_declaration_order_breaks_ties() {
        let reference = ReferenceData::new(
            ChainTable::new(vec![
                ChainIdentity::new("Alpha", 2),
                ChainIdentity::new("Beta", 1),
            ])
            .unwrap(),
            Vec::new(),
        );
        let m = ChainMatcher::new(Arc::new(reference));
        assert_eq!(m.resolve("alpha beta bridge").unwrap().canonical_name, "Alpha");
    }

    #[test]
    fn test_short_name_containment_is_unbounded_by_default() {
        let m = matcher();
        // Known false positive: "base" inside "coinbase"
        assert_eq!(m.resolve("Coinbase Wallet").unwrap().canonical_name, "Base");

        let guarded = matcher().with_min_containment_len(5);
        assert!(guarded.resolve("Coinbase Wallet").is_none());
        assert_eq!(
            guarded.resolve("Polygon zkEVM Rollup").unwrap().canonical_name,
            "Polygon"
        );
    }

    #[test]
    fn test_resolve_unknown_and_empty() {
        let m = matcher();
        assert!(m.resolve("").is_none());
        assert!(m.resolve("Starknet").is_none());
        assert_eq!(m.canonical_name(" Starknet "), "Starknet");
        assert_eq!(m.canonical_name("arbitrum"), "Arbitrum One");
    }

    #[test]
    fn test_resolve_batch_best_priority() {
        let m = matcher();
        let batch = m.resolve_batch(["Scroll", "Arbitrum", "arbitrum one", "Starknet"]);
        assert_eq!(batch.identities.len(), 2);
        assert_eq!(batch.identities[0].canonical_name, "Scroll");
        assert_eq!(batch.priority, Some(1));
        assert_eq!(batch.category.as_deref(), Some("L2"));
    }

    #[test]
    fn test_resolve_batch_unmatched_sorts_last() {
        let m = matcher();
        let none = m.resolve_batch(["Starknet"]);
        let tier3 = m.resolve_batch(["Zora"]);
        assert_eq!(none.priority, None);
        assert_eq!(none.category, None);

        let mut batches = vec![none.clone(), tier3.clone()];
        batches.sort_by(|a, b| a.cmp_priority(b));
        assert_eq!(batches[0], tier3);
        assert_eq!(batches[1], none);
    }
}
