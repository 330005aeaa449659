//! Name normalization shared by every matching component.
//!
//! The pipeline is fixed: lower-case, collapse whitespace, drop anything
//! outside `[a-z0-9 ]`, strip one trailing generic suffix, strip a leading
//! `the`, trim. The output is the identity form used for equality and
//! containment checks.

use serde_json::Value;

/// Generic trailing tokens that never carry identity.
pub const GENERIC_SUFFIXES: [&str; 4] = ["mainnet", "testnet", "network", "chain"];

/// Business-name tokens stripped when building duplicate grouping keys.
pub const BUSINESS_SUFFIXES: [&str; 6] = ["finance", "protocol", "defi", "dao", "network", "chain"];

/// How two normalized names are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Normalized forms must be equal. Used between free-text entity names.
    Strict,
    /// Equality, or one normalized form contains the other. Only valid
    /// against a closed, curated reference list such as chain names.
    Containment,
}

/// Normalize a raw name into its identity form.
///
/// Total and deterministic: empty or whitespace-only input yields `""`.
/// A lone suffix or lone `the` is kept rather than reduced to nothing.
pub fn normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned: String = collapsed
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == ' ')
        .collect();

    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    if tokens.len() > 1 && tokens.last().is_some_and(|t| GENERIC_SUFFIXES.contains(t)) {
        tokens.pop();
    }
    if tokens.len() > 1 && tokens[0] == "the" {
        tokens.remove(0);
    }

    tokens.join(" ")
}

/// Normalize a loosely-typed JSON value. Anything but a string yields `""`.
pub fn normalize_value(value: &Value) -> String {
    match value {
        Value::String(s) => normalize(s),
        _ => String::new(),
    }
}

/// Grouping key for duplicate detection.
///
/// Applies [`normalize`] and then strips trailing business suffixes
/// repeatedly, so `"Foo Finance Protocol"`, `"Foo Protocol"` and `"Foo"`
/// share one key.
pub fn identity_key(raw: &str) -> String {
    let normalized = normalize(raw);
    let mut tokens: Vec<&str> = normalized.split(' ').filter(|t| !t.is_empty()).collect();
    while tokens.len() > 1 && tokens.last().is_some_and(|t| BUSINESS_SUFFIXES.contains(t)) {
        tokens.pop();
    }
    tokens.join(" ")
}

/// Compare two already-normalized names.
///
/// Empty names never match anything.
pub fn same_identity(a: &str, b: &str, mode: MatchMode) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    match mode {
        MatchMode::Strict => a == b,
        MatchMode::Containment => a == b || a.contains(b) || b.contains(a),
    }
}
