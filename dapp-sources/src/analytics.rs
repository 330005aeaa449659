//! DeFi analytics client.
//!
//! `GET /protocols` returns summaries with current TVL and change windows;
//! `GET /protocol/{slug}` returns a daily TVL history from which the
//! current value and change windows are derived.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use dapp_core::AnalyticsRecord;

use crate::http::{build_client, check_status, decode, join, string_or_number, DEFAULT_TIMEOUT};
use crate::traits::{AnalyticsProvider, SourceError};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GithubField {
    Many(Vec<String>),
    One(String),
}

impl GithubField {
    fn into_vec(self) -> Vec<String> {
        match self {
            GithubField::Many(v) => v,
            GithubField::One(s) => vec![s],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSummary {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    name: String,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    chains: Vec<String>,
    #[serde(default)]
    tvl: Option<f64>,
    #[serde(default)]
    chain_tvls: BTreeMap<String, f64>,
    #[serde(default, rename = "change_1h")]
    change_1h: Option<f64>,
    #[serde(default, rename = "change_1d")]
    change_1d: Option<f64>,
    #[serde(default, rename = "change_7d")]
    change_7d: Option<f64>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    mcap: Option<f64>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    twitter: Option<String>,
    #[serde(default)]
    github: Option<GithubField>,
}

impl From<WireSummary> for AnalyticsRecord {
    fn from(wire: WireSummary) -> Self {
        AnalyticsRecord {
            id: wire.id,
            name: wire.name,
            slug: wire.slug,
            category: wire.category,
            chains: wire.chains,
            tvl_usd: wire.tvl,
            chain_tvl: wire.chain_tvls,
            change_1h: wire.change_1h,
            change_1d: wire.change_1d,
            change_7d: wire.change_7d,
            token_symbol: wire.symbol.filter(|s| s != "-"),
            token_price_usd: None,
            market_cap_usd: wire.mcap,
            url: wire.url,
            twitter: wire.twitter,
            github: wire.github.map(GithubField::into_vec).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TvlPoint {
    #[serde(rename = "totalLiquidityUSD")]
    total_liquidity_usd: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDetail {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    name: String,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    chains: Vec<String>,
    #[serde(default)]
    tvl: Vec<TvlPoint>,
    #[serde(default)]
    current_chain_tvls: BTreeMap<String, f64>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    mcap: Option<f64>,
    #[serde(default, alias = "tokenPrice")]
    price: Option<f64>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    twitter: Option<String>,
    #[serde(default)]
    github: Option<GithubField>,
}

impl From<WireDetail> for AnalyticsRecord {
    fn from(wire: WireDetail) -> Self {
        let series: Vec<f64> = wire.tvl.iter().map(|p| p.total_liquidity_usd).collect();
        AnalyticsRecord {
            id: wire.id,
            name: wire.name,
            slug: wire.slug,
            category: wire.category,
            chains: wire.chains,
            tvl_usd: series.last().copied(),
            chain_tvl: wire.current_chain_tvls,
            change_1h: None,
            change_1d: percent_change(&series, 1),
            change_7d: percent_change(&series, 7),
            token_symbol: wire.symbol.filter(|s| s != "-"),
            token_price_usd: wire.price,
            market_cap_usd: wire.mcap,
            url: wire.url,
            twitter: wire.twitter,
            github: wire.github.map(GithubField::into_vec).unwrap_or_default(),
        }
    }
}

/// Percentage change between the last point and the one `days_back` before it.
fn percent_change(series: &[f64], days_back: usize) -> Option<f64> {
    let last = *series.last()?;
    let index = series.len().checked_sub(days_back + 1)?;
    let before = series[index];
    if before <= 0.0 || !before.is_finite() || !last.is_finite() {
        return None;
    }
    Some((last - before) / before * 100.0)
}

/// HTTP-backed [`AnalyticsProvider`].
pub struct HttpAnalytics {
    client: Client,
    base_url: String,
}

impl HttpAnalytics {
    /// Create a client for the provider at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, SourceError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client(None, timeout)?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl AnalyticsProvider for HttpAnalytics {
    async fn list_protocols(&self) -> Result<Vec<AnalyticsRecord>, SourceError> {
        let response = self
            .client
            .get(join(&self.base_url, "protocols"))
            .send()
            .await?;
        let wire: Vec<WireSummary> = decode(check_status(response, "protocols").await?).await?;
        debug!(count = wire.len(), "Fetched analytics protocol list");
        Ok(wire.into_iter().map(AnalyticsRecord::from).collect())
    }

    async fn get_protocol(&self, id: &str) -> Result<AnalyticsRecord, SourceError> {
        let response = self
            .client
            .get(join(&self.base_url, &format!("protocol/{}", id)))
            .send()
            .await?;
        let wire: WireDetail = decode(check_status(response, id).await?).await?;
        Ok(wire.into())
    }
}
