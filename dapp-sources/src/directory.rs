//! Dapp directory client.
//!
//! The directory exposes a paginated listing and a per-slug detail
//! endpoint. Its schema differs from ours: chains and categories may be
//! plain strings or objects, the logo lives under `logoCdnUrl`, and links
//! are flat `*Url` fields.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use dapp_core::{DirectoryRecord, Links};

use crate::http::{build_client, check_status, decode, join, NameOrObject, DEFAULT_TIMEOUT};
use crate::traits::{DirectoryPage, DirectoryProvider, SourceError};

/// Records requested per listing page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDapp {
    slug: String,
    name: String,
    #[serde(default, alias = "shortDescription")]
    description: Option<String>,
    #[serde(default)]
    long_description: Option<String>,
    #[serde(default, alias = "logoUrl")]
    logo_cdn_url: Option<String>,
    #[serde(default)]
    chains: Vec<NameOrObject>,
    #[serde(default)]
    categories: Vec<NameOrObject>,
    #[serde(default)]
    website_url: Option<String>,
    #[serde(default)]
    twitter_url: Option<String>,
    #[serde(default)]
    github_url: Option<String>,
    #[serde(default)]
    discord_url: Option<String>,
    #[serde(default)]
    docs_url: Option<String>,
    #[serde(default)]
    featured: bool,
    #[serde(default, alias = "isVerified")]
    verified: bool,
}

impl From<WireDapp> for DirectoryRecord {
    fn from(wire: WireDapp) -> Self {
        DirectoryRecord {
            slug: wire.slug,
            name: wire.name,
            description: wire.description,
            long_description: wire.long_description,
            logo_url: wire.logo_cdn_url,
            chains: wire.chains.into_iter().map(NameOrObject::into_name).collect(),
            categories: wire.categories.into_iter().map(NameOrObject::into_name).collect(),
            links: Links {
                website: wire.website_url,
                twitter: wire.twitter_url,
                github: wire.github_url,
                discord: wire.discord_url,
                docs: wire.docs_url,
            },
            featured: wire.featured,
            verified: wire.verified,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePage {
    records: Vec<WireDapp>,
    #[serde(default)]
    has_more: bool,
}

/// HTTP-backed [`DirectoryProvider`].
pub struct HttpDirectory {
    client: Client,
    base_url: String,
    page_size: u32,
}

impl HttpDirectory {
    /// Create a client for the directory at `base_url`.
    pub fn new(base_url: impl Into<String>, api_key: Option<&str>) -> Result<Self, SourceError> {
        Self::with_timeout(base_url, api_key, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client(api_key, timeout)?,
            base_url: base_url.into(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Set the page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[async_trait]
impl DirectoryProvider for HttpDirectory {
    async fn list_page(&self, page: u32) -> Result<DirectoryPage, SourceError> {
        let response = self
            .client
            .get(join(&self.base_url, "dapps"))
            .query(&[("page", page), ("limit", self.page_size)])
            .send()
            .await?;
        let wire: WirePage = decode(check_status(response, "dapps").await?).await?;
        debug!(page, count = wire.records.len(), has_more = wire.has_more, "Fetched directory page");

        Ok(DirectoryPage {
            records: wire.records.into_iter().map(DirectoryRecord::from).collect(),
            has_more: wire.has_more,
        })
    }

    async fn get_detail(&self, slug: &str) -> Result<Option<DirectoryRecord>, SourceError> {
        let response = self
            .client
            .get(join(&self.base_url, &format!("dapps/{}", slug)))
            .send()
            .await?;
        match check_status(response, slug).await {
            Ok(response) => {
                let wire: WireDapp = decode(response).await?;
                Ok(Some(wire.into()))
            }
            Err(SourceError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
