//! Configuration for the sync passes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use dapp_core::budget::DEFAULT_BUDGET_BYTES;
use dapp_core::{MetadataMode, ReferenceData, ReferenceError};

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid reference table: {0}")]
    Reference(#[from] ReferenceError),
}

/// Configuration for a sync run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Record store settings
    pub store: StoreConfig,
    /// Dapp directory settings
    pub directory: DirectoryConfig,
    /// Analytics provider settings
    pub analytics: AnalyticsConfig,
    /// Delays after external calls
    pub throttle: ThrottleConfig,
    /// Output settings
    pub metadata: MetadataConfig,
    /// Optional YAML chain table and excluded categories
    pub reference_path: Option<PathBuf>,
    /// Log mutating calls instead of executing them
    pub dry_run: bool,
}

impl SyncConfig {
    /// Parse config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Load config from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_yaml(&content)?)
    }

    /// Build the reference data: the configured file, else the built-in table.
    pub fn reference(&self) -> Result<ReferenceData, ConfigError> {
        match &self.reference_path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(ReferenceData::from_yaml(&content)?)
            }
            None => Ok(ReferenceData::builtin()),
        }
    }
}

/// Record store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Management API base URL
    pub base_url: String,
    /// Content type holding dapp records
    pub content_type: String,
    /// Content type holding chain entries
    pub chain_content_type: String,
    /// Environment variable holding the API token
    pub token_env: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            content_type: "dapp".to_string(),
            chain_content_type: "chain".to_string(),
            token_env: "DAPP_STORE_TOKEN".to_string(),
        }
    }
}

/// Dapp directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Directory API base URL
    pub base_url: String,
    /// Environment variable holding the API key, if any
    pub api_key_env: Option<String>,
    /// Stop paginating after this many pages
    pub max_pages: u32,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://dapp-directory.example.com/api".to_string(),
            api_key_env: None,
            max_pages: 50,
        }
    }
}

/// Analytics provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Analytics API base URL
    pub base_url: String,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.llama.fi".to_string(),
        }
    }
}

/// Fixed delays after external calls, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub create_ms: u64,
    pub update_ms: u64,
    pub publish_ms: u64,
    pub destroy_ms: u64,
    pub page_fetch_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            create_ms: 500,
            update_ms: 300,
            publish_ms: 300,
            destroy_ms: 200,
            page_fetch_ms: 100,
        }
    }
}

impl ThrottleConfig {
    /// No delays at all.
    pub fn none() -> Self {
        Self {
            create_ms: 0,
            update_ms: 0,
            publish_ms: 0,
            destroy_ms: 0,
            page_fetch_ms: 0,
        }
    }

    pub fn create(&self) -> Duration {
        Duration::from_millis(self.create_ms)
    }

    pub fn update(&self) -> Duration {
        Duration::from_millis(self.update_ms)
    }

    pub fn publish(&self) -> Duration {
        Duration::from_millis(self.publish_ms)
    }

    pub fn destroy(&self) -> Duration {
        Duration::from_millis(self.destroy_ms)
    }

    pub fn page_fetch(&self) -> Duration {
        Duration::from_millis(self.page_fetch_ms)
    }
}

/// Unified metadata output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// `full` or `minimal`
    pub mode: MetadataMode,
    /// Maximum serialized size in bytes
    pub budget_bytes: usize,
    /// Shortest chain name allowed to containment-match; 0 disables the floor
    pub min_containment_len: usize,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            mode: MetadataMode::Full,
            budget_bytes: DEFAULT_BUDGET_BYTES,
            min_containment_len: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.store.content_type, "dapp");
        assert_eq!(config.throttle.create(), Duration::from_millis(500));
        assert_eq!(config.throttle.destroy(), Duration::from_millis(200));
        assert_eq!(config.metadata.budget_bytes, 250_000);
        assert_eq!(config.metadata.mode, MetadataMode::Full);
        assert!(!config.dry_run);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
store:
  base_url: https://store.internal/api
metadata:
  mode: minimal
dry_run: true
"#;
        let config = SyncConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.store.base_url, "https://store.internal/api");
        assert_eq!(config.store.chain_content_type, "chain");
        assert_eq!(config.metadata.mode, MetadataMode::Minimal);
        assert_eq!(config.metadata.budget_bytes, 250_000);
        assert_eq!(config.throttle, ThrottleConfig::default());
        assert!(config.dry_run);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = SyncConfig::default();
        config.directory.max_pages = 3;
        let yaml = config.to_yaml().unwrap();
        let parsed = SyncConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.directory.max_pages, 3);
    }

    #[test]
    fn test_builtin_reference_when_unset() {
        let reference = SyncConfig::default().reference().unwrap();
        assert!(!reference.chains.is_empty());
    }

    #[test]
    fn test_throttle_none() {
        assert_eq!(ThrottleConfig::none().update(), Duration::ZERO);
    }
}
