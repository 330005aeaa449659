//! dapp-sync: runs the reconciliation passes against the live services.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use dapp_core::MetadataMode;
use dapp_sources::{HttpAnalytics, HttpDirectory, HttpRecordStore};
use dapp_sync::{SyncConfig, SyncService};

#[derive(Parser)]
#[command(name = "dapp-sync")]
#[command(about = "Deduplicate, import and enrich dapp records in the record store")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "dapp-sync.yaml", env = "DAPP_SYNC_CONFIG")]
    config: PathBuf,

    /// Log mutating calls instead of executing them
    #[arg(long)]
    dry_run: bool,

    /// Metadata profile (overrides config file)
    #[arg(long, value_parser = parse_mode)]
    mode: Option<MetadataMode>,

    /// Serialized metadata budget in bytes (overrides config file)
    #[arg(long)]
    budget_bytes: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge and delete duplicate store records
    Dedupe,
    /// Create store records for directory dapps the store lacks
    Import,
    /// Write unified metadata onto every canonical record
    Enrich,
    /// List records ordered by chain priority
    Rank,
    /// Dedupe, import and enrich in order
    Run,
}

fn parse_mode(value: &str) -> Result<MetadataMode, String> {
    match value.to_ascii_lowercase().as_str() {
        "full" => Ok(MetadataMode::Full),
        "minimal" => Ok(MetadataMode::Minimal),
        other => Err(format!("unknown mode '{}', expected full or minimal", other)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dapp_sync=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // Load or create default config
    let mut config = if cli.config.exists() {
        info!("Config file: {}", cli.config.display());
        SyncConfig::load(&cli.config)?
    } else {
        info!("Config file not found, using defaults");
        SyncConfig::default()
    };

    // Apply CLI overrides
    if cli.dry_run {
        config.dry_run = true;
    }
    if let Some(mode) = cli.mode {
        config.metadata.mode = mode;
    }
    if let Some(budget) = cli.budget_bytes {
        config.metadata.budget_bytes = budget;
    }

    let reference = Arc::new(config.reference()?);
    info!(chains = reference.chains.len(), "Loaded chain reference table");

    let token = std::env::var(&config.store.token_env).ok();
    if token.is_none() {
        warn!("{} is not set, calling the record store unauthenticated", config.store.token_env);
    }
    let directory_key = config
        .directory
        .api_key_env
        .as_ref()
        .and_then(|name| std::env::var(name).ok());

    let store = Arc::new(HttpRecordStore::new(&config.store.base_url, token.as_deref())?);
    let directory = Arc::new(HttpDirectory::new(&config.directory.base_url, directory_key.as_deref())?);
    let analytics = Arc::new(HttpAnalytics::new(&config.analytics.base_url)?);

    let service = SyncService::new(config, reference, store, directory, analytics);

    let output = match cli.command {
        Command::Dedupe => serde_json::to_string_pretty(&service.dedupe().await?)?,
        Command::Import => serde_json::to_string_pretty(&service.import().await?)?,
        Command::Enrich => serde_json::to_string_pretty(&service.enrich().await?)?,
        Command::Rank => serde_json::to_string_pretty(&service.rank().await?)?,
        Command::Run => serde_json::to_string_pretty(&service.run_all().await?)?,
    };
    println!("{}", output);

    Ok(())
}
