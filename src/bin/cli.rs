//! spyglass CLI
//!
//! Local execution entry point: build the link catalog, then search it.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use spyglass::{
    error::{AppError, Result},
    models::{Config, SearchLink, format_search_url},
    pipeline,
    services::{QueryOrchestrator, SearchExecutor},
    storage::{LocalStorage, MemoryStorage, ResultStore},
};

/// spyglass - meta-search across many sites
#[derive(Parser, Debug)]
#[command(
    name = "spyglass",
    version,
    about = "Meta-search backend with automatic result-card discovery"
)]
struct Cli {
    /// Path to storage directory containing config, catalog and cached results
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Learn card selectors for every search link and write links.json
    #[cfg(feature = "discover")]
    Discover {
        /// Force regenerate even if links.json exists
        #[arg(long)]
        force: bool,
    },

    /// Search every cataloged site, printing results as NDJSON
    Search {
        /// The query to search for
        query: String,

        /// Keep results in memory only; neither read nor write the result cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Validate configuration and catalog files
    Validate,

    /// Show catalog and cache info
    Info,

    /// Remove expired cached result sets
    Purge,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let storage = LocalStorage::new(&cli.storage_dir);
    let config = Config::load_or_default(storage.config_path());
    let storage = storage.with_retention(config.search.retention());

    log::debug!("Loaded configuration from {}", cli.storage_dir.display());

    match cli.command {
        #[cfg(feature = "discover")]
        Command::Discover { force } => {
            if !force && storage.load_links().await?.is_some() {
                log::warn!("links.json already exists. Use --force to overwrite.");
                return Ok(());
            }

            let client = spyglass::utils::http::create_async_client(&config.crawler)?;
            let stored = pipeline::run_discovery(&config, &storage, &client).await?;
            log::info!(
                "Cataloged {} of {} sites in {} categories",
                stored.valid_links_count,
                stored.search_links_count,
                stored.links.len()
            );
        }

        Command::Search { query, no_cache } => {
            let Some(stored) = storage.load_links().await? else {
                return Err(AppError::config("links.json not found. Run 'discover' first."));
            };
            let executor = SearchExecutor::from_config(&config, stored.into_catalog())?;
            log::info!("Searching {} sites", executor.catalog().len());

            let store: Arc<dyn ResultStore> = if no_cache {
                Arc::new(MemoryStorage::new(config.search.retention()))
            } else {
                Arc::new(storage.clone())
            };
            let orchestrator = QueryOrchestrator::new(Arc::new(executor), store, &config.search);

            let stdout = std::io::stdout();
            pipeline::run_search(&orchestrator, &query, stdout.lock()).await?;
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");

            match storage.load_search_links().await {
                Ok(links) => validate_templates(&links)?,
                Err(e) => log::warn!("Skipping search link checks: {e}"),
            }

            if let Some(stored) = storage.load_links().await? {
                for link in stored.links.values().flatten() {
                    spyglass::services::parse_selector(&link.card_selector)?;
                }
                log::info!("✓ {} card selectors OK", stored.valid_links_count);
            }

            log::info!("All validations passed!");
        }

        Command::Info => {
            log::info!("Storage directory: {}", cli.storage_dir.display());

            match storage.load_search_links().await {
                Ok(links) => log::info!("Search links: {}", links.len()),
                Err(_) => log::info!("Search links: not found"),
            }

            match storage.load_links().await? {
                Some(stored) => {
                    log::info!(
                        "Catalog: {} of {} links usable",
                        stored.valid_links_count,
                        stored.search_links_count
                    );
                    for (category, links) in &stored.links {
                        log::info!("  {category}: {}", links.len());
                    }
                }
                None => log::info!("No catalog found yet."),
            }
        }

        Command::Purge => {
            let removed = storage.purge_expired().await?;
            log::info!("Removed {removed} expired result sets");
        }
    }

    Ok(())
}

/// Every search URL must carry exactly one query placeholder.
fn validate_templates(links: &[SearchLink]) -> Result<()> {
    for link in links {
        format_search_url(&link.search_url, "test")?;
    }
    log::info!("✓ {} search URL templates OK", links.len());
    Ok(())
}
