//! tmdb-harvester main entry point
//!
//! This is the command-line interface for the catalog harvester.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tmdb_harvester::config::{load_config_with_hash, Config};
use tmdb_harvester::server::{serve, shutdown_signal};
use tmdb_harvester::state::Category;
use tmdb_harvester::storage::open_storage;
use tmdb_harvester::ScrapeManager;
use tracing_subscriber::EnvFilter;

/// tmdb-harvester: a resumable, rate-paced catalog harvester
///
/// Walks the movie and show identifier spaces of the catalog API through a
/// single paced request lane, checkpointing progress in SQLite, and exposes
/// start/stop/stats control over HTTP.
#[derive(Parser, Debug)]
#[command(name = "tmdb-harvester")]
#[command(version)]
#[command(about = "A resumable, rate-paced catalog harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and print the effective settings without serving
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_serve(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("tmdb_harvester=info,tower_http=warn,warn"),
            1 => EnvFilter::new("tmdb_harvester=debug,tower_http=debug,info"),
            2 => EnvFilter::new("tmdb_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: prints the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== tmdb-harvester Dry Run ===\n");

    println!("API:");
    println!("  Base URL: {}", config.api.base_url);
    println!(
        "  Access token: {} characters (redacted)",
        config.api.access_token.len()
    );

    println!("\nPacer:");
    println!("  Minimum interval: {}ms", config.pacer.min_interval_ms);
    println!("  Request timeout: {}s", config.pacer.request_timeout_secs);

    println!("\nCrawler:");
    for category in Category::all() {
        println!(
            "  {} default max id: {}",
            category,
            category.default_max_id(&config.crawler)
        );
    }
    println!("  On fetch error: {:?}", config.crawler.on_fetch_error);

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);

    println!("\nServer:");
    println!("  Listen address: {}", config.server.listen_addr);
    println!("  Shutdown grace: {}s", config.server.shutdown_grace_secs);

    println!("\nIMDb:");
    println!("  Dataset: {}", config.imdb.dataset_url);
    println!("  Data dir: {}", config.imdb.data_dir);
    println!("  Update interval: {}h", config.imdb.update_interval_hours);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use tmdb_harvester::output::{load_statistics, print_statistics};

    println!("Database: {}\n", config.storage.database_path);

    let storage = open_storage(Path::new(&config.storage.database_path))
        .with_context(|| format!("Failed to open database {}", config.storage.database_path))?;

    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the default mode: serves the control surface until a shutdown signal
async fn handle_serve(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config
        .server
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.server.listen_addr))?;

    let storage = open_storage(Path::new(&config.storage.database_path))
        .with_context(|| format!("Failed to open database {}", config.storage.database_path))?;
    tracing::info!("Opened database {}", config.storage.database_path);

    let store = Arc::new(Mutex::new(storage));
    let manager = Arc::new(ScrapeManager::from_config(&config, store.clone())?);

    serve(addr, manager.clone(), shutdown_signal()).await?;

    tracing::info!("Shutting down...");
    manager.shut_down();

    let grace = Duration::from_secs(config.server.shutdown_grace_secs);
    if manager.wait_idle(grace).await {
        tracing::info!("All jobs stopped");
    } else {
        tracing::warn!("Exiting with jobs still running");
    }

    Ok(())
}
