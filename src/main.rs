//! Relay-Atlas main entry point
//!
//! This is the command-line interface for the Relay-Atlas relay crawler.

use anyhow::Context;
use clap::Parser;
use relay_atlas::config::{load_config_with_hash, validate, Config};
use relay_atlas::crawler::{run_crawl, StartMode};
use relay_atlas::output::{export_from_storage, load_statistics, print_statistics};
use relay_atlas::storage::open_storage;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Relay-Atlas: a Nostr relay crawler
///
/// Relay-Atlas asks known relays for relay-list events, classifies every
/// advertised relay and keeps crawling the reachable ones until no new
/// relays turn up.
#[derive(Parser, Debug)]
#[command(name = "relay-atlas")]
#[command(version)]
#[command(about = "Discovers and catalogs Nostr relays", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an interrupted crawl; this is already the default, so the flag
    /// only documents intent and rules out --fresh
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, discarding checkpointed relays
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Seed relay URL; repeat for several (replaces configured seeds)
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Deepest discovery level to fetch
    #[arg(long, value_name = "DEPTH")]
    max_depth: Option<u32>,

    /// Maximum simultaneous relay connections
    #[arg(long, value_name = "N")]
    concurrency: Option<u32>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "export"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export"])]
    stats: bool,

    /// Write per-category CSV files from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export: bool,
}

impl Cli {
    /// Applies command-line overrides on top of the loaded configuration
    fn apply_overrides(&self, config: &mut Config) {
        if !self.seeds.is_empty() {
            config.seeds = self.seeds.clone();
        }
        if let Some(depth) = self.max_depth {
            config.crawler.max_depth = Some(depth);
        }
        if let Some(concurrency) = self.concurrency {
            config.crawler.max_concurrent_fetches = concurrency;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    // Without a process-wide provider rustls cannot build TLS client configs
    let _ = rustls::crypto::ring::default_provider().install_default();

    let (mut config, config_hash) = load_config_with_hash(cli.config.as_deref())
        .with_context(|| match &cli.config {
            Some(path) => format!("Failed to load configuration from {}", path.display()),
            None => "Failed to build default configuration".to_string(),
        })?;
    cli.apply_overrides(&mut config);
    validate(&config).context("Invalid command-line overrides")?;
    tracing::debug!(hash = %config_hash, "Configuration loaded");
    if cli.resume {
        tracing::debug!("Resume requested explicitly");
    }

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.export {
        handle_export(&config)
    } else {
        handle_crawl(config, &config_hash, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("relay_atlas=info,warn"),
            1 => EnvFilter::new("relay_atlas=debug,info"),
            2 => EnvFilter::new("relay_atlas=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Relay-Atlas Dry Run ===\n");

    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("Effective configuration:\n");
    println!("{}", rendered);

    let seeds = config.seeds_or_default();
    println!("Seeds used when no checkpoint exists ({}):", seeds.len());
    for seed in &seeds {
        println!("  - {} ({})", seed, relay_atlas::classify(seed));
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))
        .context("Failed to open checkpoint database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export mode: writes CSV partitions from the database
fn handle_export(config: &Config) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.output.database_path))
        .context("Failed to open checkpoint database")?;
    let dir = Path::new(&config.output.export_dir);

    let exported = export_from_storage(&storage, dir)?;
    for file in &exported {
        println!("  {} ({} relays)", file.path.display(), file.rows);
    }
    println!("✓ Exported {} files to {}", exported.len(), dir.display());

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str, fresh: bool) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping crawl and saving state");
            on_signal.cancel();
        }
    });

    let report = run_crawl(config, config_hash, fresh, cancel)
        .await
        .context("Crawl failed")?;

    let mode = match report.start_mode {
        StartMode::Fresh => "fresh",
        StartMode::Resume => "resumed",
        StartMode::NewSweep => "new sweep",
    };
    tracing::info!(
        run = report.run_id,
        mode,
        status = report.status.to_db_string(),
        found = report.counts.total,
        crawled = report.counts.crawled(),
        offline = report.counts.offline(),
        "Done"
    );

    Ok(())
}
