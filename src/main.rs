//! Podrank main entry point
//!
//! This is the command-line interface for the Podrank subscriber-count tracker.

use clap::{Parser, Subcommand};
use podrank::config::{load_config_with_hash, BatchStrategy, Config};
use podrank::crawler::CrawlService;
use podrank::schedule::{JobKind, Scheduler};
use podrank::storage::RunStatus;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Podrank: a daily subscriber-count tracker
///
/// Podrank crawls a fixed population of targets from a rate-limited source,
/// records one snapshot per target per day, and ranks each day's snapshots
/// globally and per category.
#[derive(Parser, Debug)]
#[command(name = "podrank")]
#[command(version = "1.0.0")]
#[command(about = "A daily subscriber-count tracker", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate config and show the batch plan without crawling
    Check,

    /// Crawl one batch and record its snapshots
    Crawl {
        /// Time-sliced window index (ignored by the cycle strategy)
        #[arg(long, default_value_t = 0)]
        window: usize,

        /// Snapshot date (YYYY-MM-DD), defaults to today (UTC)
        #[arg(long)]
        date: Option<String>,
    },

    /// Compute global and category ranks for a date
    Rank {
        /// Date to rank (YYYY-MM-DD), defaults to today (UTC)
        #[arg(long)]
        date: Option<String>,
    },

    /// Re-read title, feed, cover, and description from target pages
    Refresh {
        /// Only refresh the first N targets
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show statistics from the database and exit
    Stats,

    /// Run the crawl and rank schedule until Ctrl-C
    Daemon,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match cli.command {
        Command::Check => handle_check(&config)?,
        Command::Crawl { window, date } => handle_crawl(config, window, date.as_deref()).await?,
        Command::Rank { date } => handle_rank(config, date.as_deref())?,
        Command::Refresh { limit } => handle_refresh(config, limit).await?,
        Command::Stats => handle_stats(&config)?,
        Command::Daemon => handle_daemon(config).await?,
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("podrank=info,warn"),
            1 => EnvFilter::new("podrank=debug,info"),
            2 => EnvFilter::new("podrank=trace,debug"),
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

fn resolve_date(date: Option<&str>) -> podrank::Result<chrono::NaiveDate> {
    match date {
        Some(value) => podrank::parse_date(value),
        None => Ok(podrank::today()),
    }
}

/// Handles `check`: validates config and shows the batch plan
fn handle_check(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Podrank Check ===\n");

    println!("Source:");
    println!("  Page URL: {}", config.source.page_url);
    println!("  Count marker: {}", config.source.count_marker);
    println!(
        "  Plausible counts: {}..={}",
        config.source.min_plausible_count, config.source.max_plausible_count
    );
    println!(
        "  Renderer: {}",
        config
            .render
            .as_ref()
            .map(|r| r.command.as_str())
            .unwrap_or("none (static only)")
    );

    println!("\nThrottling:");
    println!(
        "  Admission: {} requests per {}s",
        config.limiter.max_requests, config.limiter.time_window_secs
    );
    println!(
        "  Pacing: {}..{}ms (mean {}ms)",
        config.pacing.min_delay_ms, config.pacing.max_delay_ms, config.pacing.base_delay_ms
    );
    println!(
        "  Retries: {} attempts, {}ms initial, x{} backoff",
        config.retry.max_attempts, config.retry.initial_delay_ms, config.retry.backoff_factor
    );

    println!("\nBatching:");
    match config.batch.strategy {
        BatchStrategy::TimeSliced => {
            println!("  Strategy: time-sliced, {} windows", config.batch.partitions)
        }
        BatchStrategy::Cycle => println!(
            "  Strategy: cycle, {} days{}",
            config.batch.cycle_length,
            config
                .batch
                .batch_size
                .map(|n| format!(", at most {} per day", n))
                .unwrap_or_default()
        ),
    }
    println!("  Max concurrency: {}", config.batch.max_concurrency);

    println!("\nSchedule:");
    let scheduler = Scheduler::from_config(config);
    for job in scheduler.jobs() {
        let label = match job.kind {
            JobKind::CrawlWindow { window } => format!("crawl window {}", window),
            JobKind::CrawlCycle => "crawl cycle slot".to_string(),
            JobKind::ComputeRanks => {
                format!("rank today-{}", config.schedule.rank_day_offset)
            }
        };
        println!("  {:<16} {}", job.trigger, label);
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nSeed Targets ({}):", config.targets.len());
    for entry in &config.targets {
        println!(
            "  - {} ({}){}",
            entry.name,
            entry.external_id,
            entry
                .category
                .as_ref()
                .map(|c| format!(" [{}]", c))
                .unwrap_or_default()
        );
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles `crawl`: runs one batch
async fn handle_crawl(
    config: Config,
    window: usize,
    date: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let date = resolve_date(date)?;
    let max_concurrency = config.batch.max_concurrency;
    let service = CrawlService::from_config(config)?;

    let run = service
        .run_cycle(service.selector(date, window), max_concurrency)
        .await?;

    println!(
        "Run #{} {}: {}/{} succeeded, {} failed",
        run.id,
        run.status.to_db_string(),
        run.success_count,
        run.total_targets,
        run.failure_count
    );

    if run.status == RunStatus::Failed {
        let message = run.error_message.unwrap_or_default();
        tracing::error!("Crawl failed: {}", message);
        return Err(message.into());
    }

    Ok(())
}

/// Handles `rank`: computes ranks for a date
fn handle_rank(config: Config, date: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let date = resolve_date(date)?;
    let service = CrawlService::from_config(config)?;
    let summary = service.compute_ranks(date)?;

    println!(
        "Ranked {} snapshots across {} categories for {}",
        summary.ranked, summary.categories, summary.date
    );

    Ok(())
}

/// Handles `refresh`: re-reads target metadata
async fn handle_refresh(
    config: Config,
    limit: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = CrawlService::from_config(config)?;
    let summary = service.refresh_metadata(limit).await?;

    println!(
        "Refreshed {} targets: {} updated, {} unchanged, {} failed",
        summary.attempted, summary.updated, summary.unchanged, summary.failed
    );

    Ok(())
}

/// Handles `stats`: shows statistics from the database
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use podrank::output::{load_statistics, print_statistics};
    use podrank::storage::open_storage;
    use std::path::Path;

    println!("Database: {}\n", config.output.database_path);

    // Open the database
    let storage = open_storage(Path::new(&config.output.database_path))?;

    // Load statistics
    let stats = load_statistics(&storage)?;

    // Print statistics
    print_statistics(&stats);

    Ok(())
}

/// Handles `daemon`: runs the schedule until interrupted
async fn handle_daemon(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut scheduler = Scheduler::from_config(&config);
    let service = Arc::new(CrawlService::from_config(config)?);

    scheduler.start(Arc::clone(&service)).await?;
    tracing::info!("Daemon running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    scheduler.shutdown().await?;
    Ok(())
}
