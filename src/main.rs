//! Sumi-Crawl main entry point
//!
//! This is the command-line interface for the Sumi-Crawl web crawler.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use sumi_crawl::config::{load_config_with_hash, validate_seeds, Config};
use sumi_crawl::crawler::{FetcherStats, Frontier, ParserStats};
use sumi_crawl::output::{generate_markdown_summary, print_snapshot, print_storage_stats};
use sumi_crawl::robots::RobotsStats;
use sumi_crawl::storage::PageStore;
use sumi_crawl::{Coordinator, CrawlSnapshot, CrawlStats};
use tracing_subscriber::EnvFilter;

/// Sumi-Crawl: a polite, concurrent web crawler
///
/// Sumi-Crawl fetches pages breadth-first from a set of seed URLs while
/// respecting robots.txt and per-domain rate limits, and stores every page
/// it fetches in a deduplicated, content-addressed store.
#[derive(Parser, Debug)]
#[command(name = "sumi-crawl")]
#[command(version)]
#[command(about = "A polite, concurrent web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Seed URL to crawl (repeatable; replaces the seeds in the config file)
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start a fresh crawl, discarding the saved frontier
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "export_summary", "search"])]
    dry_run: bool,

    /// Show statistics from the page database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary", "search"])]
    stats: bool,

    /// Generate markdown summary from existing data and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "search"])]
    export_summary: bool,

    /// List stored pages, optionally for a single domain ("*" for all)
    #[arg(long, value_name = "DOMAIN", conflicts_with_all = ["dry_run", "stats", "export_summary"])]
    search: Option<String>,

    /// Maximum number of pages --search lists
    #[arg(long, default_value_t = 20)]
    limit: u32,

    /// Number of pages --search skips
    #[arg(long, default_value_t = 0)]
    offset: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    setup_logging(cli.verbose, cli.quiet, &config.output.log_level);
    tracing::info!(
        "Configuration loaded from {} (hash: {})",
        cli.config.display(),
        config_hash
    );

    if !cli.seeds.is_empty() {
        validate_seeds(&cli.seeds)?;
        config.seeds = cli.seeds.clone();
    }

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export_summary {
        handle_export_summary(&config, &config_hash)?;
    } else if let Some(domain) = cli.search.as_deref() {
        handle_search(&config, domain, cli.limit, cli.offset)?;
    } else {
        handle_crawl(config, &config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Without a verbosity flag, `RUST_LOG` wins over the configured level.
fn setup_logging(verbose: u8, quiet: bool, configured: &str) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(format!("sumi_crawl={},warn", configured))
            }),
            1 => EnvFilter::new("sumi_crawl=debug,info"),
            2 => EnvFilter::new("sumi_crawl=trace,debug"),
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
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Crawl Dry Run ===\n");

    println!("Crawler:");
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Max pages: {}", config.crawler.max_pages);
    println!(
        "  Max concurrent requests: {}",
        config.crawler.max_concurrent_requests
    );
    println!("  Request delay: {}ms", config.crawler.request_delay);
    println!("  Request timeout: {}s", config.crawler.request_timeout);

    println!("\nPoliteness:");
    println!("  User agent: {}", config.politeness.user_agent);
    println!(
        "  Respect robots.txt: {}",
        config.politeness.respect_robots_txt
    );
    println!(
        "  Robots cache TTL: {}s",
        config.politeness.robots_cache_ttl
    );

    println!("\nFetch:");
    println!(
        "  Allowed content types: {}",
        config.fetch.allowed_content_types.join(", ")
    );
    println!("  Max file size: {} bytes", config.fetch.max_file_size);

    println!("\nFilter:");
    match &config.filter.allowed_domains {
        Some(allowed) => println!("  Allowed domains: {}", allowed.join(", ")),
        None => println!("  Allowed domains: any"),
    }
    println!(
        "  Blocked domains ({}): {}",
        config.filter.blocked_domains.len(),
        config.filter.blocked_domains.join(", ")
    );

    println!("\nOutput:");
    println!("  Storage: {}", config.output.storage_dir.display());
    println!("  Database: {}", config.output.database_path().display());
    println!("  Frontier: {}", config.output.frontier_path().display());
    println!("  Summary: {}", config.output.summary_path().display());

    println!("\nSeeds ({}):", config.seeds.len());
    for seed in &config.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the page database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let database = config.output.database_path();
    println!("Database: {}\n", database.display());

    let store = PageStore::open(&config.output.storage_dir, &database)?;
    print_storage_stats(&store.stats()?);
    Ok(())
}

/// Handles the --export-summary mode: reports on saved data without crawling
///
/// Only the frontier and storage sections carry data; the per-run counters
/// exist only while a crawl is running.
fn handle_export_summary(config: &Config, config_hash: &str) -> anyhow::Result<()> {
    let summary_path = config.output.summary_path();
    println!("=== Exporting Crawl Summary ===\n");
    println!("Database: {}", config.output.database_path().display());
    println!("Output: {}", summary_path.display());
    println!();

    let store = PageStore::open(&config.output.storage_dir, &config.output.database_path())?;
    let frontier = Frontier::open(config, &config.output.frontier_path(), false)?;

    let snapshot = CrawlSnapshot {
        crawl: CrawlStats::default(),
        frontier: frontier.stats(),
        fetcher: FetcherStats::default(),
        parser: ParserStats::default(),
        robots: RobotsStats::default(),
        storage: Some(store.stats()?),
    };
    generate_markdown_summary(&snapshot, config_hash, &summary_path)
        .with_context(|| format!("Failed to write summary to {}", summary_path.display()))?;

    println!("✓ Summary exported to: {}", summary_path.display());
    Ok(())
}

/// Handles the --search mode: lists stored pages, newest first
fn handle_search(config: &Config, domain: &str, limit: u32, offset: u32) -> anyhow::Result<()> {
    let store = PageStore::open(&config.output.storage_dir, &config.output.database_path())?;
    let domain = (domain != "*").then_some(domain);
    let records = store.search(domain, limit, offset)?;

    if records.is_empty() {
        println!("No stored pages");
        return Ok(());
    }

    for record in &records {
        println!(
            "{}  {}  {} bytes{}  {}",
            record.stored_at.format("%Y-%m-%d %H:%M:%S"),
            record.status_code,
            record.size_bytes,
            if record.is_duplicate { " (duplicate)" } else { "" },
            record.url
        );
        if let Some(title) = &record.title {
            println!("    {}", title);
        }
    }
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str, fresh: bool) -> anyhow::Result<()> {
    if config.seeds.is_empty() {
        bail!("No seed URLs: add `seeds` to the config file or pass --seed");
    }

    if fresh {
        tracing::info!("Starting fresh crawl (discarding saved frontier)");
    } else {
        tracing::info!("Starting crawl (will resume a saved frontier if one exists)");
    }

    let summary_path = config.output.summary_path();
    let seeds = config.seeds.clone();
    let coordinator = Coordinator::new(config, fresh).context("Failed to start crawler")?;

    let crawl = coordinator.crawl(&seeds);
    tokio::pin!(crawl);
    tokio::select! {
        _ = &mut crawl => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received, shutting down");
            coordinator.stop().await;
            crawl.await;
        }
    }

    let snapshot = coordinator.snapshot();
    print_snapshot(&snapshot);

    generate_markdown_summary(&snapshot, config_hash, &summary_path)
        .with_context(|| format!("Failed to write summary to {}", summary_path.display()))?;
    println!("✓ Summary written to: {}", summary_path.display());

    Ok(())
}
