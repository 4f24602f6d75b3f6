//! Sitemap-Crawler main entry point
//!
//! This is the command-line interface for the Sitemap-Crawler site mapper.

use anyhow::Context;
use clap::Parser;
use sitemap_crawler::config::{load_config_with_hash, validate, CrawlConfig};
use sitemap_crawler::crawler::{Coordinator, CrawlResult, ProgressChannel, ProgressEvent};
use sitemap_crawler::output::{
    generate_markdown_report, print_statistics, write_json, CrawlStatistics,
};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// Sitemap-Crawler: a bounded single-site mapper
///
/// Sitemap-Crawler visits every page reachable from a seed URL within the
/// same site and base path, records title, description, heading and
/// response metadata per page, and optionally captures screenshots.
#[derive(Parser, Debug)]
#[command(name = "sitemap-crawler")]
#[command(version = "1.0.0")]
#[command(about = "A bounded single-site mapper", long_about = None)]
struct Cli {
    /// Seed URL to start crawling from
    #[arg(value_name = "URL")]
    url: String,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the maximum link depth
    #[arg(long, value_name = "N")]
    max_depth: Option<u32>,

    /// Override the page cap
    #[arg(long, value_name = "N")]
    max_pages: Option<usize>,

    /// Override the number of concurrent requests
    #[arg(long, value_name = "N")]
    max_connections: Option<usize>,

    /// Capture a screenshot of every page
    #[arg(long)]
    screenshots: bool,

    /// Write the full result as JSON
    #[arg(short, long, value_name = "FILE.json")]
    output: Option<PathBuf>,

    /// Write a markdown report
    #[arg(long, value_name = "FILE.md")]
    report: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = build_config(&cli)?;
    let progress = ProgressChannel::default();
    let coordinator = Coordinator::new(&cli.url, config)
        .with_context(|| format!("Cannot crawl {}", cli.url))?
        .with_progress(progress.clone());

    // Ctrl-C stops dispatching and returns partial results
    let stop = coordinator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping crawl");
            stop.stop();
        }
    });

    let reporter = tokio::spawn(report_progress(progress.subscribe()));

    let result = match coordinator.run().await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };
    // Last sender gone: the reporter drains what is buffered and exits
    drop(progress);
    let _ = reporter.await;

    handle_result(&cli, result)
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sitemap_crawler=info,warn"),
            1 => EnvFilter::new("sitemap_crawler=debug,info"),
            2 => EnvFilter::new("sitemap_crawler=trace,debug"),
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

/// Loads the config file if given, then applies command-line overrides
fn build_config(cli: &Cli) -> anyhow::Result<CrawlConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => CrawlConfig::default(),
    };

    if let Some(depth) = cli.max_depth {
        config.crawler.max_depth = depth;
    }
    if let Some(pages) = cli.max_pages {
        config.crawler.max_pages = pages;
    }
    if let Some(connections) = cli.max_connections {
        config.crawler.max_connections = connections;
    }
    if cli.screenshots {
        config.screenshots.enabled = true;
    }

    validate(&config)?;
    Ok(config)
}

/// Logs every progress event until the channel closes
async fn report_progress(mut events: tokio::sync::broadcast::Receiver<ProgressEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match (&event.pages_found, &event.queue_size) {
                (Some(found), Some(queued)) => tracing::info!(
                    "[{:>3}%] {} (pages: {}, queued: {})",
                    event.percentage,
                    event.message,
                    found,
                    queued
                ),
                _ => tracing::info!("[{:>3}%] {}", event.percentage, event.message),
            },
            Err(RecvError::Lagged(missed)) => {
                tracing::debug!("Progress reporter skipped {} events", missed)
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Prints statistics and writes the requested outputs
fn handle_result(cli: &Cli, mut result: CrawlResult) -> anyhow::Result<()> {
    if !cli.quiet {
        print_statistics(&CrawlStatistics::from_result(&result));
    }

    if let Some(path) = &cli.output {
        write_json(&result, path)?;
        println!("✓ Result written to: {}", path.display());
    }

    if let Some(path) = &cli.report {
        generate_markdown_report(&result, path)?;
        println!("✓ Report written to: {}", path.display());
    }

    if result.artifact_dir().is_some() {
        // Exported descriptors point into the scratch directory
        if cli.output.is_some() {
            if let Some(dir) = result.persist_artifacts() {
                println!("✓ Screenshots kept in: {}", dir.display());
            }
            return Ok(());
        }
        println!(
            "{} screenshots captured (discarded, use --output to keep them)",
            result.screenshot_artifacts.len()
        );
    }
    result.cleanup()?;

    Ok(())
}
