//! Burrow main entry point
//!
//! This is the command-line interface for the Burrow incremental crawler.

use anyhow::Context;
use burrow::config::{load_config_with_hash, Config};
use burrow::crawler::{Crawler, CrawlerHandler, SubCrawlerHandler};
use burrow::report::{CrawlReport, ExitCode};
use burrow::resource::Resource;
use burrow::source::{DataSource, FileSystemSource};
use burrow::store::{FingerprintStore, SqliteFingerprintStore};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Burrow: an incremental content crawler
///
/// Burrow walks a directory, unwraps archives, compressed files, mailboxes
/// and contact lists, and reports each resource once per change. Fingerprints
/// are kept between runs so unchanged resources are skipped.
#[derive(Parser, Debug)]
#[command(name = "burrow")]
#[command(version = "1.0.0")]
#[command(about = "An incremental content crawler", long_about = None)]
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

    /// Forget every recorded fingerprint and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    clear: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["clear", "stats"])]
    dry_run: bool,

    /// Show the report of the last run and exit
    #[arg(long, conflicts_with_all = ["clear", "dry_run"])]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<std::process::ExitCode> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config, &hash)?;
        return Ok(std::process::ExitCode::SUCCESS);
    }
    if cli.stats {
        handle_stats(&config)?;
        return Ok(std::process::ExitCode::SUCCESS);
    }

    let exit_code = if cli.clear {
        handle_clear(config).await?
    } else {
        handle_crawl(config).await?
    };
    Ok(std::process::ExitCode::from(exit_code.process_code()))
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("burrow=info,warn"),
            1 => EnvFilter::new("burrow=debug,info"),
            2 => EnvFilter::new("burrow=trace,debug"),
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

/// Handler logging every crawl event
#[derive(Debug, Default)]
struct LoggingHandler {
    seen: u64,
}

impl LoggingHandler {
    fn release(&mut self, mut resource: Resource) {
        self.seen += 1;
        resource.dispose();
    }
}

impl SubCrawlerHandler for LoggingHandler {
    fn object_new(&mut self, resource: Resource) {
        tracing::info!(
            "new: {} ({})",
            resource.id(),
            resource.content_type().unwrap_or("unknown type")
        );
        self.release(resource);
    }

    fn object_changed(&mut self, resource: Resource) {
        tracing::info!(
            "changed: {} ({})",
            resource.id(),
            resource.content_type().unwrap_or("unknown type")
        );
        self.release(resource);
    }

    fn object_not_modified(&mut self, id: &str) {
        tracing::debug!("unchanged: {}", id);
    }
}

impl CrawlerHandler for LoggingHandler {
    fn accessing_object(&mut self, id: &str) {
        tracing::trace!("accessing: {}", id);
    }

    fn object_removed(&mut self, id: &str) {
        tracing::info!("removed: {}", id);
    }

    fn clearing_object(&mut self, id: &str) {
        tracing::debug!("clearing: {}", id);
    }

    fn clear_finished(&mut self, exit_code: ExitCode) {
        tracing::info!("Clear finished: {}", exit_code);
    }

    fn crawl_stopped(&mut self, exit_code: ExitCode) {
        tracing::info!("Crawl stopped: {} ({} resources delivered)", exit_code, self.seen);
    }
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, hash: &str) -> anyhow::Result<()> {
    println!("=== Burrow Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Sniff bytes: {}", config.crawler.sniff_bytes);

    println!("\nSource:");
    println!("  Root: {}", config.source.root.display());
    println!("  Follow symlinks: {}", config.source.follow_symlinks);
    println!("  Include hidden: {}", config.source.include_hidden);

    println!("\nState:");
    println!("  Fingerprints: {}", config.state.fingerprint_path.display());
    match &config.state.report_path {
        Some(path) => println!("  Report: {}", path.display()),
        None => println!("  Report: (not saved)"),
    }

    let source = FileSystemSource::from_config(&config.source);
    let mut count = 0usize;
    for entry in source.entries()? {
        entry?;
        count += 1;
    }

    println!("\n✓ Configuration is valid (hash: {})", hash);
    println!("✓ Would crawl {} top-level files", count);

    Ok(())
}

/// Handles the --stats mode: shows the last saved report
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let store = SqliteFingerprintStore::open(&config.state.fingerprint_path)?;
    println!("Fingerprints: {}", config.state.fingerprint_path.display());
    println!("  Known resources: {}\n", store.len());

    let Some(path) = &config.state.report_path else {
        println!("No report path configured");
        return Ok(());
    };
    if !path.exists() {
        println!("No report saved at {}", path.display());
        return Ok(());
    }

    let report = CrawlReport::load(path)?;
    println!("Last run ({}):", path.display());
    println!("  Started: {}", report.started_at.to_rfc3339());
    if let Some(stopped) = report.stopped_at {
        println!("  Stopped: {}", stopped.to_rfc3339());
    }
    match report.exit_code {
        Some(code) => println!("  Exit code: {}", code),
        None => println!("  Exit code: (unfinished)"),
    }
    println!("  New: {}", report.new_count);
    println!("  Changed: {}", report.changed_count);
    println!("  Unchanged: {}", report.unchanged_count);
    println!("  Removed: {}", report.removed_count);

    Ok(())
}

/// Handles the main crawl operation
///
/// The crawl runs on a blocking worker; Ctrl-C asks it to stop after the
/// resource it is visiting.
async fn handle_crawl(config: Config) -> anyhow::Result<ExitCode> {
    tracing::info!("Starting crawl of {}", config.source.root.display());

    let mut crawler = Crawler::from_config(&config);
    let stop = crawler.stop_handle();
    let mut worker = tokio::task::spawn_blocking(move || {
        let mut handler = LoggingHandler::default();
        crawler.crawl(&mut handler)
    });

    let exit_code = tokio::select! {
        result = &mut worker => result??,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupt received, stopping crawl");
            stop.cancel();
            worker.await??
        }
    };

    if !exit_code.is_complete() {
        tracing::error!("Crawl ended with {}", exit_code);
    }
    Ok(exit_code)
}

/// Handles the --clear mode: forgets every recorded fingerprint
async fn handle_clear(config: Config) -> anyhow::Result<ExitCode> {
    let mut crawler = Crawler::from_config(&config);
    let stop = crawler.stop_handle();
    let mut worker = tokio::task::spawn_blocking(move || {
        let mut handler = LoggingHandler::default();
        crawler.clear(&mut handler)
    });

    let exit_code = tokio::select! {
        result = &mut worker => result??,
        _ = tokio::signal::ctrl_c() => {
            stop.cancel();
            worker.await??
        }
    };
    Ok(exit_code)
}
