use clap::Parser;
use rss_poller::{
    config::sample_config, input::run_until, DedupStrategy, InputRegistry, LineProtocolSink,
    PollerConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "rss-poller",
    about = "Poll syndication feeds and print new entries as line protocol"
)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Feed address to poll (repeatable, replaces configured feeds)
    #[arg(long = "feed")]
    feeds: Vec<String>,

    /// Field to project (repeatable, replaces configured filters)
    #[arg(long = "filter")]
    filters: Vec<String>,

    /// Deduplication strategy: identifiers, watermark or none
    #[arg(long, value_parser = parse_strategy)]
    dedup: Option<DedupStrategy>,

    /// Forget identifiers unseen for this many hours
    #[arg(long)]
    retention_hours: Option<u64>,

    /// Seconds between poll cycles
    #[arg(long)]
    interval: Option<u64>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Print an example configuration and exit
    #[arg(long)]
    sample_config: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn parse_strategy(raw: &str) -> Result<DedupStrategy, String> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| format!("unknown strategy {:?}, expected identifiers, watermark or none", raw))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.sample_config {
        println!("{}", sample_config());
        return Ok(());
    }

    // stdout carries the records, logs go to stderr.
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => PollerConfig::load(path).map_err(|e| {
            error!("Failed to load config {}: {}", path.display(), e);
            Box::new(e) as Box<dyn std::error::Error>
        })?,
        None => PollerConfig::default(),
    };
    if !cli.feeds.is_empty() {
        config.feeds = cli.feeds;
    }
    if !cli.filters.is_empty() {
        config.filters = cli.filters;
    }
    if let Some(dedup) = cli.dedup {
        config.dedup = dedup;
    }
    if cli.retention_hours.is_some() {
        config.retention_hours = cli.retention_hours;
    }
    if let Some(interval) = cli.interval {
        config.interval_seconds = interval;
    }

    if config.feeds.is_empty() {
        warn!("No feeds configured, nothing to poll");
    }

    let registry = InputRegistry::with_defaults();
    let input = match registry.create("rss", &config, Arc::new(LineProtocolSink::stdout())) {
        Some(input) => input?,
        None => return Err("rss input is not registered".into()),
    };

    info!(
        "Starting rss-poller: {} feeds, {:?} dedup, every {}s",
        config.feeds.len(),
        config.dedup,
        config.interval_seconds
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };
    run_until(
        input.as_ref(),
        Duration::from_secs(config.interval_seconds),
        cli.once,
        shutdown,
    )
    .await;

    Ok(())
}
