//! es-reindex CLI
//!
//! Copies documents from one Elasticsearch/OpenSearch index to another.

// CLI tool - relax pedantic lints for ergonomics
#![allow(clippy::pedantic)]

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use es_reindex::{ReindexConfig, Reindexer, Result, RunSummary};
use es_reindex::{ProvisionOutcome, TransferResult};

#[derive(Parser, Debug)]
#[command(name = "es-reindex")]
#[command(version)]
#[command(about = "Reindex documents between Elasticsearch/OpenSearch clusters", long_about = None)]
struct Cli {
    /// YAML configuration file; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Source cluster scheme (http or https)
    #[arg(long)]
    source_scheme: Option<String>,

    /// Source cluster host
    #[arg(long)]
    source_host: Option<String>,

    /// Source cluster port
    #[arg(long)]
    source_port: Option<u16>,

    /// Target cluster scheme (http or https)
    #[arg(long)]
    target_scheme: Option<String>,

    /// Target cluster host
    #[arg(long)]
    target_host: Option<String>,

    /// Target cluster port
    #[arg(long)]
    target_port: Option<u16>,

    /// Username for the source cluster
    #[arg(short, long, env = "ES_USERNAME")]
    username: Option<String>,

    /// Password for the source cluster
    #[arg(long, env = "ES_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// API key for the source cluster
    #[arg(long, env = "ES_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Username for the target cluster
    #[arg(long, env = "ES_TARGET_USERNAME")]
    target_username: Option<String>,

    /// Password for the target cluster
    #[arg(long, env = "ES_TARGET_PASSWORD", hide_env_values = true)]
    target_password: Option<String>,

    /// API key for the target cluster
    #[arg(long, env = "ES_TARGET_API_KEY", hide_env_values = true)]
    target_api_key: Option<String>,

    /// Index to read from
    #[arg(short, long)]
    source_index: Option<String>,

    /// Index to write to
    #[arg(short, long)]
    target_index: Option<String>,

    /// JSON query or search body, or @FILE to read it from a file
    #[arg(short, long, value_name = "QUERY|@FILE")]
    query: Option<String>,

    /// Transfer at most this many documents
    #[arg(short, long)]
    limit: Option<u64>,

    /// Routing key, or comma separated keys picked at random per document
    #[arg(long, value_name = "KEYS")]
    target_routing: Option<String>,

    /// Bulk writer workers
    #[arg(long)]
    num_threads: Option<usize>,

    /// Documents per bulk request
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Documents per scroll page
    #[arg(long)]
    scroll_size: Option<usize>,

    /// Scroll cursor lease, e.g. 5m
    #[arg(long)]
    scroll_keep_alive: Option<String>,

    /// Retries for transient failures, per request
    #[arg(long)]
    max_retries: Option<u32>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Create the target index and exit without transferring documents
    #[arg(long)]
    only_metadata: bool,

    /// Scan and transform without writing
    #[arg(long)]
    dry_run: bool,

    /// Write the identifiers of failed documents to FILE, one per line
    #[arg(long, value_name = "FILE")]
    failed_ids_file: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let start = Instant::now();
    match run(&cli, start).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ Reindex failed: {}", e);
            eprintln!("Execution time was {:.2}s", start.elapsed().as_secs_f64());
            ExitCode::from(e.exit_code())
        }
    }
}

/// Logs go to stderr; stdout only carries the summary.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli, start: Instant) -> Result<()> {
    let config = build_config(cli)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current batch");
                cancel.cancel();
            }
        }
    });

    info!(
        "Reindexing {}/{} -> {}/{}",
        config.source.base_url(),
        config.source_index,
        config.target.base_url(),
        config.target_index
    );
    let reindexer = Reindexer::connect(config)?.with_cancellation(cancel);
    let summary = reindexer.execute().await?;

    if let (Some(path), Some(result)) = (&cli.failed_ids_file, summary.result()) {
        write_failed_ids(path, &result.failed_ids)?;
    }

    if cli.json {
        print_json(&summary, start.elapsed())?;
    } else {
        print_summary(&summary, start.elapsed());
    }
    Ok(())
}

/// Loads the config file (if any) and applies flag overrides.
fn build_config(cli: &Cli) -> Result<ReindexConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            ReindexConfig::from_file(path)?
        }
        None => ReindexConfig::default(),
    };

    let source = &mut config.source;
    override_with(&mut source.scheme, &cli.source_scheme);
    override_with(&mut source.host, &cli.source_host);
    override_with(&mut source.port, &cli.source_port);
    override_opt(&mut source.username, &cli.username);
    override_opt(&mut source.password, &cli.password);
    override_opt(&mut source.api_key, &cli.api_key);

    let target = &mut config.target;
    override_with(&mut target.scheme, &cli.target_scheme);
    override_with(&mut target.host, &cli.target_host);
    override_with(&mut target.port, &cli.target_port);
    // Source credentials never reach the target cluster
    override_opt(&mut target.username, &cli.target_username);
    override_opt(&mut target.password, &cli.target_password);
    override_opt(&mut target.api_key, &cli.target_api_key);

    for cluster in [&mut config.source, &mut config.target] {
        override_with(&mut cluster.max_retries, &cli.max_retries);
        override_with(&mut cluster.timeout_secs, &cli.timeout);
    }

    override_with(&mut config.source_index, &cli.source_index);
    override_with(&mut config.target_index, &cli.target_index);
    override_opt(&mut config.query, &cli.query);
    override_opt(&mut config.limit, &cli.limit);
    override_opt(&mut config.routing, &cli.target_routing);

    let options = &mut config.options;
    override_with(&mut options.num_threads, &cli.num_threads);
    override_with(&mut options.chunk_size, &cli.chunk_size);
    override_with(&mut options.scroll_size, &cli.scroll_size);
    override_with(&mut options.scroll_keep_alive, &cli.scroll_keep_alive);
    options.only_metadata |= cli.only_metadata;
    options.dry_run |= cli.dry_run;

    Ok(config)
}

fn override_with<T: Clone>(slot: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *slot = value.clone();
    }
}

fn override_opt<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        slot.clone_from(value);
    }
}

fn write_failed_ids(path: &Path, ids: &[String]) -> Result<()> {
    let mut content = ids.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    std::fs::write(path, content)?;
    info!("Wrote {} failed identifiers to {:?}", ids.len(), path);
    Ok(())
}

fn print_json(summary: &RunSummary, elapsed: Duration) -> Result<()> {
    let report = serde_json::json!({
        "run": summary,
        "elapsed_secs": elapsed.as_secs_f64(),
    });
    let text = serde_json::to_string_pretty(&report).map_err(std::io::Error::from)?;
    println!("{}", text);
    Ok(())
}

fn print_summary(summary: &RunSummary, elapsed: Duration) {
    let index_line = match summary.provision() {
        ProvisionOutcome::Created => "created",
        ProvisionOutcome::AlreadyExists => "already existed",
        ProvisionOutcome::WouldCreate => "would be created (dry run)",
    };

    match summary {
        RunSummary::MetadataOnly { .. } => {
            println!("\n✅ Metadata copied, no documents transferred");
            println!("   Target index: {}", index_line);
        }
        RunSummary::Transferred { result, .. } => {
            println!("\n✅ Reindex complete!");
            println!("   Target index: {}", index_line);
            print_result(result);
        }
    }
    println!("Execution time was {:.2}s", elapsed.as_secs_f64());
}

fn print_result(result: &TransferResult) {
    println!("   Succeeded: {}", result.success);
    println!("   Failed:    {}", result.failed);
    if !result.failed_ids.is_empty() {
        println!("   Failed ids:");
        for id in &result.failed_ids {
            println!("     - {}", id);
        }
    }
}
