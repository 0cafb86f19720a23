//! annograph-import - staged annotation rows to graph mutations
//!
//! Reads an import manifest (JSON), builds one graph per speaker × discourse
//! partition and writes the resulting mutations as JSON lines. The session
//! report is printed to stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use annograph_common::config::load_config;
use annograph_common::events::StopCheck;
use annograph_import::{ImportManifest, ImportOrchestrator, JsonLinesSink};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_LEVEL: &str = "info";

/// Command-line arguments for annograph-import
#[derive(Parser, Debug)]
#[command(name = "annograph-import")]
#[command(about = "Import staged annotation rows into an annotation graph")]
#[command(version)]
struct Args {
    /// Import manifest (JSON)
    manifest: PathBuf,

    /// Config file (overrides ANNOGRAPH_CONFIG and the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Mutation output file (JSON lines)
    #[arg(short, long, default_value = "mutations.jsonl")]
    output: PathBuf,

    /// Also write the session report to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Skip the invariant checker
    #[arg(long)]
    no_check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing before loading config; RUST_LOG overrides the configured level
    let from_env = EnvFilter::try_from_default_env().ok();
    let explicit_filter = from_env.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(from_env.unwrap_or_else(|| default_filter(DEFAULT_LOG_LEVEL)));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if args.no_check {
        config.check_invariants = false;
    }
    if !explicit_filter && config.logging.level != DEFAULT_LOG_LEVEL {
        filter_handle
            .reload(default_filter(&config.logging.level))
            .context("Failed to apply configured log level")?;
    }

    info!("Starting annograph-import {}", env!("CARGO_PKG_VERSION"));
    info!("Manifest: {}", args.manifest.display());
    info!("Output: {}", args.output.display());

    let manifest = ImportManifest::load(&args.manifest).context("Failed to read import manifest")?;
    let sink = JsonLinesSink::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(token.clone()));

    let orchestrator = ImportOrchestrator::new(config, Arc::new(sink));
    let stop: Arc<dyn StopCheck> = Arc::new(token);
    let report = orchestrator.run(manifest, stop).await;

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    if let Some(path) = &args.report {
        std::fs::write(path, &json).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    println!("{}", json);

    if report.has_failures() {
        anyhow::bail!(
            "{} of {} partitions failed",
            report.count(annograph_import::PartitionStatus::Failed),
            report.partitions.len()
        );
    }
    Ok(())
}

/// Cancel the session on Ctrl+C; in-flight stages still complete
async fn cancel_on_ctrl_c(token: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            warn!("Interrupt received, stopping after in-flight stages");
            token.cancel();
        }
        Err(e) => warn!("Failed to install Ctrl+C handler: {}", e),
    }
}

fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("annograph_import={0},annograph_common={0}", level))
}
