//! shortpath - shorten over-long paths with junctions, symlinks and hard links.
//!
//! Usage:
//!   shortpath run <TARGET>       Scan TARGET and create short aliases
//!   shortpath run <TARGET> -n    Show what would be linked
//!   shortpath rollback           Remove every alias created so far
//!   shortpath status             Summarize the operation log
//!   shortpath --help             Show help

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use shortpath_core::{
    ConfigOverlay, LinkPreference, OperationId, ShortenConfig, default_store_path,
};
use shortpath_ops::{
    DryRunLinkCreator, FsLinkCreator, LinkCreator, Pipeline, PipelineEvent, RollbackEngine,
    RollbackSummary, RunSummary,
};
use shortpath_store::{
    JsonFileBackend, MemoryBackend, OperationLog, StatusReport, StoreBackend, StoreError,
};

#[derive(Parser)]
#[command(
    name = "shortpath",
    version,
    about = "Shorten over-long paths with short aliases",
    long_about = "shortpath finds files and directories whose full path exceeds a length \
                  limit and gives each one a short alias (junction, symbolic link or hard \
                  link) under a link root. Every alias is recorded and can be rolled back."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a directory and create aliases for over-long paths
    Run {
        /// Directory to scan
        target: PathBuf,

        /// Paths longer than this many characters are shortened
        #[arg(short = 'm', long)]
        max_length: Option<usize>,

        /// Directory in which aliases are created
        #[arg(short = 'r', long)]
        link_root: Option<PathBuf>,

        /// Link type: auto, junction, symlink or hardlink
        #[arg(short = 't', long)]
        link_type: Option<LinkPreference>,

        /// Show what would be done without changing anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Operation log location
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Glob pattern to exclude (repeatable)
        #[arg(short, long)]
        exclude: Vec<String>,

        /// Maximum recursion depth
        #[arg(short = 'd', long)]
        max_depth: Option<usize>,

        /// Maximum number of new aliases in this run
        #[arg(short, long)]
        batch: Option<usize>,
    },

    /// Remove aliases recorded in the operation log
    Rollback {
        /// Operation log location
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// Roll back only this operation
        #[arg(long)]
        id: Option<OperationId>,
    },

    /// Summarize the operation log
    Status {
        /// Operation log location
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Options for the `run` command.
struct RunArgs {
    target: PathBuf,
    dry_run: bool,
    store: PathBuf,
    config: Option<PathBuf>,
    overlay: ConfigOverlay,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    match cli.command {
        Command::Run {
            target,
            max_length,
            link_root,
            link_type,
            dry_run,
            store,
            config,
            exclude,
            max_depth,
            batch,
        } => {
            let overlay = ConfigOverlay {
                max_path_length: max_length,
                short_link_root: link_root,
                exclude_patterns: (!exclude.is_empty()).then_some(exclude),
                max_depth,
                link_preference: link_type,
                max_operations_per_batch: batch,
                ..Default::default()
            };
            let args = RunArgs {
                target,
                dry_run,
                store: store.unwrap_or_else(default_store_path),
                config,
                overlay,
            };
            run(args, cancel).await?;
        }
        Command::Rollback { store, id } => {
            let store = store.unwrap_or_else(default_store_path);
            rollback(&store, id, cancel).await?;
        }
        Command::Status { store, format } => {
            let store = store.unwrap_or_else(default_store_path);
            status(&store, format)?;
        }
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` overrides the verbosity flags.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, finishing the current item...");
            cancel.cancel();
        }
    });
}

/// Build the run configuration: defaults, then the config file, then flags.
fn load_config(file: Option<&Path>, flags: ConfigOverlay) -> Result<ShortenConfig> {
    let mut config = ShortenConfig::default();
    if let Some(file) = file {
        let overlay = ConfigOverlay::load(file)?;
        config = config
            .merge(overlay)
            .wrap_err_with(|| format!("Invalid configuration in {}", file.display()))?;
    }
    config.merge(flags).wrap_err("Invalid command line option")
}

async fn run(args: RunArgs, cancel: CancellationToken) -> Result<()> {
    let config = load_config(args.config.as_deref(), args.overlay)?;
    let target = std::path::absolute(&args.target)
        .wrap_err_with(|| format!("Invalid path {}", args.target.display()))?;

    let (mut log, creator): (OperationLog, Arc<dyn LinkCreator>) = if args.dry_run {
        (open_for_dry_run(&args.store)?, Arc::new(DryRunLinkCreator::new()))
    } else {
        let log = OperationLog::open_file(&args.store)
            .wrap_err_with(|| format!("Failed to open operation log {}", args.store.display()))?;
        (log, Arc::new(FsLinkCreator::new()))
    };

    eprintln!(
        "Scanning {} for paths over {} characters...",
        target.display(),
        config.max_path_length
    );

    let pipeline = Pipeline::new(config, creator).with_cancellation(cancel);
    let printer = tokio::spawn(print_events(pipeline.subscribe(), args.dry_run));

    let summary = pipeline
        .run(&target, &mut log)
        .await
        .wrap_err("Run aborted")?;
    drop(pipeline);
    let _ = printer.await;

    print_run_summary(&summary, args.dry_run, &log.location());
    Ok(())
}

/// Load the real store into memory so a dry run never writes it.
fn open_for_dry_run(store: &Path) -> Result<OperationLog> {
    let backend = match JsonFileBackend::new(store).load() {
        Ok(Some(document)) => MemoryBackend::with_document(document),
        Ok(None) => MemoryBackend::new(),
        Err(StoreError::Corrupt { path, message }) => {
            warn!(store = %path.display(), "Ignoring corrupt operation log: {message}");
            MemoryBackend::new()
        }
        Err(e) => return Err(e).wrap_err("Failed to read operation log"),
    };
    Ok(OperationLog::open(backend)?)
}

async fn print_events(mut rx: broadcast::Receiver<PipelineEvent>, dry_run: bool) {
    let verb = if dry_run { "would link" } else { "linked" };
    loop {
        match rx.recv().await {
            Ok(PipelineEvent::Linked {
                source,
                target,
                link_type,
                ..
            }) => {
                println!(
                    "{} {} -> {} ({})",
                    verb,
                    target.display(),
                    source.display(),
                    link_type
                );
            }
            Ok(PipelineEvent::Failed { source, message }) => {
                eprintln!("failed {}: {}", source.display(), message);
            }
            Ok(PipelineEvent::Complete(_)) => break,
            Ok(PipelineEvent::Candidate { .. }) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event output fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_run_summary(summary: &RunSummary, dry_run: bool, store: &str) {
    println!();
    println!("{}", "─".repeat(60));
    if dry_run {
        println!(" Dry run, nothing was changed");
    }
    println!(
        " {} over-long paths ({})",
        summary.scanned,
        format_size(summary.candidate_bytes)
    );
    println!(" {} linked, {} already linked", summary.linked, summary.already_linked);
    if summary.failed > 0 || summary.skipped > 0 {
        println!(" {} failed, {} skipped", summary.failed, summary.skipped);
    }
    if summary.recovered > 0 {
        println!(
            " {} operation(s) from an interrupted run settled",
            summary.recovered
        );
    }
    if summary.deferred > 0 {
        println!(
            " {} deferred by the batch limit; run again to continue",
            summary.deferred
        );
    }
    if summary.warnings > 0 {
        println!(" {} warning(s) during scan", summary.warnings);
    }
    if summary.cancelled {
        println!(" Cancelled before completion");
    }
    if !dry_run {
        println!(" Operation log: {}", store);
    }
    println!("{}", "─".repeat(60));
}

async fn rollback(store: &Path, id: Option<OperationId>, cancel: CancellationToken) -> Result<()> {
    let mut log = OperationLog::open_file(store)
        .wrap_err_with(|| format!("Failed to open operation log {}", store.display()))?;
    let engine = RollbackEngine::new(Arc::new(FsLinkCreator::new())).with_cancellation(cancel);

    let summary = match id {
        Some(id) => engine.rollback_operation(&mut log, id).await,
        None => engine.rollback_all(&mut log).await,
    }
    .wrap_err("Rollback aborted")?;

    print_rollback_summary(&summary);
    Ok(())
}

fn print_rollback_summary(summary: &RollbackSummary) {
    println!(
        "Rolled back {} operation(s): {} removed, {} already absent",
        summary.total(),
        summary.rolled_back,
        summary.already_absent
    );
    if !summary.failures.is_empty() {
        println!("{} alias(es) could not be removed:", summary.failures.len());
        for failure in &summary.failures {
            println!(
                "  {} {}: {}",
                failure.operation_id,
                failure.target.display(),
                failure.message
            );
        }
    }
    if summary.cancelled {
        println!("Cancelled before completion");
    }
}

fn status(store: &Path, format: OutputFormat) -> Result<()> {
    let document = JsonFileBackend::new(store)
        .load()
        .wrap_err_with(|| format!("Failed to read operation log {}", store.display()))?
        .unwrap_or_default();
    let report = StatusReport::from_document(&document);

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!("Operation log: {}", store.display());
            println!(
                "Operations: {} ({} success, {} failed, {} rolled back, {} in progress)",
                report.total_operations,
                report.success,
                report.failed,
                report.rolled_back,
                report.in_progress
            );
            println!(
                "Active aliases: {} of {} mappings",
                report.active_mappings, report.path_mappings
            );
            println!("Scan records: {}", report.scan_records);
            println!("Last updated: {}", report.last_updated_at.to_rfc3339());

            if !report.failures.is_empty() {
                println!();
                println!("Failed operations:");
                for op in &report.failures {
                    println!(
                        "  {} {}: {}",
                        op.id,
                        op.source_path.display(),
                        op.error_message.as_deref().unwrap_or("unknown error")
                    );
                }
            }
        }
    }

    Ok(())
}

fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
