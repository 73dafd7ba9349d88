//! CLI command definitions for the dynophore pipeline.
//!
//! This module provides the command-line surface for running the dynamic
//! e-pharmacophore workflow over MD trajectory frames and for re-running
//! artifact collection on its own.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::collect::collect_hypotheses;
use crate::config::{ConfigError, RunConfig, Workspace};
use crate::frame::select_frames;
use crate::pipeline::{FrameReport, PipelineContext};
use crate::scheduler::{BatchScheduler, RunStats};
use crate::stage::StageRunner;
use crate::suite::SchrodingerSuite;
use crate::waiter::ArtifactWaiter;

/// Filename of the machine-readable summary written after every run.
const RUN_SUMMARY_FILE: &str = "run_summary.json";

/// Dynamic e-pharmacophore workflow over MD trajectory frames.
#[derive(Parser)]
#[command(name = "dynophore")]
#[command(about = "Generate e-pharmacophore hypotheses from MD trajectory frames")]
#[command(version)]
#[command(
    long_about = "dynophore drives every selected trajectory frame through preparation, \
ligand/receptor splitting, grid generation, and e-pharmacophore hypothesis generation \
using a locally installed Schrodinger suite, then gathers the per-frame hypotheses \
into a single collection.\n\nExample usage:\n  dynophore run --start 1 --end 100 --step 5"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Select frames and drive each through the full stage pipeline.
    Run(RunArgs),

    /// Gather finished hypothesis artifacts without running any stages.
    ///
    /// Collection is idempotent: re-running it against an unchanged
    /// working directory overwrites the collection in place.
    Collect(CollectArgs),
}

/// Arguments for `dynophore run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Start frame index (inclusive).
    #[arg(long)]
    pub start: u32,

    /// End frame index (inclusive).
    #[arg(long)]
    pub end: u32,

    /// Stride between selected frame indices.
    #[arg(long, default_value = "1")]
    pub step: u32,

    /// CPU core budget (default: 75% of available cores).
    #[arg(long)]
    pub ncores: Option<usize>,

    /// Frames per batch (default: same as the core budget).
    #[arg(short = 'b', long)]
    pub batch_size: Option<usize>,

    /// Cores reserved per worker for the stage programs' own threads;
    /// the worker pool width is ncores divided by this.
    #[arg(long, default_value = "2")]
    pub stage_headroom: usize,

    /// Niceness increment applied to every stage program.
    #[arg(long, default_value = "10")]
    pub nice_level: i32,

    /// Protonation pH passed to the preparation stage.
    #[arg(long, default_value = "7.4")]
    pub ph: f64,

    /// Maximum number of pharmacophore features per hypothesis.
    #[arg(long, default_value = "7")]
    pub max_features: u32,

    /// Seconds between scans while waiting for a grid archive.
    #[arg(long, default_value = "2")]
    pub poll_interval: u64,

    /// Maximum seconds to wait for a grid archive before failing the frame.
    #[arg(long, default_value = "3600")]
    pub grid_timeout: u64,

    /// Base directory holding input_mae_files/ and DYNOPHORE_ANALYSIS/.
    #[arg(long, default_value = ".")]
    pub base_dir: PathBuf,

    /// Schrodinger suite root (default: $SCHRODINGER18, then $SCHRODINGER18_4,
    /// then /opt/schrodinger2018-4).
    #[arg(long, env = "SCHRODINGER18")]
    pub suite_root: Option<PathBuf>,

    /// Output the run summary as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `dynophore collect`.
#[derive(Parser, Debug)]
pub struct CollectArgs {
    /// Base directory holding input_mae_files/ and DYNOPHORE_ANALYSIS/.
    #[arg(long, default_value = ".")]
    pub base_dir: PathBuf,

    /// Output the collection summary as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before
/// running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => {
            run_pipeline_command(args).await?;
        }
        Commands::Collect(args) => {
            run_collect_command(args).await?;
        }
    }
    Ok(())
}

// ============================================================================
// Run Command Implementation
// ============================================================================

#[derive(Debug, Serialize)]
struct RunSummary {
    status: String,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    selected: usize,
    attempted: usize,
    succeeded: usize,
    failed: usize,
    cleanups: usize,
    collected: usize,
    reports: Vec<FrameReport>,
}

impl RunSummary {
    fn new(stats: RunStats, collected: usize, started_at: DateTime<Utc>) -> Self {
        // A cancel during the final batch leaves every frame attempted,
        // so the status comes from the observed cancel flag instead of
        // the attempted count.
        let status = if stats.cancelled {
            "cancelled"
        } else {
            "complete"
        };
        Self {
            status: status.to_string(),
            started_at,
            finished_at: Utc::now(),
            selected: stats.selected,
            attempted: stats.attempted,
            succeeded: stats.succeeded,
            failed: stats.failed,
            cleanups: stats.cleanups,
            collected,
            reports: stats.reports,
        }
    }
}

/// Builds the validated run configuration from the CLI arguments.
///
/// `--ncores` falls back to the default core budget, and `--batch-size`
/// falls back to whatever the core budget resolved to.
fn build_run_config(args: &RunArgs) -> Result<RunConfig, ConfigError> {
    let mut config = RunConfig::new()
        .with_range(args.start, args.end)
        .with_step(args.step)
        .with_stage_headroom(args.stage_headroom)
        .with_nice_level(args.nice_level)
        .with_propka_ph(args.ph)
        .with_poll_interval(Duration::from_secs(args.poll_interval))
        .with_grid_timeout(Duration::from_secs(args.grid_timeout));
    if let Some(ncores) = args.ncores {
        config = config.with_ncores(ncores);
    }
    let batch_size = args.batch_size.unwrap_or(config.ncores);
    config = config.with_batch_size(batch_size);
    config.hypothesis.max_features = args.max_features;
    config.validate()?;
    Ok(config)
}

async fn run_pipeline_command(args: RunArgs) -> anyhow::Result<()> {
    let started_at = Utc::now();
    let config = build_run_config(&args)?;

    let suite = match &args.suite_root {
        Some(root) => SchrodingerSuite::new(root)?,
        None => SchrodingerSuite::discover()?,
    };
    info!(suite = %suite.root().display(), "Using Schrodinger suite");

    let workspace = Workspace::under(&args.base_dir);
    workspace.ensure()?;

    let frames = select_frames(&workspace.input_dir, config.start, config.end, config.step)?;
    info!(
        frames = frames.len(),
        start = config.start,
        end = config.end,
        step = config.step,
        workers = config.worker_slots(),
        "Frame selection complete"
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, cancelling run");
                let _ = cancel_tx.send(true);
            }
            Err(error) => {
                warn!(error = %error, "Interrupt handler unavailable");
                // Hold the channel open; a dropped sender reads as a cancel.
                std::future::pending::<()>().await;
            }
        }
    });

    let stages = StageRunner::new(config.nice_level);
    let waiter = ArtifactWaiter::new(config.poll_interval, config.grid_timeout);
    let processed_dir = workspace.processed_dir();
    let ctx = PipelineContext {
        suite: &suite,
        stages: &stages,
        waiter: &waiter,
        config: &config,
        workdir: &processed_dir,
    };

    let stats = BatchScheduler::new(ctx).run(&frames, &cancel_rx).await;

    let collected = collect_hypotheses(&processed_dir, &workspace.hypothesis_dir())?;
    let summary = RunSummary::new(stats, collected.len(), started_at);

    let summary_json = serde_json::to_string_pretty(&summary)?;
    fs::write(
        workspace.analysis_dir.join(RUN_SUMMARY_FILE),
        &summary_json,
    )?;

    info!(
        attempted = summary.attempted,
        succeeded = summary.succeeded,
        failed = summary.failed,
        collected = summary.collected,
        status = %summary.status,
        "Run finished"
    );

    if args.json {
        println!("{}", summary_json);
        return Ok(());
    }

    println!("✓ Pipeline run {}", summary.status);
    println!("  Frames selected:  {}", summary.selected);
    println!("  Frames attempted: {}", summary.attempted);
    println!("  Succeeded:        {}", summary.succeeded);
    println!("  Failed:           {}", summary.failed);
    println!("  Hypotheses saved: {}", summary.collected);
    for report in summary.reports.iter().filter(|r| !r.succeeded()) {
        println!(
            "    frame {} failed at {}: {}",
            report.index,
            report.failed_stage.as_deref().unwrap_or("?"),
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

// ============================================================================
// Collect Command Implementation
// ============================================================================

#[derive(Debug, Serialize)]
struct CollectOutput {
    status: String,
    collected: usize,
    destination: PathBuf,
}

async fn run_collect_command(args: CollectArgs) -> anyhow::Result<()> {
    let workspace = Workspace::under(&args.base_dir);
    workspace.ensure()?;

    let destination = workspace.hypothesis_dir();
    let collected = collect_hypotheses(&workspace.processed_dir(), &destination)?;

    let output = CollectOutput {
        status: "complete".to_string(),
        collected: collected.len(),
        destination,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("✓ Collected {} hypotheses", output.collected);
        println!("  Destination: {}", output.destination.display());
    }
    Ok(())
}
