use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use seqprep::data::{load_feature_table, write_split};
use seqprep::logging::init_tracing;
use seqprep::pipeline::{Segmenter, SampleBatch};
use seqprep::types::MoveClass;
use seqprep::{DatasetPipeline, PipelineConfig, PipelineReport, ScalerState, ScalingMode, Split};

#[derive(Parser)]
#[command(name = "seqprep")]
#[command(author = "Trading Bot")]
#[command(version = "0.1.0")]
#[command(about = "Builds labelled, scaled sequence tensors from minute-level order book features", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Window, label, scale and batch one split
    Prepare {
        /// Feature table (CSV with a minute timestamp column)
        #[arg(short, long)]
        input: PathBuf,
        /// Split name: train or validation
        #[arg(short, long, default_value = "train")]
        split: Split,
        /// Frozen scaler state; required for every split except train
        #[arg(long)]
        scaler_state: Option<PathBuf>,
        /// Output directory for the tensors and the scaler state
        #[arg(short, long, default_value = "prepared")]
        output: PathBuf,
    },
    /// Show how a feature table splits into contiguous runs and windows
    Windows {
        /// Feature table (CSV with a minute timestamp column)
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs)?;

    info!("seqprep v{}", env!("CARGO_PKG_VERSION"));
    let config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Prepare {
            input,
            split,
            scaler_state,
            output,
        } => prepare(config, &input, split, scaler_state, &output),
        Commands::Windows { input } => show_windows(&config, &input),
    }
}

fn prepare(
    mut config: PipelineConfig,
    input: &Path,
    split: Split,
    scaler_state: Option<PathBuf>,
    output: &Path,
) -> Result<()> {
    let table = load_feature_table(input, &config).with_context(|| format!("failed to load {:?}", input))?;

    let frozen = match (split, scaler_state) {
        (_, Some(path)) => Some(ScalerState::load(&path).with_context(|| format!("failed to load scaler state {:?}", path))?),
        (Split::Train, None) => None,
        (_, None) if config.scaling.enabled => {
            bail!("--scaler-state is required for the {} split; refitting outside training leaks", split)
        }
        (_, None) => None,
    };
    if frozen.is_some() && split == Split::Train {
        warn!("Applying an existing scaler state to the train split");
    }
    if frozen.is_none() && config.scaling.enabled && config.scaling.state_path.is_none() {
        config.scaling.state_path = Some(output.join("scaler_state.json"));
    }

    let pipeline = DatasetPipeline::new(config)?;
    let mode = match &frozen {
        Some(state) => ScalingMode::Apply(state),
        None => ScalingMode::Fit,
    };
    let prepared = pipeline.run(&table, mode).context("pipeline failed")?;

    let artifacts = write_split(output, split, &prepared.batch, &prepared.report)?;
    print_summary(split, &prepared.batch, &prepared.report);
    println!("X: {:?}", artifacts.x);
    println!("y: {:?}", artifacts.y);
    if let Some(path) = prepared
        .scaler_state
        .as_ref()
        .and(pipeline.config().scaling.state_path.as_ref())
    {
        println!("Scaler state: {:?}", path);
    }
    Ok(())
}

fn print_summary(split: Split, batch: &SampleBatch, report: &PipelineReport) {
    println!("\n=== {} split ===", split);
    println!("{:<22} {:>10}", "Rows", report.rows);
    println!("{:<22} {:>10}", "Raw windows", report.raw_windows);
    println!("{:<22} {:>10}", "Empty after warm-up", report.empty_windows);
    println!("{:<22} {:>10}", "Derived length", report.derived_length);
    println!("{:<22} {:>10}", "Rebatched windows", report.rebatched_windows);
    println!("{:<22} {:>10}", "Samples", report.samples);
    println!(
        "{:<22} {:>10}",
        "Shape",
        format!("{}x{}x{}", batch.len(), batch.timesteps(), batch.features())
    );
    println!("{}", "-".repeat(33));
    for class in MoveClass::all() {
        let count = report.class_counts[class.as_u8() as usize];
        let share = if report.samples > 0 {
            count as f64 / report.samples as f64 * 100.0
        } else {
            0.0
        };
        println!("{} {:<18} {:>6} {:>5.1}%", class.as_u8(), class.description(), count, share);
    }
    println!();
}

fn show_windows(config: &PipelineConfig, input: &Path) -> Result<()> {
    let table = load_feature_table(input, config).with_context(|| format!("failed to load {:?}", input))?;
    let segmenter = Segmenter::new(config.windowing.sequence_length);
    let runs = segmenter.runs(&table);
    let windows = segmenter.segment(&table);

    println!("\n=== Contiguous runs ===");
    println!("{:<6} {:<27} {:<27} {:>8}", "Run", "Start", "End", "Rows");
    println!("{}", "-".repeat(71));
    for (i, &(start, end)) in runs.iter().enumerate() {
        println!(
            "{:<6} {:<27} {:<27} {:>8}",
            i,
            table.index()[start].to_rfc3339(),
            table.index()[end - 1].to_rfc3339(),
            end - start
        );
    }
    println!("{}", "=".repeat(71));
    println!(
        "{} rows, {} runs, {} windows of {} minutes (shortest usable: {})",
        table.len(),
        runs.len(),
        windows.len(),
        config.windowing.sequence_length,
        config.min_sequence_length()
    );
    Ok(())
}
