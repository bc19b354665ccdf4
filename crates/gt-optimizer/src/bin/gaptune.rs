//! gaptune command line.
//!
//! Log filter priority: `GAPTUNE_LOG`, then `RUST_LOG`, then `--log-level`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gt_data::{read_extracted, write_comparison, ReferenceTable};
use gt_optimizer::{
    build_strategy, rmse_mae, OptimizationRunner, TemplatePreparer, TrialEvaluator, TrialPipeline,
    TuningConfig,
};
use gt_scheduler::SlurmClient;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gaptune")]
#[command(version)]
#[command(about = "Tune functional parameters against reference singlet-triplet gaps")]
struct Cli {
    /// Fallback log level when neither GAPTUNE_LOG nor RUST_LOG is set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the optimization loop against the batch scheduler
    Optimize {
        /// JSON config file (defaults to $GAPTUNE_CONFIG, then built-in defaults)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured number of trials
        #[arg(long)]
        max_trials: Option<usize>,
    },
    /// Re-score an extracted-values CSV against a reference table
    Compare {
        #[arg(long)]
        extracted: PathBuf,

        /// `molecule,S1,T1` table (defaults to the built-in benchmark values)
        #[arg(long)]
        reference: Option<PathBuf>,

        /// Where to write the comparison CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(fallback: &str) {
    let filter = std::env::var("GAPTUNE_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::try_new(fallback).unwrap_or_else(|_| EnvFilter::new("info")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn load_references(path: Option<&Path>) -> Result<ReferenceTable> {
    match path {
        Some(path) => ReferenceTable::from_csv(path)
            .with_context(|| format!("loading reference table {}", path.display())),
        None => Ok(ReferenceTable::defaults()),
    }
}

async fn optimize(config_path: Option<PathBuf>, max_trials: Option<usize>) -> Result<()> {
    let mut config = TuningConfig::load(config_path.as_deref()).context("loading configuration")?;
    if let Some(n) = max_trials {
        config = config.with_max_trials(n);
    }

    let references = load_references(config.reference.as_deref())?;
    let preparer = TemplatePreparer::from_file(&config.template, &config.geometry_dir)
        .with_context(|| format!("reading template {}", config.template.display()))?;
    let scheduler = SlurmClient::new(config.scheduler.clone());
    let strategy = build_strategy(
        &config.strategy,
        config.search_space.clone(),
        config.exploration_weight,
    )?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, abandoning outstanding waits");
            on_signal.cancel();
        }
    });

    let pipeline = TrialPipeline::new(
        &scheduler,
        &preparer,
        TrialEvaluator::new(references),
        &config,
        cancel,
    );
    let mut runner = OptimizationRunner::new(strategy, config.max_trials);
    let status = runner.run(&pipeline).await?;

    match (&status.best_parameters, status.best_loss) {
        (Some(params), Some(loss)) => println!("Best parameters: {params}\nBest RMSE: {loss}"),
        _ => println!("No trial produced a valid score"),
    }
    Ok(())
}

fn compare(extracted: &Path, reference: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let rows = read_extracted(extracted)
        .with_context(|| format!("reading extracted values {}", extracted.display()))?;
    let evaluator = TrialEvaluator::new(load_references(reference)?);
    let records: Vec<_> = rows.into_iter().map(|row| row.record).collect();
    let comparisons = evaluator.compare(&records);

    if let Some(output) = output {
        write_comparison(output, &comparisons)?;
        info!(path = %output.display(), rows = comparisons.len(), "comparison written");
    }

    for row in &comparisons {
        let diff = |v: Option<f64>| v.map_or_else(|| "none".to_string(), |v| format!("{v:.4}"));
        println!(
            "{}: S1_diff={}, T1_diff={}, S1_T1_diff={}, valid={}",
            row.molecule,
            diff(row.s1_diff),
            diff(row.t1_diff),
            diff(row.gap_diff),
            row.valid
        );
    }
    match rmse_mae(&TrialEvaluator::valid_differences(&comparisons)) {
        Some((rmse, mae)) => println!("RMSE: {rmse}, MAE: {mae}"),
        None => println!("RMSE: none, MAE: none (no valid molecules)"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Command::Optimize { config, max_trials } => optimize(config, max_trials).await,
        Command::Compare {
            extracted,
            reference,
            output,
        } => compare(&extracted, reference.as_deref(), output.as_deref()),
    }
}
