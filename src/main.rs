//! # Run the walk-forward loop over a directory of price files
//! signal-lab run --config config/default.toml --data data/prices --output results
//!
//! # Restrict symbols and override a few parameters
//! signal-lab run --data data/prices --symbols AAPL,MSFT --horizons 1,5 --max-iterations 4
//!
//! # Print the summaries of a finished run (latest run when no id is given)
//! signal-lab report --output results --run-id run_20240105_120000

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use signal_lab::artifacts::{ArtifactStore, FsArtifactStore};
use signal_lab::walkforward::{render_report, IterationController, Phase, ProgressEvent, ProgressSink};
use signal_lab::{EngineConfig, FileAccessor, LearnerKind};

#[derive(Parser)]
#[command(name = "signal-lab")]
#[command(about = "Iterative walk-forward training and validation for price-direction models")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the training and validation loop
    Run {
        /// Path to configuration file (defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory of <SYMBOL>.parquet / <SYMBOL>.csv price files
        #[arg(short, long, default_value = "data/prices")]
        data: PathBuf,

        /// Output directory for run artifacts
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Comma-separated symbols (all files in the data directory when omitted)
        #[arg(short, long)]
        symbols: Option<String>,

        /// Run identifier (run_YYYYMMDD_HHMMSS when omitted)
        #[arg(long)]
        run_id: Option<String>,

        /// Initial lookback in business days
        #[arg(long)]
        lookback: Option<u32>,

        /// Comma-separated horizons in business days
        #[arg(long)]
        horizons: Option<String>,

        #[arg(long)]
        max_iterations: Option<usize>,

        #[arg(long)]
        target_accuracy: Option<f64>,

        /// logistic or naive_bayes
        #[arg(long)]
        learner: Option<String>,

        /// Worker threads for per-symbol work
        #[arg(long)]
        threads: Option<usize>,

        /// Hide the progress bar
        #[arg(long)]
        quiet: bool,
    },

    /// Print the summaries of a persisted run
    Report {
        /// Output directory the run was written to
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Run identifier (latest run when omitted)
        #[arg(long)]
        run_id: Option<String>,
    },
}

/// Progress bar over the current iteration.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Result<Self> {
        let bar = ProgressBar::new(1000);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {percent}% {msg}")?
                .progress_chars("=>-"),
        );
        Ok(Self { bar })
    }
}

impl ProgressSink for BarProgress {
    fn notify(&self, event: ProgressEvent) {
        self.bar
            .set_position((event.fraction_complete * 1000.0).round() as u64);
        let detail = match (&event.current_symbol, event.horizon) {
            (Some(symbol), _) => format!(" {}", symbol),
            (None, Some(h)) => format!(" {}D", h),
            (None, None) => String::new(),
        };
        self.bar
            .set_message(format!("iteration {} {:?}{}", event.iteration_index, event.phase, detail));
        if event.phase == Phase::Completed {
            self.bar.println(format!("iteration {} complete", event.iteration_index));
        }
    }
}

fn parse_list<T: std::str::FromStr>(raw: &str, what: &str) -> Result<Vec<T>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<T>()
                .map_err(|_| anyhow::anyhow!("Invalid {}: {}", what, s))
        })
        .collect()
}

fn parse_learner(raw: &str) -> Result<LearnerKind> {
    match raw {
        "logistic" => Ok(LearnerKind::Logistic),
        "naive_bayes" | "nb" => Ok(LearnerKind::NaiveBayes),
        other => bail!("Unknown learner: {} (expected logistic or naive_bayes)", other),
    }
}

#[allow(clippy::too_many_arguments)]
fn run(
    config_path: Option<PathBuf>,
    data: PathBuf,
    output: PathBuf,
    symbols: Option<String>,
    run_id: Option<String>,
    lookback: Option<u32>,
    horizons: Option<String>,
    max_iterations: Option<usize>,
    target_accuracy: Option<f64>,
    learner: Option<String>,
    threads: Option<usize>,
    quiet: bool,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => EngineConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    if let Some(days) = lookback {
        config.initial_lookback_days = days;
    }
    if let Some(raw) = horizons {
        config.horizons = parse_list(&raw, "horizon")?;
    }
    if let Some(n) = max_iterations {
        config.max_iterations = n;
    }
    if let Some(target) = target_accuracy {
        config.target_accuracy = target;
    }
    if let Some(raw) = learner {
        config.learner = parse_learner(&raw)?;
    }
    if threads.is_some() {
        config.worker_threads = threads;
    }
    config.validate().context("Invalid configuration")?;

    let accessor = Arc::new(FileAccessor::new(&data));
    let store = Arc::new(FsArtifactStore::new(&output));

    let mut controller = IterationController::new(accessor, store);
    if let Some(raw) = symbols {
        controller = controller.with_symbols(parse_list(&raw, "symbol")?);
    }
    if let Some(id) = run_id {
        controller = controller.with_run_id(id);
    }

    let progress = if quiet { None } else { Some(Arc::new(BarProgress::new()?)) };
    if let Some(sink) = &progress {
        controller = controller.with_progress(sink.clone());
    }

    let outcome = controller
        .run(&config)
        .with_context(|| format!("Walk-forward run over {} failed", data.display()))?;

    if let Some(sink) = progress {
        sink.bar.finish_and_clear();
    }

    println!("{}", outcome.summary());
    println!("Artifacts written to {}", output.join(&outcome.run_id).display());
    Ok(())
}

fn report(output: PathBuf, run_id: Option<String>) -> Result<()> {
    let store = FsArtifactStore::new(&output);
    let run_id = match run_id {
        Some(id) => id,
        None => store
            .runs()?
            .pop()
            .with_context(|| format!("No runs found in {}", output.display()))?,
    };

    let summaries = store
        .read_summaries(&run_id)
        .with_context(|| format!("Failed to read run {}", run_id))?;
    let stop_reason = store.read_manifest(&run_id).ok().map(|m| m.stop_reason);

    println!("{}", render_report(&run_id, stop_reason, &summaries));
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("signal_lab=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            data,
            output,
            symbols,
            run_id,
            lookback,
            horizons,
            max_iterations,
            target_accuracy,
            learner,
            threads,
            quiet,
        } => run(
            config,
            data,
            output,
            symbols,
            run_id,
            lookback,
            horizons,
            max_iterations,
            target_accuracy,
            learner,
            threads,
            quiet,
        ),
        Commands::Report { output, run_id } => report(output, run_id),
    }
}
