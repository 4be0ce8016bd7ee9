//! model-merger - merges SEModel/Cast models into one
//!
//! Picks a root model, splices every other model onto the bone its root hangs
//! from, and writes the result as `<root>.cast`.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use model_merger::{MergeOptions, run_merge};

const DEFAULT_OUTPUT_DIR: &str = "Merged Models";
const DEFAULT_LOG_FILE: &str = "ModelMerger.log";

#[derive(Parser)]
#[command(name = "model-merger")]
#[command(about = "Merges SEModels/Cast models into one")]
#[command(version)]
struct Cli {
    /// Input model files (.semodel, .cast), in any order
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory (default: "Merged Models" next to the executable)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Run log, appended to (default: ModelMerger.log next to the executable)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Resolve and encode without writing the merged model
    #[arg(long)]
    dry_run: bool,
}

/// Directory holding the executable, falling back to the working directory
fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn open_log(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

fn init_logging(log_file: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // A missing run log should not stop the merge
    let (file, log_error) = match open_log(log_file) {
        Ok(file) => (Some(file), None),
        Err(err) => (None, Some(err)),
    };
    let file_layer = file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    if let Some(err) = log_error {
        tracing::warn!("{:#}", err);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = cli
        .log_file
        .clone()
        .unwrap_or_else(|| exe_dir().join(DEFAULT_LOG_FILE));
    init_logging(&log_file);

    tracing::info!("---------------------------");
    tracing::info!("ModelMerger");
    tracing::info!("Merges SEModels/Cast models into 1");
    tracing::info!("Version {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("---------------------------");

    let options = MergeOptions {
        inputs: cli.inputs,
        output_dir: cli
            .output_dir
            .unwrap_or_else(|| exe_dir().join(DEFAULT_OUTPUT_DIR)),
        dry_run: cli.dry_run,
    };

    let report = run_merge(&options).inspect_err(|err| {
        tracing::error!("An unhandled error has occurred: {:#}", err);
    })?;
    if report.written {
        tracing::info!("Output: {}", report.output.display());
    }
    tracing::info!("Execution complete");
    Ok(())
}
