//! neurarbor command-line interface.
//!
//! Summarizes, rescales and converts neurons stored as JSON records.
#![allow(clippy::uninlined_format_args)]

use clap::{ArgAction, Parser, Subcommand};
use log::{info, LevelFilter};
use neurarbor_core::{default_n_cores, Cell, ListConfig, Progress, Table};
use neurarbor_io::{load_files, load_neuron, save_neuron};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    NeurarborIo(#[from] neurarbor_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] neurarbor_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Neuron morphology toolbox.
#[derive(Parser)]
#[command(name = "neurarbor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a one-row-per-neuron summary
    Summary {
        /// Input neuron record(s)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Worker threads used for loading (defaults to all but two cores)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Print the summary as JSON records
        #[arg(long)]
        json: bool,
    },

    /// Multiply coordinates by a factor
    Scale {
        /// Input neuron record
        input: PathBuf,

        /// Scale factor
        #[arg(short, long)]
        factor: f64,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Convert coordinates to another unit
    ConvertUnits {
        /// Input neuron record
        input: PathBuf,

        /// Target unit, e.g. "um" or "nanometer"
        #[arg(long)]
        to: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

/// One JSON object per row, keyed by column name.
fn table_records(table: &Table) -> Vec<BTreeMap<&str, Cell>> {
    (0..table.n_rows())
        .filter_map(|i| table.row(i))
        .map(|row| {
            table
                .columns()
                .iter()
                .map(String::as_str)
                .zip(row)
                .collect()
        })
        .collect()
}

fn summary(files: &[PathBuf], threads: Option<usize>, json: bool) -> Result<()> {
    let n_cores = threads.unwrap_or_else(default_n_cores);
    if n_cores == 0 {
        return Err(CliError::InvalidArgument(
            "--threads must be at least 1".to_string(),
        ));
    }
    let config = ListConfig::default()
        .with_threading(n_cores > 1)
        .with_n_cores(n_cores)
        .with_progress(Progress::new(|current, total, message| {
            log::debug!("{message}: {current}/{total}");
        }));

    let start = Instant::now();
    let nl = load_files(files, config)?;
    info!(
        "loaded {} neurons in {:.2}s",
        nl.len(),
        start.elapsed().as_secs_f64()
    );

    let table = nl.summary(&[])?;
    if json {
        println!("{}", serde_json::to_string_pretty(&table_records(&table))?);
    } else {
        println!("{nl}");
        println!("{table}");
    }
    Ok(())
}

fn scale(input: &Path, factor: f64, output: &Path) -> Result<()> {
    if factor == 0.0 || !factor.is_finite() {
        return Err(CliError::InvalidArgument(format!(
            "scale factor must be finite and non-zero, got {factor}"
        )));
    }
    let mut n = load_neuron(input)?;
    n.scale(factor);
    info!("scaled {} by {factor}; units now {}", n.id(), n.units());
    save_neuron(&n, output)?;
    Ok(())
}

fn convert_units(input: &Path, to: &str, output: &Path) -> Result<()> {
    let mut n = load_neuron(input)?;
    n.convert_units(to)?;
    info!("converted {} to {}", n.id(), n.units());
    save_neuron(&n, output)?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Summary {
            files,
            threads,
            json,
        } => summary(&files, threads, json),
        Commands::Scale {
            input,
            factor,
            output,
        } => scale(&input, factor, &output),
        Commands::ConvertUnits { input, to, output } => convert_units(&input, &to, &output),
    }
}
