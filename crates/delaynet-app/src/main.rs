//! delaynet command-line front end
//!
//! Runs chunkwise simulations of delay-coupled Hopf networks from a JSON configuration.
//!
//! # Usage
//!
//! ```bash
//! # Run with default chunking and print a summary
//! delaynet run --config configs/two_node.json
//!
//! # Small chunks, BOLD signal, keep and write the whole trace
//! delaynet run --config configs/two_node.json --chunk-size 500 --bold --full-trace --output out.json
//!
//! # Inspect the delay matrix derived from the tract lengths
//! delaynet delays --config configs/two_node.json
//! ```

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use delaynet_core::runner::DEFAULT_CHUNK_SIZE;
use delaynet_core::{DelayMatrix, NodeSeries, NoiseState, RunOptions, SimulationOutput};
use delaynet_native::{run_with_sink, BoldParams, HopfConfig};

/// delaynet
#[derive(Parser, Debug)]
#[command(name = "delaynet")]
#[command(author, version, about = "Chunkwise simulation of delay-coupled oscillator networks", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Integrate a network and write the result as JSON
    Run {
        /// Simulation configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Fresh integration steps per chunk
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Derive the BOLD signal
        #[arg(long)]
        bold: bool,

        /// Feed raw activity to the BOLD model instead of per-chunk normalized activity
        #[arg(long, requires = "bold")]
        raw_bold: bool,

        /// Keep every chunk and write the full trace instead of a summary
        #[arg(long)]
        full_trace: bool,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the delay matrix (in steps) and the delay horizon
    Delays {
        /// Simulation configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Configuration file: a Hopf network plus optional BOLD constants
#[derive(Deserialize, Debug)]
struct ConfigFile {
    #[serde(flatten)]
    simulation: HopfConfig,
    #[serde(default)]
    bold: Option<BoldParams>,
}

/// Compact result written without `--full-trace`
#[derive(Serialize, Debug)]
struct RunSummary {
    nodes: usize,
    chunks: usize,
    elapsed_ms: f64,
    retained_samples: usize,
    final_time_ms: Option<f64>,
    final_x: Vec<f64>,
    final_y: Vec<f64>,
    final_noise: NoiseState,
    bold_times: Vec<f64>,
    bold: Vec<Vec<f64>>,
}

impl RunSummary {
    fn from_output(output: &SimulationOutput) -> Self {
        let last = |series: &NodeSeries| -> Vec<f64> {
            series
                .rows()
                .iter()
                .filter_map(|row| row.last().copied())
                .collect()
        };
        Self {
            nodes: output.x.nodes(),
            chunks: output.chunks,
            elapsed_ms: output.elapsed_ms,
            retained_samples: output.times.len(),
            final_time_ms: output.times.last().copied(),
            final_x: last(&output.x),
            final_y: last(&output.y),
            final_noise: output.noise.clone(),
            bold_times: output.hemodynamic_times.clone(),
            bold: output.hemodynamic.rows().to_vec(),
        }
    }
}

/// Delay report of the `delays` command
#[derive(Serialize, Debug)]
struct DelayReport {
    dt_ms: f64,
    signal_speed: f64,
    max_delay: usize,
    horizon: usize,
    symmetric: bool,
    delays: Vec<Vec<usize>>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("delaynet v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run {
            config,
            chunk_size,
            bold,
            raw_bold,
            full_trace,
            output,
        } => {
            let file = load_config(&config)?;
            let options = RunOptions {
                normalize_hemodynamic: !raw_bold,
                ..RunOptions::new(chunk_size, full_trace)
            };
            let bold = bold.then(|| file.bold.unwrap_or_default());

            let mut streamed = 0usize;
            let result = run_with_sink(&file.simulation, options, bold, |chunk| {
                streamed += chunk.samples();
            })
            .with_context(|| format!("simulation of {} failed", config.display()))?;
            info!(
                chunks = result.chunks,
                samples = streamed,
                elapsed_ms = result.elapsed_ms,
                "run finished"
            );

            if full_trace {
                write_json(output.as_deref(), &result)?;
            } else {
                write_json(output.as_deref(), &RunSummary::from_output(&result))?;
            }
        }
        Commands::Delays { config } => {
            let file = load_config(&config)?;
            let sim = &file.simulation;
            sim.validate()
                .with_context(|| format!("invalid configuration {}", config.display()))?;
            let delays = DelayMatrix::from_lengths(&sim.lengths, sim.signal_speed, sim.dt_ms)?;

            let report = DelayReport {
                dt_ms: sim.dt_ms,
                signal_speed: sim.signal_speed,
                max_delay: delays.max_delay(),
                horizon: delays.horizon().steps(),
                symmetric: delays.is_symmetric(),
                delays: delays.to_rows(),
            };
            write_json(None, &report)?;
        }
    }

    Ok(())
}

/// Read and parse a configuration file
fn load_config(path: &Path) -> anyhow::Result<ConfigFile> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let config: ConfigFile = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("cannot parse {}", path.display()))?;
    info!(
        path = %path.display(),
        nodes = config.simulation.nodes(),
        duration_ms = config.simulation.duration_ms,
        "configuration loaded"
    );
    Ok(config)
}

/// Pretty-print `value` to `path`, or to stdout without one
fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
            info!(path = %path.display(), "output written");
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, value)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}
