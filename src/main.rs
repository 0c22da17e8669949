// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! QubitOS Reliability Runner
//!
//! Collects hardware runs against IBM Quantum and derives EDR/LCR tables.
//!
//! # Usage
//!
//! ```bash
//! # Pick the backend for this run (writes data/backend.json)
//! qubit-os-reliability select-backend
//!
//! # Run every experiment matrix
//! qubit-os-reliability collect
//!
//! # Run only the SD-pair sweep, four points at a time
//! qubit-os-reliability collect --matrix sd-pairs --concurrency 4
//!
//! # Derive metric tables from the ledger
//! qubit-os-reliability metrics
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use qubit_os_reliability::backend::ibm::{self, client::ReqwestIbmClient, IbmExecutor};
use qubit_os_reliability::backend::{select_backend, BackendSelection};
use qubit_os_reliability::config::Config;
use qubit_os_reliability::ledger::ResultLedger;
use qubit_os_reliability::metrics::table::TIMESERIES_FILE;
use qubit_os_reliability::metrics::{MetricSynthesizer, MetricTable, SweepKind};
use qubit_os_reliability::orchestrator::JobOrchestrator;
use qubit_os_reliability::planner::{ExperimentPlanner, Matrix, RunContext, SeedState};
use qubit_os_reliability::{Result, VERSION};

/// QubitOS hardware reliability runner
#[derive(Parser)]
#[command(name = "qubit-os-reliability")]
#[command(author = "QubitOS Contributors")]
#[command(version = VERSION)]
#[command(about = "Orchestrate hardware runs and derive reliability metrics")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum MatrixArg {
    All,
    Timeseries,
    Distance,
    SdPairs,
}

impl From<MatrixArg> for Matrix {
    fn from(arg: MatrixArg) -> Self {
        match arg {
            MatrixArg::All => Matrix::All,
            MatrixArg::Timeseries => Matrix::TimeSeries,
            MatrixArg::Distance => Matrix::DistanceSweep,
            MatrixArg::SdPairs => Matrix::SdPairSweep,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Select the backend for the run and persist it
    SelectBackend,

    /// Run experiment matrices and append results to the ledger
    Collect {
        /// Matrix to run
        #[arg(long, value_enum, default_value = "all")]
        matrix: MatrixArg,

        /// Backend name (overrides the persisted selection)
        #[arg(long)]
        backend: Option<String>,

        /// Run seed (defaults to unix time mod 10000)
        #[arg(long)]
        seed: Option<u64>,

        /// Points in flight at once
        #[arg(long, env = "QUBITOS_CONCURRENCY")]
        concurrency: Option<usize>,
    },

    /// Derive metric tables from the ledger
    Metrics {
        /// Also print the tables as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show effective configuration
    Config,

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    // Initialize logging
    init_logging(&config.logging.level, &config.logging.format);

    match cli.command {
        Commands::SelectBackend => {
            config.validate()?;
            let client = ReqwestIbmClient::from_config(&config.ibm)?;
            let candidates = ibm::list_backends(&client).await?;
            let selection = select_backend(&candidates)?;
            selection.save(&config.output.backend_info)?;
            println!(
                "Selected backend: {} ({})",
                selection.backend_name,
                selection.note.as_deref().unwrap_or("-")
            );
        }

        Commands::Collect {
            matrix,
            backend,
            seed,
            concurrency,
        } => {
            if let Some(n) = concurrency {
                config.orchestrator.concurrency = n;
            }
            config.validate()?;

            let selection = match backend {
                Some(name) => BackendSelection::new(name),
                None => BackendSelection::load(&config.output.backend_info)?,
            };
            let seed = seed.map(SeedState::new).unwrap_or_else(SeedState::from_clock);

            let executor = Arc::new(IbmExecutor::from_config(
                &config.ibm,
                &selection.backend_name,
            )?);
            let ledger = Arc::new(ResultLedger::open(&config.ledger.path, config.ledger.fsync)?);
            let orchestrator = Arc::new(JobOrchestrator::new(
                executor,
                ledger,
                config.orchestrator.clone(),
            ));

            info!(
                version = VERSION,
                backend = %selection.backend_name,
                seed = seed.value(),
                ledger = %config.ledger.path.display(),
                "Starting collection"
            );

            let planner = ExperimentPlanner::new(
                orchestrator,
                config.experiment.clone(),
                RunContext::new(selection, seed),
            );
            let report = planner.run(matrix.into()).await?;
            println!("Collection finished: {report}");
        }

        Commands::Metrics { json } => {
            let ledger = ResultLedger::open(&config.ledger.path, config.ledger.fsync)?;
            let synthesizer = MetricSynthesizer::new();
            let dir = &config.output.directory;

            let timeseries = MetricTable::from(&synthesizer.compute_timeseries(&ledger)?);
            timeseries.write_csv(&dir.join(TIMESERIES_FILE))?;
            if json {
                println!("{}", timeseries.to_json()?);
            }

            for kind in [SweepKind::DistanceRatio, SweepKind::SdPairs] {
                let table = MetricTable::from(&synthesizer.compute_sweep(&ledger, kind)?);
                table.write_csv(&dir.join(kind.file_name()))?;
                if json {
                    println!("{}", table.to_json()?);
                }
            }

            println!("Wrote metric tables to {}", dir.display());
        }

        Commands::Config => {
            // Show effective configuration
            println!("{}", serde_yaml::to_string(&config)?);
        }

        Commands::Validate => match config.validate() {
            Ok(()) => {
                println!("Configuration is valid");
            }
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

/// Initialize logging with tracing.
fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if format.eq_ignore_ascii_case("json") {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}
