// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration management for reliability runs.
//!
//! Configuration is loaded from multiple sources with the following priority
//! (later sources override earlier ones):
//!
//! 1. Built-in defaults
//! 2. config.yaml file
//! 3. Environment variables (QUBITOS_*, IBM_QUANTUM_*)
//! 4. CLI arguments

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Job orchestration settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Result ledger settings
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Derived output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// IBM Quantum connection
    #[serde(default)]
    pub ibm: IbmConfig,

    /// Experiment matrix
    #[serde(default)]
    pub experiment: ExperimentConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = config_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                config = serde_yaml::from_str(&content)?;
            }
        } else {
            for path in &[
                "config.yaml",
                "config.yml",
                "/etc/qubitos/reliability.yaml",
            ] {
                let path = Path::new(path);
                if path.exists() {
                    let content = std::fs::read_to_string(path)?;
                    config = serde_yaml::from_str(&content)?;
                    break;
                }
            }
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("QUBITOS_LEDGER_PATH") {
            self.ledger.path = PathBuf::from(val);
        }
        if let Ok(val) = env::var("QUBITOS_OUTPUT_DIR") {
            self.output.directory = PathBuf::from(val);
        }
        if let Ok(val) = env::var("QUBITOS_SHOT_COUNT") {
            if let Ok(shots) = val.parse() {
                self.orchestrator.shot_count = shots;
            }
        }
        if let Ok(val) = env::var("QUBITOS_MAX_RETRIES") {
            if let Ok(retries) = val.parse() {
                self.orchestrator.max_retries = retries;
            }
        }
        if let Ok(val) = env::var("QUBITOS_JOB_TIMEOUT_SEC") {
            if let Ok(secs) = val.parse() {
                self.orchestrator.job_timeout_sec = secs;
            }
        }
        if let Ok(val) = env::var("QUBITOS_CONCURRENCY") {
            if let Ok(n) = val.parse() {
                self.orchestrator.concurrency = n;
            }
        }
        if let Ok(val) = env::var("QUBITOS_LOG_LEVEL") {
            self.logging.level = val;
        }

        if let Ok(val) = env::var("IBM_QUANTUM_URL") {
            self.ibm.api_url = val;
        }
        if let Ok(val) = env::var("IBM_QUANTUM_TOKEN") {
            let token = val.trim();
            if !token.is_empty() {
                self.ibm.auth_token = Some(token.to_string());
            }
        }
        if let Ok(val) = env::var("IBM_QUANTUM_INSTANCE") {
            self.ibm.instance = val;
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        let orch = &self.orchestrator;
        if orch.shot_count == 0 {
            return Err(Error::Config("shot_count cannot be 0".into()));
        }
        if orch.job_timeout_sec == 0 {
            return Err(Error::Config("job_timeout_sec cannot be 0".into()));
        }
        if orch.concurrency == 0 {
            return Err(Error::Config("concurrency cannot be 0".into()));
        }
        if orch.poll_initial_ms == 0 || orch.poll_initial_ms > orch.poll_max_ms {
            return Err(Error::Config(
                "poll_initial_ms must be in 1..=poll_max_ms".into(),
            ));
        }
        if !(orch.poll_multiplier >= 1.0 && orch.poll_multiplier.is_finite()) {
            return Err(Error::Config(
                "poll_multiplier must be a finite value >= 1.0".into(),
            ));
        }

        let exp = &self.experiment;
        if exp.scenarios.is_empty() {
            return Err(Error::Config("at least one scenario is required".into()));
        }
        if exp.algorithms.is_empty() {
            return Err(Error::Config("at least one algorithm is required".into()));
        }
        if let Some(algo) = exp.algorithms.iter().find(|a| a.optimization_level > 3) {
            return Err(Error::Config(format!(
                "algorithm '{}' has optimization level {} (max 3)",
                algo.name, algo.optimization_level
            )));
        }
        if exp.distance_points < 2 {
            return Err(Error::Config("distance_points must be at least 2".into()));
        }
        if !(exp.distance_min > 0.0 && exp.distance_min <= exp.distance_max) {
            return Err(Error::Config(
                "distance range must satisfy 0 < distance_min <= distance_max".into(),
            ));
        }

        if self.ibm.auth_token.is_none() {
            tracing::warn!(
                "No IBM_QUANTUM_TOKEN configured. Remote submissions will fail \
                 authentication unless a token is provided."
            );
        }
        Ok(())
    }
}

/// Job orchestration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Shots per job
    #[serde(default = "default_shot_count")]
    pub shot_count: u32,

    /// Resubmissions allowed after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-attempt poll deadline in seconds
    #[serde(default = "default_job_timeout")]
    pub job_timeout_sec: u64,

    /// First inter-poll delay in milliseconds
    #[serde(default = "default_poll_initial_ms")]
    pub poll_initial_ms: u64,

    /// Upper bound on the inter-poll delay in milliseconds
    #[serde(default = "default_poll_max_ms")]
    pub poll_max_ms: u64,

    /// Growth factor between consecutive poll delays
    #[serde(default = "default_poll_multiplier")]
    pub poll_multiplier: f64,

    /// Experiment points in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl OrchestratorConfig {
    /// Per-attempt poll deadline.
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_sec)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            shot_count: default_shot_count(),
            max_retries: default_max_retries(),
            job_timeout_sec: default_job_timeout(),
            poll_initial_ms: default_poll_initial_ms(),
            poll_max_ms: default_poll_max_ms(),
            poll_multiplier: default_poll_multiplier(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_shot_count() -> u32 {
    256
}

fn default_max_retries() -> u32 {
    3
}

fn default_job_timeout() -> u64 {
    1800
}

fn default_poll_initial_ms() -> u64 {
    1_000
}

fn default_poll_max_ms() -> u64 {
    8_000
}

fn default_poll_multiplier() -> f64 {
    2.0
}

fn default_concurrency() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// Result ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Path of the newline-delimited JSON log
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,

    /// fsync after every append
    #[serde(default = "default_true")]
    pub fsync: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
            fsync: true,
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/raw_jobs.jsonl")
}

/// Derived output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for derived metric tables
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,

    /// Where the selected backend is persisted
    #[serde(default = "default_backend_info")]
    pub backend_info: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            backend_info: default_backend_info(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_backend_info() -> PathBuf {
    PathBuf::from("data/backend.json")
}

/// IBM Quantum connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IbmConfig {
    /// Qiskit Runtime API URL
    #[serde(default = "default_ibm_url")]
    pub api_url: String,

    /// API token (normally supplied through IBM_QUANTUM_TOKEN)
    #[serde(default, skip_serializing)]
    pub auth_token: Option<String>,

    /// Service instance
    #[serde(default = "default_ibm_instance")]
    pub instance: String,

    /// Service channel
    #[serde(default = "default_ibm_channel")]
    pub channel: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_sec: u64,
}

impl Default for IbmConfig {
    fn default() -> Self {
        Self {
            api_url: default_ibm_url(),
            auth_token: None,
            instance: default_ibm_instance(),
            channel: default_ibm_channel(),
            request_timeout_sec: default_request_timeout(),
        }
    }
}

fn default_ibm_url() -> String {
    "https://quantum.cloud.ibm.com/api".into()
}

fn default_ibm_instance() -> String {
    "QRITA".into()
}

fn default_ibm_channel() -> String {
    "ibm_quantum_platform".into()
}

fn default_request_timeout() -> u64 {
    30
}

/// A routing algorithm under comparison and the transpiler effort it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    /// Algorithm label used in axis values and tags
    pub name: String,
    /// Transpiler optimization level (0-3)
    pub optimization_level: u32,
}

impl AlgorithmConfig {
    pub fn new(name: &str, optimization_level: u32) -> Self {
        Self {
            name: name.to_string(),
            optimization_level,
        }
    }
}

/// Experiment matrix configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Time-series scenarios
    #[serde(default = "default_scenarios")]
    pub scenarios: Vec<String>,

    /// Algorithms compared in every scenario
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<AlgorithmConfig>,

    /// Epochs per (scenario, algorithm) time series
    #[serde(default = "default_epochs")]
    pub epochs: u32,

    /// SD-pair sweep values
    #[serde(default = "default_sd_pairs")]
    pub sd_pairs: Vec<u32>,

    /// Number of log-spaced distance-ratio points
    #[serde(default = "default_distance_points")]
    pub distance_points: usize,

    /// Smallest distance ratio
    #[serde(default = "default_distance_min")]
    pub distance_min: f64,

    /// Largest distance ratio
    #[serde(default = "default_distance_max")]
    pub distance_max: f64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            scenarios: default_scenarios(),
            algorithms: default_algorithms(),
            epochs: default_epochs(),
            sd_pairs: default_sd_pairs(),
            distance_points: default_distance_points(),
            distance_min: default_distance_min(),
            distance_max: default_distance_max(),
        }
    }
}

fn default_scenarios() -> Vec<String> {
    vec!["baseline".into(), "congested".into()]
}

fn default_algorithms() -> Vec<AlgorithmConfig> {
    vec![
        AlgorithmConfig::new("qrita", 1),
        AlgorithmConfig::new("classical-rr", 3),
        AlgorithmConfig::new("static-ris", 0),
    ]
}

fn default_epochs() -> u32 {
    36
}

fn default_sd_pairs() -> Vec<u32> {
    vec![10, 15, 20, 25, 30]
}

fn default_distance_points() -> usize {
    7
}

fn default_distance_min() -> f64 {
    0.01
}

fn default_distance_max() -> f64 {
    1.0
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}
