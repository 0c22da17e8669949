// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! QubitOS Reliability Runner
//!
//! This crate orchestrates repeated benchmark jobs against a remote quantum
//! backend, keeps an append-only ledger of every attempt, and derives two
//! reliability metrics from the measured outcome distributions: EDR
//! (entanglement-distribution rate) and LCR (latency compliance ratio).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          ExperimentPlanner              │
//! │  (time series, distance, SD-pair sweep) │
//! ├─────────────────────────────────────────┤
//! │           JobOrchestrator               │
//! │   (submit / poll / retry / timeout)     │
//! ├──────────────────┬──────────────────────┤
//! │  RemoteExecutor  │    ResultLedger      │
//! │  (IBM, reqwest)  │    (JSONL, fsync)    │
//! └──────────────────┴──────────┬───────────┘
//!                               │
//!                     MetricSynthesizer
//!                     (EDR / LCR tables)
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration management
//! - [`backend`]: Remote executor trait, circuits, IBM executor
//! - [`ledger`]: Job records and the append-only result ledger
//! - [`orchestrator`]: Per-point submit/poll/retry state machine
//! - [`planner`]: Experiment matrices and run context
//! - [`metrics`]: EDR/LCR synthesis and table output
//! - [`validation`]: Input validation utilities
//! - [`error`]: Error types

pub mod backend;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod orchestrator;
pub mod planner;
pub mod validation;

pub use config::Config;
pub use error::{Error, Result};

#[cfg(test)]
pub mod test_utils;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
