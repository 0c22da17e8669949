// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! IBM Quantum executor via the Qiskit Runtime REST API.
//!
//! Circuits are submitted as OpenQASM 3.0 to the `sampler` primitive; the
//! transpiler optimization level and seed travel with the job so the service
//! performs layout and routing.
//!
//! # Architecture
//!
//! The executor is generic over [`IbmHttpClient`], enabling deterministic
//! testing with a mock client while using [`ReqwestIbmClient`] in production.

pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::circuit::CircuitSpec;
use super::r#trait::{PollResponse, RemoteExecutor};
use super::selection::BackendCandidate;
use crate::error::RemoteError;
use crate::ledger::JobStatus;

use client::{IbmHttpClient, ReqwestIbmClient};

/// IBM job request (Qiskit Runtime primitive format).
#[derive(Debug, Clone, Serialize)]
pub struct IbmJobRequest {
    /// Program ID ("sampler").
    pub program_id: String,
    /// Backend name.
    pub backend: String,
    /// Input parameters.
    pub params: IbmJobParams,
}

/// IBM job input parameters.
#[derive(Debug, Clone, Serialize)]
pub struct IbmJobParams {
    /// OpenQASM 3.0 circuits.
    pub circuits: Vec<String>,
    /// Number of shots.
    pub shots: u32,
    /// Optimization level (0–3).
    pub optimization_level: u32,
    /// Transpiler seed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_transpiler: Option<u64>,
}

/// IBM job state.
#[derive(Debug, Clone, Deserialize)]
pub struct IbmJobState {
    /// Job status string (QUEUED, RUNNING, DONE, ERROR, CANCELLED, ...).
    pub status: String,
    /// Failure reason, when the service gives one.
    #[serde(default)]
    pub reason: Option<String>,
}

impl IbmJobState {
    pub fn with_status(status: &str) -> Self {
        Self {
            status: status.to_string(),
            reason: None,
        }
    }
}

/// IBM job result.
#[derive(Debug, Clone, Deserialize)]
pub struct IbmJobResult {
    /// One entry per submitted circuit.
    #[serde(default)]
    pub results: Vec<IbmCircuitResult>,
}

/// Result of a single circuit execution.
#[derive(Debug, Clone, Deserialize)]
pub struct IbmCircuitResult {
    /// Measurement counts keyed by bitstring.
    pub counts: HashMap<String, u64>,
    /// Shots executed.
    pub shots: u64,
}

/// Map an IBM status string to a job status.
///
/// Unknown strings are treated as still running so polling continues until
/// the local deadline decides.
pub fn map_status(status: &str) -> JobStatus {
    match status.to_ascii_uppercase().as_str() {
        "QUEUED" | "INITIALIZING" | "VALIDATING" => JobStatus::Queued,
        "RUNNING" => JobStatus::Running,
        "DONE" | "COMPLETED" => JobStatus::Succeeded,
        "ERROR" | "FAILED" => JobStatus::Failed,
        "CANCELLED" | "CANCELED" => JobStatus::Cancelled,
        other => {
            warn!(status = %other, "Unknown IBM job status");
            JobStatus::Running
        }
    }
}

/// IBM Quantum executor bound to one backend.
pub struct IbmExecutor<C: IbmHttpClient = ReqwestIbmClient> {
    backend_name: String,
    client: C,
}

impl IbmExecutor<ReqwestIbmClient> {
    /// Create from configuration and a selected backend.
    pub fn from_config(
        config: &crate::config::IbmConfig,
        backend_name: &str,
    ) -> Result<Self, RemoteError> {
        let client = ReqwestIbmClient::from_config(config)?;
        info!(backend = %backend_name, instance = %config.instance, "Initializing IBM executor");
        Ok(Self::with_client(backend_name, client))
    }
}

impl<C: IbmHttpClient> IbmExecutor<C> {
    /// Create with a custom HTTP client (for testing).
    pub fn with_client(backend_name: &str, client: C) -> Self {
        Self {
            backend_name: backend_name.to_string(),
            client,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn job_request(&self, circuit: &CircuitSpec, shot_count: u32) -> IbmJobRequest {
        IbmJobRequest {
            program_id: "sampler".to_string(),
            backend: self.backend_name.clone(),
            params: IbmJobParams {
                circuits: vec![circuit.to_qasm()],
                shots: shot_count,
                optimization_level: circuit.optimization_level,
                seed_transpiler: circuit.seed,
            },
        }
    }
}

/// Ask the service which backends the instance can use.
pub async fn list_backends<C: IbmHttpClient>(
    client: &C,
) -> Result<Vec<BackendCandidate>, RemoteError> {
    client.list_backends().await
}

#[async_trait]
impl<C: IbmHttpClient> RemoteExecutor for IbmExecutor<C> {
    fn name(&self) -> &str {
        &self.backend_name
    }

    async fn submit(&self, circuit: &CircuitSpec, shot_count: u32) -> Result<String, RemoteError> {
        let request = self.job_request(circuit, shot_count);
        let job_id = self.client.submit_job(&request).await?;
        info!(
            job_id = %job_id,
            backend = %self.backend_name,
            circuit = %circuit.name,
            shots = shot_count,
            "IBM job submitted"
        );
        Ok(job_id)
    }

    async fn poll(&self, job_id: &str) -> Result<PollResponse, RemoteError> {
        let state = self.client.get_job_state(job_id).await?;
        let status = map_status(&state.status);
        debug!(job_id = %job_id, raw_status = %state.status, status = %status, "IBM job state");

        match status {
            JobStatus::Succeeded => {
                let result = self.client.get_job_results(job_id).await?;
                let circuit = result.results.into_iter().next().ok_or_else(|| {
                    RemoteError::Http(format!("No circuit results for IBM job {job_id}"))
                })?;
                Ok(PollResponse::succeeded(circuit.counts))
            }
            JobStatus::Failed => Ok(PollResponse::failed(
                state
                    .reason
                    .unwrap_or_else(|| format!("IBM job {job_id} reported {}", state.status)),
            )),
            other => Ok(PollResponse::pending(other)),
        }
    }
}
