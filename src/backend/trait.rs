// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Remote execution contract.

use async_trait::async_trait;
use std::collections::HashMap;

use super::circuit::CircuitSpec;
use crate::error::RemoteError;
use crate::ledger::JobStatus;

/// What one poll of a remote job observed.
#[derive(Debug, Clone, PartialEq)]
pub struct PollResponse {
    /// Current job status
    pub status: JobStatus,
    /// Raw sampler histogram (present once the job succeeded)
    pub outcome_counts: Option<HashMap<String, u64>>,
    /// Failure reason reported by the service
    pub error: Option<String>,
}

impl PollResponse {
    pub fn pending(status: JobStatus) -> Self {
        Self {
            status,
            outcome_counts: None,
            error: None,
        }
    }

    pub fn succeeded(counts: HashMap<String, u64>) -> Self {
        Self {
            status: JobStatus::Succeeded,
            outcome_counts: Some(counts),
            error: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            outcome_counts: None,
            error: Some(reason.into()),
        }
    }
}

/// The request/response contract of a remote quantum execution service.
///
/// Implementations only move requests; retry, timeout and bookkeeping
/// belong to the orchestrator.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Backend the executor submits to.
    fn name(&self) -> &str;

    /// Submit a circuit and return the service-assigned job id.
    async fn submit(&self, circuit: &CircuitSpec, shot_count: u32) -> Result<String, RemoteError>;

    /// Observe the current state of a submitted job.
    async fn poll(&self, job_id: &str) -> Result<PollResponse, RemoteError>;
}
