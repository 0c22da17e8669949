// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared test utilities for orchestration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::backend::circuit::CircuitSpec;
use crate::backend::r#trait::{PollResponse, RemoteExecutor};
use crate::error::RemoteError;

type CountsFn = dyn Fn(&CircuitSpec, u32) -> HashMap<String, u64> + Send + Sync;

/// Histogram with the given share of `00`/`11` outcomes.
pub fn histogram(p_succ: f64, shots: u32) -> HashMap<String, u64> {
    let hits = (p_succ * shots as f64).round() as u64;
    let misses = shots as u64 - hits;
    let mut counts = HashMap::new();
    counts.insert("00".to_string(), hits / 2);
    counts.insert("11".to_string(), hits - hits / 2);
    counts.insert("01".to_string(), misses / 2);
    counts.insert("10".to_string(), misses - misses / 2);
    counts
}

/// Scripted executor.
///
/// Submissions pop `submit_script` and fall back to sequential
/// `mock-job-N` ids. Polls pop `poll_script`; once it is drained every poll
/// reports success with the counts produced for that job at submit time.
pub struct MockExecutor {
    pub name: String,
    pub submit_script: Mutex<VecDeque<Result<String, RemoteError>>>,
    pub poll_script: Mutex<VecDeque<Result<PollResponse, RemoteError>>>,
    pub submitted: Mutex<Vec<(CircuitSpec, u32)>>,
    /// Clock reading at each submission
    pub submit_times: Mutex<Vec<Instant>>,
    pub polls: Mutex<Vec<String>>,
    results: Mutex<HashMap<String, HashMap<String, u64>>>,
    counts_fn: Box<CountsFn>,
}

impl MockExecutor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            submit_script: Mutex::new(VecDeque::new()),
            poll_script: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
            submit_times: Mutex::new(Vec::new()),
            polls: Mutex::new(Vec::new()),
            results: Mutex::new(HashMap::new()),
            counts_fn: Box::new(|_, shots| histogram(1.0, shots)),
        }
    }

    pub fn with_submits(self, script: Vec<Result<String, RemoteError>>) -> Self {
        *self.submit_script.lock() = script.into();
        self
    }

    pub fn with_polls(self, script: Vec<Result<PollResponse, RemoteError>>) -> Self {
        *self.poll_script.lock() = script.into();
        self
    }

    /// Produce the eventual result of each job from its circuit.
    pub fn with_counts<F>(mut self, f: F) -> Self
    where
        F: Fn(&CircuitSpec, u32) -> HashMap<String, u64> + Send + Sync + 'static,
    {
        self.counts_fn = Box::new(f);
        self
    }

    pub fn shared(self) -> Arc<dyn RemoteExecutor> {
        Arc::new(self)
    }

    pub fn submit_count(&self) -> usize {
        self.submitted.lock().len()
    }
}

#[async_trait]
impl RemoteExecutor for MockExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, circuit: &CircuitSpec, shot_count: u32) -> Result<String, RemoteError> {
        self.submit_times.lock().push(Instant::now());
        let n = {
            let mut submitted = self.submitted.lock();
            submitted.push((circuit.clone(), shot_count));
            submitted.len()
        };
        let job_id = match self.submit_script.lock().pop_front() {
            Some(scripted) => scripted?,
            None => format!("mock-job-{n}"),
        };
        self.results
            .lock()
            .insert(job_id.clone(), (self.counts_fn)(circuit, shot_count));
        Ok(job_id)
    }

    async fn poll(&self, job_id: &str) -> Result<PollResponse, RemoteError> {
        self.polls.lock().push(job_id.to_string());
        if let Some(scripted) = self.poll_script.lock().pop_front() {
            return scripted;
        }
        match self.results.lock().get(job_id) {
            Some(counts) => Ok(PollResponse::succeeded(counts.clone())),
            None => Err(RemoteError::NotFound(format!("unknown job {job_id}"))),
        }
    }
}

/// Executor whose service rejects every submission.
pub struct FailingMockExecutor {
    pub name: String,
}

impl FailingMockExecutor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl RemoteExecutor for FailingMockExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, _circuit: &CircuitSpec, _shot_count: u32) -> Result<String, RemoteError> {
        Err(RemoteError::Rejected("mock backend rejects circuits".into()))
    }

    async fn poll(&self, job_id: &str) -> Result<PollResponse, RemoteError> {
        Err(RemoteError::NotFound(format!("unknown job {job_id}")))
    }
}
