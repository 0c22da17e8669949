// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Append-only result ledger.
//!
//! Every remote job attempt is recorded as a sequence of [`JobRecord`]
//! snapshots, one JSON object per line. A snapshot with a terminal
//! [`JobStatus`] closes the record: any later snapshot for the same job id
//! is refused. Retries never touch earlier lines, they appear as new records
//! with a fresh job id.
//!
//! # Format
//!
//! ```text
//! {"job_id":"d0b1...","tag":"ts_qrita(baseline)_000","axis":{"kind":"time_series",...},"status":"queued",...}
//! {"job_id":"d0b1...","tag":"ts_qrita(baseline)_000","axis":{"kind":"time_series",...},"status":"succeeded",...}
//! ```

pub mod outcome;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, LedgerError, Result};

pub use outcome::{Outcome, OutcomeCounts};

/// Which experiment matrix a job belongs to, and where on its axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExperimentAxis {
    /// One epoch of a (scenario, algorithm) time series
    TimeSeries {
        scenario: String,
        algorithm: String,
        epoch: u32,
    },
    /// One point of a (scenario, algorithm) distance-ratio sweep
    DistanceSweep {
        scenario: String,
        algorithm: String,
        distance_ratio: f64,
    },
    /// One point of a (scenario, algorithm) SD-pair sweep
    SdPairSweep {
        scenario: String,
        algorithm: String,
        num_pairs: u32,
    },
}

impl ExperimentAxis {
    /// The (scenario, algorithm) group the point belongs to.
    pub fn group(&self) -> (&str, &str) {
        match self {
            ExperimentAxis::TimeSeries {
                scenario,
                algorithm,
                ..
            }
            | ExperimentAxis::DistanceSweep {
                scenario,
                algorithm,
                ..
            }
            | ExperimentAxis::SdPairSweep {
                scenario,
                algorithm,
                ..
            } => (scenario, algorithm),
        }
    }
}

impl fmt::Display for ExperimentAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExperimentAxis::TimeSeries {
                scenario,
                algorithm,
                epoch,
            } => write!(f, "ts[{scenario}/{algorithm}@{epoch}]"),
            ExperimentAxis::DistanceSweep {
                scenario,
                algorithm,
                distance_ratio,
            } => write!(f, "dist[{scenario}/{algorithm}@{distance_ratio}]"),
            ExperimentAxis::SdPairSweep {
                scenario,
                algorithm,
                num_pairs,
            } => write!(f, "sd[{scenario}/{algorithm}@{num_pairs}]"),
        }
    }
}

/// Lifecycle status of a remote job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rate limit, network fault, malformed result
    Transient,
    /// Request rejected; retrying cannot help
    Permanent,
    /// No terminal status before the local deadline
    Timeout,
}

/// Why an attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: FailureKind,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Whether a terminal record is the outcome reported for its point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// The point's reported outcome
    Final,
    /// Superseded by a resubmission
    Retried,
}

/// One remote job attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Identifier assigned by the remote service (`local-*` if none was)
    pub job_id: String,
    /// Human-readable point label
    pub tag: String,
    pub axis: ExperimentAxis,
    /// Backend the job ran on
    pub backend: String,
    pub shot_count: u32,
    /// 1-based attempt number for this point
    pub attempt: u32,
    /// Transpiler seed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome_counts: Option<OutcomeCounts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disposition: Option<Disposition>,
}

impl JobRecord {
    /// First snapshot of an attempt, written right after submission.
    pub fn queued(
        job_id: impl Into<String>,
        tag: impl Into<String>,
        axis: ExperimentAxis,
        backend: impl Into<String>,
        shot_count: u32,
        attempt: u32,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            tag: tag.into(),
            axis,
            backend: backend.into(),
            shot_count,
            attempt,
            seed: None,
            status: JobStatus::Queued,
            submitted_at,
            completed_at: None,
            outcome_counts: None,
            error_detail: None,
            disposition: None,
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Snapshot with a new non-terminal status.
    pub fn transitioned(&self, status: JobStatus) -> Self {
        debug_assert!(!status.is_terminal());
        Self {
            status,
            ..self.clone()
        }
    }

    /// Terminal success snapshot.
    pub fn succeeded(&self, counts: OutcomeCounts, completed_at: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Succeeded,
            completed_at: Some(completed_at),
            outcome_counts: Some(counts),
            error_detail: None,
            disposition: Some(Disposition::Final),
            ..self.clone()
        }
    }

    /// Terminal failure snapshot.
    pub fn failed(
        &self,
        detail: ErrorDetail,
        disposition: Disposition,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            status: JobStatus::Failed,
            completed_at: Some(completed_at),
            outcome_counts: None,
            error_detail: Some(detail),
            disposition: Some(disposition),
            ..self.clone()
        }
    }

    /// Terminal cancellation snapshot.
    pub fn cancelled(&self, completed_at: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Cancelled,
            completed_at: Some(completed_at),
            outcome_counts: None,
            error_detail: None,
            disposition: Some(Disposition::Final),
            ..self.clone()
        }
    }

    /// Wall-clock latency of the attempt, once it has completed.
    pub fn elapsed_seconds(&self) -> Option<f64> {
        self.completed_at
            .map(|done| (done - self.submitted_at).num_milliseconds() as f64 / 1000.0)
    }

    /// Success probability of a succeeded record.
    pub fn success_probability(&self) -> Option<f64> {
        match self.status {
            JobStatus::Succeeded => self
                .outcome_counts
                .as_ref()
                .and_then(OutcomeCounts::success_probability),
            _ => None,
        }
    }

    pub fn is_final(&self) -> bool {
        self.status.is_terminal() && self.disposition == Some(Disposition::Final)
    }
}

/// Byte sink behind the ledger. A failed line write is rolled back so the
/// next append never lands on a partial line.
trait LedgerSink: Write {
    fn byte_len(&self) -> std::io::Result<u64>;
    fn truncate_to(&mut self, len: u64) -> std::io::Result<()>;
}

impl LedgerSink for File {
    fn byte_len(&self) -> std::io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len)
    }
}

/// Write one whole line, or leave the sink as it was.
fn append_line<S: LedgerSink>(sink: &mut S, line: &[u8]) -> std::io::Result<()> {
    let len = sink.byte_len()?;
    if let Err(e) = sink.write_all(line) {
        if let Err(rollback) = sink.truncate_to(len) {
            warn!(error = %rollback, "Failed to roll back partial ledger entry");
        }
        return Err(e);
    }
    Ok(())
}

struct LedgerState {
    file: File,
    terminal: HashSet<String>,
    entries: usize,
}

/// Durable, append-only log of [`JobRecord`] snapshots.
///
/// The ledger is safe to share across tasks: appends take an internal lock,
/// so each line is written whole and in order.
pub struct ResultLedger {
    path: PathBuf,
    fsync: bool,
    state: Mutex<LedgerState>,
}

impl fmt::Debug for ResultLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultLedger")
            .field("path", &self.path)
            .field("fsync", &self.fsync)
            .finish()
    }
}

impl ResultLedger {
    /// Open (or create) the ledger at `path`.
    ///
    /// Existing entries are replayed to rebuild the set of closed records.
    /// A partial trailing line left behind by a crash is truncated away.
    pub fn open(path: impl AsRef<Path>, fsync: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        let mut content = String::new();
        file.read_to_string(&mut content)?;

        if !content.is_empty() && !content.ends_with('\n') {
            let keep = content.rfind('\n').map(|i| i + 1).unwrap_or(0);
            warn!(
                path = %path.display(),
                dropped_bytes = content.len() - keep,
                "Truncating partial trailing ledger entry"
            );
            file.set_len(keep as u64)?;
            file.sync_all()?;
            content.truncate(keep);
        }

        let records = parse_entries(&content)?;
        let terminal: HashSet<String> = records
            .iter()
            .filter(|r| r.status.is_terminal())
            .map(|r| r.job_id.clone())
            .collect();

        info!(
            path = %path.display(),
            entries = records.len(),
            closed = terminal.len(),
            "Opened result ledger"
        );

        Ok(Self {
            path,
            fsync,
            state: Mutex::new(LedgerState {
                file,
                terminal,
                entries: records.len(),
            }),
        })
    }

    /// Ledger location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of snapshots written so far.
    pub fn len(&self) -> usize {
        self.state.lock().entries
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one snapshot. Durable on return when `fsync` is enabled.
    pub fn append(&self, record: &JobRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut state = self.state.lock();
        if state.terminal.contains(&record.job_id) {
            return Err(LedgerError::AlreadyTerminal {
                job_id: record.job_id.clone(),
            }
            .into());
        }

        append_line(&mut state.file, &line)?;
        if self.fsync {
            state.file.sync_data()?;
        }
        state.entries += 1;
        if record.status.is_terminal() {
            state.terminal.insert(record.job_id.clone());
        }

        debug!(job_id = %record.job_id, status = %record.status, "Ledger append");
        Ok(())
    }

    /// Every snapshot in write order.
    pub fn read_entries(&self) -> Result<Vec<JobRecord>> {
        // Hold the lock so a concurrent append is never observed half-written.
        let _state = self.state.lock();
        let content = std::fs::read_to_string(&self.path)?;
        parse_entries(&content)
    }

    /// One record per job id (its latest snapshot), in first-seen order.
    pub fn read_all(&self) -> Result<Vec<JobRecord>> {
        Ok(fold_latest(self.read_entries()?))
    }

    /// Terminal records whose disposition is final: one per attempted point.
    pub fn final_records(&self) -> Result<Vec<JobRecord>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(JobRecord::is_final)
            .collect())
    }
}

/// Collapse snapshots to the latest one per job id.
pub fn fold_latest(entries: Vec<JobRecord>) -> Vec<JobRecord> {
    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, JobRecord> = HashMap::new();
    for record in entries {
        if !latest.contains_key(&record.job_id) {
            order.push(record.job_id.clone());
        }
        latest.insert(record.job_id.clone(), record);
    }
    order
        .into_iter()
        .filter_map(|id| latest.remove(&id))
        .collect()
}

fn parse_entries(content: &str) -> Result<Vec<JobRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<JobRecord>(line).map_err(|e| {
                Error::from(LedgerError::Corrupt {
                    line: i + 1,
                    message: e.to_string(),
                })
            })
        })
        .collect()
}
