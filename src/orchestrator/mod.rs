// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Job orchestration: submit, poll, retry and time-bound one experiment point.
//!
//! Each attempt is written to the [`ResultLedger`] as it progresses: a
//! `queued` snapshot after submission, one snapshot per observed status
//! change, and a terminal snapshot. A failed attempt that will be retried is
//! closed with disposition `retried`; the resubmission gets a fresh job id.
//!
//! Polling sleeps on a [`PollBackoff`] schedule restarted per attempt. The
//! local deadline is authoritative: a job that has not reached a terminal
//! status when it passes is recorded as a timeout, whatever the service does
//! with it later.
//!
//! Resubmissions of one point follow their own backoff schedule, which is not
//! restarted between attempts, so a rate-limited or unavailable service sees
//! growing gaps between submissions.

pub mod backoff;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::circuit::CircuitSpec;
use crate::backend::r#trait::{PollResponse, RemoteExecutor};
use crate::config::OrchestratorConfig;
use crate::error::{RemoteError, Result};
use crate::ledger::{
    Disposition, ErrorDetail, ExperimentAxis, FailureKind, JobRecord, JobStatus, OutcomeCounts,
    ResultLedger,
};
use crate::validation;

pub use backoff::PollBackoff;

/// One experiment point: what to run and where it sits on its axis.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    /// Human-readable label, e.g. `ts_qrita(baseline)_003`
    pub tag: String,
    pub axis: ExperimentAxis,
    pub circuit: CircuitSpec,
}

impl JobRequest {
    pub fn new(tag: impl Into<String>, axis: ExperimentAxis, circuit: CircuitSpec) -> Self {
        Self {
            tag: tag.into(),
            axis,
            circuit,
        }
    }
}

/// How a single attempt ended, before its terminal snapshot is written.
enum AttemptEnd {
    Succeeded(OutcomeCounts),
    Cancelled,
    Failed(ErrorDetail),
}

fn failure_kind(e: &RemoteError) -> FailureKind {
    match e {
        RemoteError::Timeout(_) => FailureKind::Timeout,
        e if e.is_transient() => FailureKind::Transient,
        _ => FailureKind::Permanent,
    }
}

/// Drives remote jobs to a terminal, ledgered outcome.
pub struct JobOrchestrator {
    executor: Arc<dyn RemoteExecutor>,
    ledger: Arc<ResultLedger>,
    config: OrchestratorConfig,
}

impl JobOrchestrator {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        ledger: Arc<ResultLedger>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            executor,
            ledger,
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<ResultLedger> {
        &self.ledger
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run a point with the configured shot count, retry budget and timeout.
    pub async fn run(&self, request: &JobRequest) -> Result<JobRecord> {
        self.submit_and_await(
            request,
            self.config.shot_count,
            self.config.max_retries,
            self.config.job_timeout(),
        )
        .await
    }

    /// Submit a point and wait for its final outcome.
    ///
    /// Returns the terminal record reported for the point. Remote failures
    /// never surface as `Err`: they end in a `Failed` record. `Err` means the
    /// request was invalid or the ledger could not be written.
    pub async fn submit_and_await(
        &self,
        request: &JobRequest,
        shot_count: u32,
        max_retries: u32,
        timeout: Duration,
    ) -> Result<JobRecord> {
        validation::validate_submission(shot_count, max_retries, timeout)?;
        validation::validate_circuit(&request.circuit)?;

        let mut resubmit = PollBackoff::from_config(&self.config);
        let mut attempt = 1;
        loop {
            let (record, end) = self.run_attempt(request, shot_count, attempt, timeout).await?;
            let completed_at = Utc::now();

            let terminal = match end {
                AttemptEnd::Succeeded(counts) => {
                    let record = record.succeeded(counts, completed_at);
                    info!(
                        job_id = %record.job_id,
                        tag = %record.tag,
                        attempt,
                        p_succ = record.success_probability().unwrap_or_default(),
                        "Job succeeded"
                    );
                    record
                }
                AttemptEnd::Cancelled => {
                    warn!(job_id = %record.job_id, tag = %record.tag, attempt, "Job cancelled remotely");
                    record.cancelled(completed_at)
                }
                AttemptEnd::Failed(detail) => {
                    let retry = detail.kind != FailureKind::Permanent && attempt <= max_retries;
                    if retry {
                        warn!(
                            job_id = %record.job_id,
                            tag = %record.tag,
                            attempt,
                            max_retries,
                            kind = ?detail.kind,
                            error = %detail.message,
                            "Attempt failed, resubmitting"
                        );
                        record.failed(detail, Disposition::Retried, completed_at)
                    } else {
                        error!(
                            job_id = %record.job_id,
                            tag = %record.tag,
                            attempt,
                            kind = ?detail.kind,
                            error = %detail.message,
                            "Job failed"
                        );
                        record.failed(detail, Disposition::Final, completed_at)
                    }
                }
            };

            self.ledger.append(&terminal)?;
            if terminal.disposition == Some(Disposition::Retried) {
                let delay = resubmit.next_delay();
                debug!(
                    tag = %terminal.tag,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Backing off before resubmission"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }
            return Ok(terminal);
        }
    }

    /// One submission and its poll loop. Returns the latest snapshot written
    /// for the attempt together with how it ended.
    async fn run_attempt(
        &self,
        request: &JobRequest,
        shot_count: u32,
        attempt: u32,
        timeout: Duration,
    ) -> Result<(JobRecord, AttemptEnd)> {
        let submitted_at = Utc::now();
        let backend = self.executor.name().to_string();
        let new_record = |job_id: String| {
            JobRecord::queued(
                job_id,
                request.tag.clone(),
                request.axis.clone(),
                backend.clone(),
                shot_count,
                attempt,
                submitted_at,
            )
            .with_seed(request.circuit.seed)
        };

        let job_id = match self.executor.submit(&request.circuit, shot_count).await {
            Ok(job_id) => job_id,
            Err(e) => {
                let record = new_record(format!("local-{}", Uuid::new_v4()));
                let detail = ErrorDetail::new(failure_kind(&e), format!("submission failed: {e}"));
                return Ok((record, AttemptEnd::Failed(detail)));
            }
        };

        let mut record = new_record(job_id);
        self.ledger.append(&record)?;
        info!(
            job_id = %record.job_id,
            tag = %record.tag,
            backend = %record.backend,
            attempt,
            shots = shot_count,
            "Job submitted"
        );

        let deadline = Instant::now() + timeout;
        let mut backoff = PollBackoff::from_config(&self.config);
        let mut polls = 0u32;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let delay = backoff.next_delay().min(remaining);
            tokio::time::sleep(delay).await;
            polls += 1;

            match self.executor.poll(&record.job_id).await {
                Ok(response) => {
                    debug!(job_id = %record.job_id, poll = polls, status = %response.status, "Polled job");
                    if let Some(end) = self.observe(&mut record, response)? {
                        return Ok((record, end));
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(job_id = %record.job_id, poll = polls, error = %e, "Transient poll error");
                }
                Err(e) => {
                    let detail = ErrorDetail::new(FailureKind::Permanent, format!("poll failed: {e}"));
                    return Ok((record, AttemptEnd::Failed(detail)));
                }
            }

            if Instant::now() >= deadline {
                warn!(
                    job_id = %record.job_id,
                    polls,
                    timeout_sec = timeout.as_secs(),
                    "Job timed out"
                );
                let detail = ErrorDetail::new(
                    FailureKind::Timeout,
                    format!(
                        "no terminal status within {}s (last status {})",
                        timeout.as_secs(),
                        record.status
                    ),
                );
                return Ok((record, AttemptEnd::Failed(detail)));
            }
        }
    }

    /// Apply one poll response. Non-terminal status changes are ledgered.
    fn observe(&self, record: &mut JobRecord, response: PollResponse) -> Result<Option<AttemptEnd>> {
        let end = match response.status {
            JobStatus::Queued | JobStatus::Running => {
                if response.status != record.status {
                    *record = record.transitioned(response.status);
                    self.ledger.append(record)?;
                }
                return Ok(None);
            }
            JobStatus::Succeeded => {
                let counts = response.outcome_counts.unwrap_or_default();
                match OutcomeCounts::from_histogram(&counts)
                    .and_then(|c| c.check_total(record.shot_count as u64).map(|_| c))
                {
                    Ok(counts) => AttemptEnd::Succeeded(counts),
                    Err(e) => {
                        warn!(job_id = %record.job_id, error = %e, "Malformed result");
                        AttemptEnd::Failed(ErrorDetail::new(
                            FailureKind::Transient,
                            format!("malformed result: {e}"),
                        ))
                    }
                }
            }
            JobStatus::Failed => AttemptEnd::Failed(ErrorDetail::new(
                FailureKind::Transient,
                format!(
                    "remote job failed: {}",
                    response.error.as_deref().unwrap_or("no reason given")
                ),
            )),
            JobStatus::Cancelled => AttemptEnd::Cancelled,
        };
        Ok(Some(end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::circuit::CircuitKind;
    use crate::error::Error;
    use crate::test_utils::{histogram, FailingMockExecutor, MockExecutor};
    use std::collections::HashMap;

    fn point(epoch: u32) -> JobRequest {
        JobRequest::new(
            format!("ts_qrita(baseline)_{epoch:03}"),
            ExperimentAxis::TimeSeries {
                scenario: "baseline".into(),
                algorithm: "qrita".into(),
                epoch,
            },
            CircuitSpec::new("bell", CircuitKind::Bell, 1).with_seed(1234),
        )
    }

    fn setup(executor: MockExecutor) -> (tempfile::TempDir, Arc<MockExecutor>, JobOrchestrator) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(ResultLedger::open(dir.path().join("raw_jobs.jsonl"), false).unwrap());
        let executor = Arc::new(executor);
        let orchestrator =
            JobOrchestrator::new(executor.clone(), ledger, OrchestratorConfig::default());
        (dir, executor, orchestrator)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_writes_each_transition() {
        let executor = MockExecutor::new("ibm_test")
            .with_polls(vec![
                Ok(PollResponse::pending(JobStatus::Queued)),
                Ok(PollResponse::pending(JobStatus::Running)),
                Ok(PollResponse::pending(JobStatus::Running)),
            ])
            .with_counts(|_, shots| histogram(0.75, shots));
        let (_dir, executor, orch) = setup(executor);

        let record = orch
            .submit_and_await(&point(0), 256, 3, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(record.status, JobStatus::Succeeded);
        assert_eq!(record.disposition, Some(Disposition::Final));
        assert_eq!(record.seed, Some(1234));
        assert_eq!(record.outcome_counts.unwrap().total(), 256);
        assert_eq!(record.success_probability(), Some(0.75));
        assert_eq!(executor.submit_count(), 1);

        let statuses: Vec<JobStatus> = orch
            .ledger()
            .read_entries()
            .unwrap()
            .into_iter()
            .map(|r| r.status)
            .collect();
        assert_eq!(
            statuses,
            vec![JobStatus::Queued, JobStatus::Running, JobStatus::Succeeded]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_follow_backoff() {
        let executor = MockExecutor::new("ibm_test").with_polls(vec![
            Ok(PollResponse::pending(JobStatus::Queued)),
            Ok(PollResponse::pending(JobStatus::Queued)),
            Ok(PollResponse::pending(JobStatus::Queued)),
        ]);
        let (_dir, _executor, orch) = setup(executor);

        let start = Instant::now();
        orch.submit_and_await(&point(0), 256, 0, Duration::from_secs(600))
            .await
            .unwrap();
        // 1 + 2 + 4 + 8 seconds for the four polls.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(15));
        assert!(elapsed < Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_failure_is_retried_with_fresh_id() {
        let executor = MockExecutor::new("ibm_test")
            .with_polls(vec![Ok(PollResponse::failed("calibration drift"))]);
        let (_dir, executor, orch) = setup(executor);

        let record = orch
            .submit_and_await(&point(1), 256, 3, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(record.status, JobStatus::Succeeded);
        assert_eq!(record.attempt, 2);
        assert_eq!(executor.submit_count(), 2);

        let all = orch.ledger().read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_ne!(all[0].job_id, all[1].job_id);
        assert_eq!(all[0].status, JobStatus::Failed);
        assert_eq!(all[0].disposition, Some(Disposition::Retried));
        assert_eq!(orch.ledger().final_records().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let executor = MockExecutor::new("ibm_test").with_polls(vec![
            Ok(PollResponse::failed("e1")),
            Ok(PollResponse::failed("e2")),
            Ok(PollResponse::failed("e3")),
        ]);
        let (_dir, executor, orch) = setup(executor);

        let record = orch
            .submit_and_await(&point(2), 256, 2, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.attempt, 3);
        assert_eq!(record.disposition, Some(Disposition::Final));
        assert!(record.error_detail.unwrap().message.contains("e3"));
        assert_eq!(executor.submit_count(), 3);

        let all = orch.ledger().read_all().unwrap();
        assert_eq!(all.len(), 3);
        let finals: Vec<_> = all.iter().filter(|r| r.is_final()).collect();
        assert_eq!(finals.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_retry() {
        let mut script: Vec<_> = (0..4)
            .map(|_| Ok(PollResponse::pending(JobStatus::Running)))
            .collect();
        script.push(Ok(PollResponse::pending(JobStatus::Queued)));
        let executor = MockExecutor::new("ibm_test").with_polls(script);
        let (_dir, _executor, orch) = setup(executor);

        let start = Instant::now();
        let record = orch
            .submit_and_await(&point(3), 256, 1, Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(record.status, JobStatus::Succeeded);
        assert_eq!(record.attempt, 2);

        let first = &orch.ledger().read_all().unwrap()[0];
        assert_eq!(first.status, JobStatus::Failed);
        let detail = first.error_detail.as_ref().unwrap();
        assert_eq!(detail.kind, FailureKind::Timeout);
        // First attempt: sleeps 1, 2, 4 then 3 (clipped to the deadline).
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_submit_error_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(ResultLedger::open(dir.path().join("l.jsonl"), false).unwrap());
        let orch = JobOrchestrator::new(
            Arc::new(FailingMockExecutor::new("ibm_test")),
            ledger,
            OrchestratorConfig::default(),
        );

        let record = orch.run(&point(4)).await.unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.attempt, 1);
        assert!(record.job_id.starts_with("local-"));
        assert_eq!(record.error_detail.unwrap().kind, FailureKind::Permanent);
        assert_eq!(orch.ledger().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_submit_error_retried() {
        let executor = MockExecutor::new("ibm_test")
            .with_submits(vec![Err(RemoteError::RateLimited("slow down".into()))]);
        let (_dir, executor, orch) = setup(executor);

        let record = orch.run(&point(5)).await.unwrap();
        assert_eq!(record.status, JobStatus::Succeeded);
        assert_eq!(record.attempt, 2);
        assert_eq!(executor.submit_count(), 2);

        let times = executor.submit_times.lock();
        assert_eq!(times[1] - times[0], Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_submits_back_off() {
        let executor = MockExecutor::new("ibm_test").with_submits(
            (0..4)
                .map(|_| Err(RemoteError::RateLimited("429".into())))
                .collect(),
        );
        let (_dir, executor, orch) = setup(executor);

        let start = Instant::now();
        let record = orch
            .submit_and_await(&point(5), 256, 3, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.attempt, 4);
        assert_eq!(record.error_detail.unwrap().kind, FailureKind::Transient);
        assert_eq!(executor.submit_count(), 4);

        // Gaps grow 1, 2, 4 seconds; no wait after the final attempt.
        let times = executor.submit_times.lock();
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflowing_counts_are_retried() {
        let mut huge = HashMap::new();
        huge.insert("00".to_string(), u64::MAX);
        huge.insert("11".to_string(), 1u64);
        let executor =
            MockExecutor::new("ibm_test").with_polls(vec![Ok(PollResponse::succeeded(huge))]);
        let (_dir, _executor, orch) = setup(executor);

        let record = orch
            .submit_and_await(&point(10), 256, 1, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(record.status, JobStatus::Succeeded);
        assert_eq!(record.attempt, 2);

        let first = &orch.ledger().read_all().unwrap()[0];
        let detail = first.error_detail.as_ref().unwrap();
        assert_eq!(detail.kind, FailureKind::Transient);
        assert!(detail.message.contains("overflow"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_error_keeps_polling() {
        let executor = MockExecutor::new("ibm_test").with_polls(vec![
            Err(RemoteError::Unavailable("502".into())),
            Err(RemoteError::RateLimited("429".into())),
        ]);
        let (_dir, executor, orch) = setup(executor);

        let record = orch.run(&point(6)).await.unwrap();
        assert_eq!(record.status, JobStatus::Succeeded);
        assert_eq!(record.attempt, 1);
        assert_eq!(executor.polls.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_poll_error_fails() {
        let executor = MockExecutor::new("ibm_test")
            .with_polls(vec![Err(RemoteError::NotFound("job vanished".into()))]);
        let (_dir, executor, orch) = setup(executor);

        let record = orch.run(&point(7)).await.unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.error_detail.unwrap().kind, FailureKind::Permanent);
        assert_eq!(executor.submit_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_is_final() {
        let executor = MockExecutor::new("ibm_test")
            .with_polls(vec![Ok(PollResponse::pending(JobStatus::Cancelled))]);
        let (_dir, executor, orch) = setup(executor);

        let record = orch.run(&point(8)).await.unwrap();
        assert_eq!(record.status, JobStatus::Cancelled);
        assert!(record.is_final());
        assert_eq!(executor.submit_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shot_mismatch_is_retried() {
        let mut short = HashMap::new();
        short.insert("00".to_string(), 100u64);
        let executor =
            MockExecutor::new("ibm_test").with_polls(vec![Ok(PollResponse::succeeded(short))]);
        let (_dir, _executor, orch) = setup(executor);

        let record = orch
            .submit_and_await(&point(9), 256, 1, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(record.status, JobStatus::Succeeded);
        assert_eq!(record.outcome_counts.unwrap().total(), 256);

        let first = &orch.ledger().read_all().unwrap()[0];
        assert!(first
            .error_detail
            .as_ref()
            .unwrap()
            .message
            .contains("malformed result"));
    }

    #[tokio::test]
    async fn test_invalid_request_rejected_before_submit() {
        let (_dir, executor, orch) = setup(MockExecutor::new("ibm_test"));
        let err = orch
            .submit_and_await(&point(0), 0, 3, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(executor.submit_count(), 0);
        assert!(orch.ledger().is_empty());
    }
}
