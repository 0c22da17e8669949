// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Experiment matrix enumeration and execution.
//!
//! Three independent matrices are planned:
//!
//! - time series: scenarios × algorithms × epochs, Bell circuit
//! - distance sweep: log-spaced distance ratios, chain circuit whose depth
//!   grows as the ratio shrinks
//! - SD-pair sweep: repeated-Bell circuit with `max(1, pairs / 10)` blocks
//!
//! Sweeps run one trial per (scenario, algorithm) at every axis value.
//! Points are fed to the [`JobOrchestrator`] in plan order, at most
//! `concurrency` at a time.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::backend::circuit::{CircuitKind, CircuitSpec};
use crate::backend::selection::BackendSelection;
use crate::config::ExperimentConfig;
use crate::error::Result;
use crate::ledger::{ExperimentAxis, JobRecord, JobStatus};
use crate::orchestrator::{JobOrchestrator, JobRequest};

/// Per-run seed, taken from the clock once at run start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedState(u64);

impl SeedState {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// `floor(unix_time) mod 10000`.
    pub fn from_clock() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self(secs % 10_000)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Transpiler seed for one time-series point.
    ///
    /// `scenario_index` is 1-based.
    pub fn time_series_seed(&self, scenario_index: usize, epoch: u32) -> u64 {
        self.0 + 97 * scenario_index as u64 + epoch as u64
    }
}

/// Values fixed for the whole run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub backend: BackendSelection,
    pub seed: SeedState,
}

impl RunContext {
    pub fn new(backend: BackendSelection, seed: SeedState) -> Self {
        Self { backend, seed }
    }
}

/// Which experiment matrix to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matrix {
    TimeSeries,
    DistanceSweep,
    SdPairSweep,
    All,
}

impl Matrix {
    fn includes(&self, other: Matrix) -> bool {
        *self == Matrix::All || *self == other
    }
}

/// Outcome tally of a planner run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl PlanReport {
    pub fn record(&mut self, record: &JobRecord) {
        self.attempted += 1;
        match record.status {
            JobStatus::Succeeded => self.succeeded += 1,
            JobStatus::Cancelled => self.cancelled += 1,
            _ => self.failed += 1,
        }
    }
}

impl fmt::Display for PlanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempted, {} succeeded, {} failed, {} cancelled",
            self.attempted, self.succeeded, self.failed, self.cancelled
        )
    }
}

/// `points` ratios log-spaced over `[min, max]`, endpoints exact.
pub fn distance_ratios(points: usize, min: f64, max: f64) -> Vec<f64> {
    if points == 0 {
        return Vec::new();
    }
    if points == 1 {
        return vec![min];
    }
    let (lo, hi) = (min.log10(), max.log10());
    let last = points - 1;
    (0..points)
        .map(|i| match i {
            0 => min,
            i if i == last => max,
            i => 10f64.powf(lo + i as f64 / last as f64 * (hi - lo)),
        })
        .collect()
}

/// Bell blocks standing in for `num_pairs` contending SD pairs.
pub fn sd_pair_reps(num_pairs: u32) -> u32 {
    (num_pairs / 10).max(1)
}

/// Enumerates experiment points and runs them through the orchestrator.
pub struct ExperimentPlanner {
    orchestrator: Arc<JobOrchestrator>,
    experiment: ExperimentConfig,
    context: RunContext,
    concurrency: usize,
}

impl ExperimentPlanner {
    pub fn new(
        orchestrator: Arc<JobOrchestrator>,
        experiment: ExperimentConfig,
        context: RunContext,
    ) -> Self {
        let concurrency = orchestrator.config().concurrency.max(1);
        Self {
            orchestrator,
            experiment,
            context,
            concurrency,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Points of `matrix`, in execution order.
    pub fn plan(&self, matrix: Matrix) -> Vec<JobRequest> {
        let mut points = Vec::new();
        if matrix.includes(Matrix::TimeSeries) {
            points.extend(self.time_series_points());
        }
        if matrix.includes(Matrix::DistanceSweep) {
            points.extend(self.distance_points());
        }
        if matrix.includes(Matrix::SdPairSweep) {
            points.extend(self.sd_pair_points());
        }
        points
    }

    fn time_series_points(&self) -> Vec<JobRequest> {
        let exp = &self.experiment;
        let mut points = Vec::new();
        for (s, scenario) in exp.scenarios.iter().enumerate() {
            for algo in &exp.algorithms {
                for epoch in 0..exp.epochs {
                    let seed = self.context.seed.time_series_seed(s + 1, epoch);
                    let circuit = CircuitSpec::new(
                        format!("bell_{}", algo.name),
                        CircuitKind::Bell,
                        algo.optimization_level,
                    )
                    .with_seed(seed);
                    points.push(JobRequest::new(
                        format!("ts_{}({})_{:03}", algo.name, scenario, epoch),
                        ExperimentAxis::TimeSeries {
                            scenario: scenario.clone(),
                            algorithm: algo.name.clone(),
                            epoch,
                        },
                        circuit,
                    ));
                }
            }
        }
        points
    }

    fn distance_points(&self) -> Vec<JobRequest> {
        let exp = &self.experiment;
        let ratios = distance_ratios(exp.distance_points, exp.distance_min, exp.distance_max);
        let last = ratios.len().saturating_sub(1);
        let mut points = Vec::new();
        for scenario in &exp.scenarios {
            for algo in &exp.algorithms {
                for (i, &ratio) in ratios.iter().enumerate() {
                    let depth_pairs = (last - i) as u32 + 1;
                    let circuit = CircuitSpec::new(
                        format!("chain_{}", algo.name),
                        CircuitKind::Chain { depth_pairs },
                        algo.optimization_level,
                    )
                    .with_seed(self.context.seed.value());
                    points.push(JobRequest::new(
                        format!("dist_{}({})_{:.4}", algo.name, scenario, ratio),
                        ExperimentAxis::DistanceSweep {
                            scenario: scenario.clone(),
                            algorithm: algo.name.clone(),
                            distance_ratio: ratio,
                        },
                        circuit,
                    ));
                }
            }
        }
        points
    }

    fn sd_pair_points(&self) -> Vec<JobRequest> {
        let exp = &self.experiment;
        let mut points = Vec::new();
        for scenario in &exp.scenarios {
            for algo in &exp.algorithms {
                for &num_pairs in &exp.sd_pairs {
                    let circuit = CircuitSpec::new(
                        format!("sd_{}", algo.name),
                        CircuitKind::RepeatedBell {
                            reps: sd_pair_reps(num_pairs),
                        },
                        algo.optimization_level,
                    )
                    .with_seed(self.context.seed.value());
                    points.push(JobRequest::new(
                        format!("sd_{}({})_{}", algo.name, scenario, num_pairs),
                        ExperimentAxis::SdPairSweep {
                            scenario: scenario.clone(),
                            algorithm: algo.name.clone(),
                            num_pairs,
                        },
                        circuit,
                    ));
                }
            }
        }
        points
    }

    /// Run every point of `matrix`.
    ///
    /// Failed points are counted, not fatal. The run stops on the first
    /// ledger or validation error.
    pub async fn run(&self, matrix: Matrix) -> Result<PlanReport> {
        let points = self.plan(matrix);
        info!(
            matrix = ?matrix,
            points = points.len(),
            concurrency = self.concurrency,
            backend = %self.context.backend.backend_name,
            seed = self.context.seed.value(),
            "Starting experiment run"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut report = PlanReport::default();

        for point in points {
            // Taking the permit before spawning keeps start order equal to plan order.
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let orchestrator = self.orchestrator.clone();
            tasks.spawn(async move {
                let result = orchestrator.run(&point).await;
                drop(permit);
                result
            });

            while let Some(joined) = tasks.try_join_next() {
                Self::collect(&mut report, joined)?;
            }
        }

        while let Some(joined) = tasks.join_next().await {
            Self::collect(&mut report, joined)?;
        }

        info!(report = %report, "Experiment run finished");
        Ok(report)
    }

    fn collect(
        report: &mut PlanReport,
        joined: std::result::Result<Result<JobRecord>, tokio::task::JoinError>,
    ) -> Result<()> {
        match joined {
            Ok(result) => {
                report.record(&result?);
                Ok(())
            }
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                warn!(error = %e, "Point task cancelled");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlgorithmConfig, OrchestratorConfig};
    use crate::ledger::ResultLedger;
    use crate::test_utils::{histogram, MockExecutor};
    use approx::assert_relative_eq;

    fn small_experiment() -> ExperimentConfig {
        ExperimentConfig {
            scenarios: vec!["baseline".into(), "congested".into()],
            algorithms: vec![AlgorithmConfig::new("qrita", 1), AlgorithmConfig::new("static-ris", 0)],
            epochs: 4,
            sd_pairs: vec![10, 25],
            distance_points: 3,
            distance_min: 0.01,
            distance_max: 1.0,
        }
    }

    fn planner(
        executor: MockExecutor,
        experiment: ExperimentConfig,
    ) -> (tempfile::TempDir, Arc<MockExecutor>, ExperimentPlanner) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(ResultLedger::open(dir.path().join("raw_jobs.jsonl"), false).unwrap());
        let executor = Arc::new(executor);
        let orchestrator = Arc::new(JobOrchestrator::new(
            executor.clone(),
            ledger,
            OrchestratorConfig::default(),
        ));
        let context = RunContext::new(BackendSelection::new("ibm_test"), SeedState::new(4000));
        (dir, executor, ExperimentPlanner::new(orchestrator, experiment, context))
    }

    #[test]
    fn test_distance_ratios_default() {
        let ratios = distance_ratios(7, 0.01, 1.0);
        assert_eq!(ratios.len(), 7);
        assert_eq!(ratios[0], 0.01);
        assert_eq!(ratios[6], 1.0);
        for w in ratios.windows(2) {
            assert_relative_eq!(w[1] / w[0], 10f64.powf(2.0 / 6.0), max_relative = 1e-12);
        }
    }

    #[test]
    fn test_distance_ratios_degenerate() {
        assert!(distance_ratios(0, 0.01, 1.0).is_empty());
        assert_eq!(distance_ratios(1, 0.01, 1.0), vec![0.01]);
        assert_eq!(distance_ratios(2, 0.01, 1.0), vec![0.01, 1.0]);
    }

    #[test]
    fn test_sd_pair_reps() {
        assert_eq!(sd_pair_reps(5), 1);
        assert_eq!(sd_pair_reps(10), 1);
        assert_eq!(sd_pair_reps(15), 1);
        assert_eq!(sd_pair_reps(25), 2);
        assert_eq!(sd_pair_reps(30), 3);
    }

    #[test]
    fn test_seed_state() {
        let seed = SeedState::new(1234);
        assert_eq!(seed.time_series_seed(1, 0), 1234 + 97);
        assert_eq!(seed.time_series_seed(2, 35), 1234 + 194 + 35);
        assert!(SeedState::from_clock().value() < 10_000);
    }

    #[test]
    fn test_default_plan_sizes() {
        let (_dir, _executor, planner) =
            planner(MockExecutor::new("ibm_test"), ExperimentConfig::default());
        assert_eq!(planner.plan(Matrix::TimeSeries).len(), 216);
        assert_eq!(planner.plan(Matrix::DistanceSweep).len(), 2 * 3 * 7);
        assert_eq!(planner.plan(Matrix::SdPairSweep).len(), 2 * 3 * 5);
        assert_eq!(planner.plan(Matrix::All).len(), 216 + 42 + 30);
    }

    #[test]
    fn test_time_series_points() {
        let (_dir, _executor, planner) = planner(MockExecutor::new("ibm_test"), small_experiment());
        let points = planner.plan(Matrix::TimeSeries);
        assert_eq!(points.len(), 16);

        let first = &points[0];
        assert_eq!(first.tag, "ts_qrita(baseline)_000");
        assert_eq!(first.circuit.kind, CircuitKind::Bell);
        assert_eq!(first.circuit.optimization_level, 1);
        assert_eq!(first.circuit.seed, Some(4000 + 97));

        let epochs: Vec<u32> = points[..4]
            .iter()
            .map(|p| match p.axis {
                ExperimentAxis::TimeSeries { epoch, .. } => epoch,
                _ => panic!("unexpected axis"),
            })
            .collect();
        assert_eq!(epochs, vec![0, 1, 2, 3]);

        let congested = &points[8];
        assert_eq!(congested.tag, "ts_qrita(congested)_000");
        assert_eq!(congested.circuit.seed, Some(4000 + 194));
    }

    #[test]
    fn test_distance_points_depth() {
        let (_dir, _executor, planner) = planner(MockExecutor::new("ibm_test"), small_experiment());
        let points = planner.plan(Matrix::DistanceSweep);
        assert_eq!(points.len(), 2 * 2 * 3);
        let depths: Vec<CircuitKind> = points[..3].iter().map(|p| p.circuit.kind).collect();
        assert_eq!(
            depths,
            vec![
                CircuitKind::Chain { depth_pairs: 3 },
                CircuitKind::Chain { depth_pairs: 2 },
                CircuitKind::Chain { depth_pairs: 1 },
            ]
        );
        assert_eq!(
            points[0].axis,
            ExperimentAxis::DistanceSweep {
                scenario: "baseline".into(),
                algorithm: "qrita".into(),
                distance_ratio: 0.01,
            }
        );
        assert_eq!(points[0].tag, "dist_qrita(baseline)_0.0100");
        assert_eq!(points[0].circuit.seed, Some(4000));

        // Every sweep point carries its (scenario, algorithm) group.
        let groups: Vec<(&str, &str)> = points.iter().step_by(3).map(|p| p.axis.group()).collect();
        assert_eq!(
            groups,
            vec![
                ("baseline", "qrita"),
                ("baseline", "static-ris"),
                ("congested", "qrita"),
                ("congested", "static-ris"),
            ]
        );
    }

    #[test]
    fn test_sd_pair_points() {
        let (_dir, _executor, planner) = planner(MockExecutor::new("ibm_test"), small_experiment());
        let points = planner.plan(Matrix::SdPairSweep);
        assert_eq!(points.len(), 8);
        assert_eq!(points[1].tag, "sd_qrita(baseline)_25");
        assert_eq!(points[1].axis.group(), ("baseline", "qrita"));
        assert_eq!(points[1].circuit.kind, CircuitKind::RepeatedBell { reps: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sequential_preserves_epoch_order() {
        let executor = MockExecutor::new("ibm_test").with_counts(|_, shots| histogram(0.9, shots));
        let (_dir, executor, planner) = planner(executor, small_experiment());

        let report = planner.run(Matrix::TimeSeries).await.unwrap();
        assert_eq!(
            report,
            PlanReport {
                attempted: 16,
                succeeded: 16,
                failed: 0,
                cancelled: 0
            }
        );
        assert_eq!(executor.submit_count(), 16);

        let finals = planner.orchestrator.ledger().final_records().unwrap();
        let tags: Vec<&str> = finals[..4].iter().map(|r| r.tag.as_str()).collect();
        assert_eq!(
            tags,
            vec![
                "ts_qrita(baseline)_000",
                "ts_qrita(baseline)_001",
                "ts_qrita(baseline)_002",
                "ts_qrita(baseline)_003"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_concurrent_counts_failures() {
        let executor = MockExecutor::new("ibm_test").with_counts(|circuit, shots| {
            // Deep chains come back short, every attempt.
            match circuit.kind {
                CircuitKind::Chain { depth_pairs } if depth_pairs > 2 => {
                    let mut h = histogram(0.5, shots);
                    h.insert("00".into(), 0);
                    h
                }
                _ => histogram(0.6, shots),
            }
        });
        let (_dir, _executor, planner) = planner(executor, small_experiment());
        let planner = planner.with_concurrency(4);

        let report = planner.run(Matrix::DistanceSweep).await.unwrap();
        assert_eq!(report.attempted, 12);
        assert_eq!(report.failed, 4);
        assert_eq!(report.succeeded, 8);
        assert_eq!(planner.orchestrator.ledger().final_records().unwrap().len(), 12);
    }
}
