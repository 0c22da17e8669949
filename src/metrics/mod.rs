// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Reliability metrics derived from the result ledger.
//!
//! # Definitions
//!
//! For a succeeded job, `p_succ = (n00 + n11) / shots`.
//!
//! - **EDR** (entanglement-distribution rate): `p_succ * 1000`.
//! - **LCR** (latency compliance ratio): share of points with
//!   `p_succ >= 0.5`.
//!
//! Time series are grouped by (scenario, algorithm) and ordered by epoch.
//! LCR at epoch `e` looks at the successful epochs in `[e-4, e]` only; the
//! window never looks ahead and shrinks at the start of a series. Sweeps
//! are grouped the same way and aggregate all trials at one axis value
//! with no window.
//!
//! Failed and cancelled records produce rows with undefined values and
//! never contribute samples. Everything here is a pure function of the
//! ledger contents.

pub mod table;

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::Result;
use crate::ledger::{ExperimentAxis, JobRecord, JobStatus, ResultLedger};

pub use table::{Cell, MetricTable};

/// Rolling window length for time-series LCR.
pub const WINDOW_SIZE: usize = 5;

/// Success probability a point must reach to count as compliant.
pub const SUCCESS_THRESHOLD: f64 = 0.5;

/// EDR scale factor.
pub const EDR_SCALE: f64 = 1000.0;

/// Position of a metric point on its axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisValue {
    Epoch(u32),
    DistanceRatio(f64),
    SdPairs(u32),
}

impl AxisValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            AxisValue::Epoch(e) => e as f64,
            AxisValue::DistanceRatio(r) => r,
            AxisValue::SdPairs(n) => n as f64,
        }
    }
}

/// One derived metric row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    pub axis_value: AxisValue,
    /// Mean success probability of the successful samples at this point
    pub p_succ: Option<f64>,
    pub edr: Option<f64>,
    pub lcr: Option<f64>,
    /// Rolling window length (time series only)
    pub window_size: Option<usize>,
    /// Successful samples behind `lcr`
    pub sample_count: usize,
}

/// Metrics of one (scenario, algorithm) series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    pub scenario: String,
    pub algorithm: String,
    pub points: Vec<MetricPoint>,
}

impl TimeSeries {
    /// EDR per epoch.
    pub fn throughput_series(&self) -> Vec<(u32, Option<f64>)> {
        self.series(|p| p.edr)
    }

    /// LCR per epoch.
    pub fn satisfaction_series(&self) -> Vec<(u32, Option<f64>)> {
        self.series(|p| p.lcr)
    }

    fn series(&self, f: impl Fn(&MetricPoint) -> Option<f64>) -> Vec<(u32, Option<f64>)> {
        self.points
            .iter()
            .filter_map(|p| match p.axis_value {
                AxisValue::Epoch(e) => Some((e, f(p))),
                _ => None,
            })
            .collect()
    }
}

/// All time series in the ledger, sorted by (scenario, algorithm).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeSeriesMetrics {
    pub series: Vec<TimeSeries>,
}

impl TimeSeriesMetrics {
    pub fn get(&self, scenario: &str, algorithm: &str) -> Option<&TimeSeries> {
        self.series
            .iter()
            .find(|s| s.scenario == scenario && s.algorithm == algorithm)
    }
}

/// Which sweep to aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepKind {
    DistanceRatio,
    SdPairs,
}

impl SweepKind {
    /// Group and axis value of a record belonging to this sweep.
    fn locate<'a>(
        &self,
        axis: &'a ExperimentAxis,
    ) -> Option<((&'a str, &'a str), AxisValue)> {
        let value = match (self, axis) {
            (SweepKind::DistanceRatio, ExperimentAxis::DistanceSweep { distance_ratio, .. }) => {
                AxisValue::DistanceRatio(*distance_ratio)
            }
            (SweepKind::SdPairs, ExperimentAxis::SdPairSweep { num_pairs, .. }) => {
                AxisValue::SdPairs(*num_pairs)
            }
            _ => return None,
        };
        Some((axis.group(), value))
    }

    /// Output file name for this sweep's table.
    pub fn file_name(&self) -> &'static str {
        match self {
            SweepKind::DistanceRatio => "distance_metrics.csv",
            SweepKind::SdPairs => "sd_pairs_metrics.csv",
        }
    }

    /// Column name of the swept axis.
    pub fn axis_column(&self) -> &'static str {
        match self {
            SweepKind::DistanceRatio => "distance_ratio",
            SweepKind::SdPairs => "sd_pairs",
        }
    }
}

/// One (scenario, algorithm) curve of a sweep, ordered by ascending axis value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepSeries {
    pub scenario: String,
    pub algorithm: String,
    pub points: Vec<MetricPoint>,
}

/// All curves of one sweep, sorted by (scenario, algorithm).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepMetrics {
    pub kind: SweepKind,
    pub series: Vec<SweepSeries>,
}

impl SweepMetrics {
    pub fn get(&self, scenario: &str, algorithm: &str) -> Option<&SweepSeries> {
        self.series
            .iter()
            .find(|s| s.scenario == scenario && s.algorithm == algorithm)
    }
}

/// Computes EDR and LCR tables.
#[derive(Debug, Clone)]
pub struct MetricSynthesizer {
    window_size: usize,
    threshold: f64,
    scale: f64,
}

impl Default for MetricSynthesizer {
    fn default() -> Self {
        Self {
            window_size: WINDOW_SIZE,
            threshold: SUCCESS_THRESHOLD,
            scale: EDR_SCALE,
        }
    }
}

impl MetricSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time-series metrics from the ledger's final records.
    pub fn compute_timeseries(&self, ledger: &ResultLedger) -> Result<TimeSeriesMetrics> {
        Ok(self.timeseries_from_records(&ledger.final_records()?))
    }

    /// Sweep metrics from the ledger's final records.
    pub fn compute_sweep(&self, ledger: &ResultLedger, kind: SweepKind) -> Result<SweepMetrics> {
        Ok(self.sweep_from_records(&ledger.final_records()?, kind))
    }

    pub fn timeseries_from_records(&self, records: &[JobRecord]) -> TimeSeriesMetrics {
        // (scenario, algorithm) -> epoch -> success probabilities of that epoch
        let mut groups: BTreeMap<(String, String), BTreeMap<u32, Vec<f64>>> = BTreeMap::new();
        for record in records {
            if let ExperimentAxis::TimeSeries {
                scenario,
                algorithm,
                epoch,
            } = &record.axis
            {
                let samples = groups
                    .entry((scenario.clone(), algorithm.clone()))
                    .or_default()
                    .entry(*epoch)
                    .or_default();
                if let Some(p) = succeeded_probability(record) {
                    samples.push(p);
                }
            }
        }

        let series = groups
            .into_iter()
            .map(|((scenario, algorithm), epochs)| {
                let per_epoch: BTreeMap<u32, Option<f64>> =
                    epochs.into_iter().map(|(e, s)| (e, mean(&s))).collect();
                let points = per_epoch
                    .iter()
                    .map(|(&epoch, &p_succ)| self.time_series_point(&per_epoch, epoch, p_succ))
                    .collect();
                debug!(scenario = %scenario, algorithm = %algorithm, "Computed time series");
                TimeSeries {
                    scenario,
                    algorithm,
                    points,
                }
            })
            .collect();

        TimeSeriesMetrics { series }
    }

    fn time_series_point(
        &self,
        per_epoch: &BTreeMap<u32, Option<f64>>,
        epoch: u32,
        p_succ: Option<f64>,
    ) -> MetricPoint {
        let lookback = self.window_size.saturating_sub(1) as u32;
        let window: Vec<f64> = per_epoch
            .range(epoch.saturating_sub(lookback)..=epoch)
            .filter_map(|(_, p)| *p)
            .collect();

        MetricPoint {
            axis_value: AxisValue::Epoch(epoch),
            p_succ,
            edr: p_succ.map(|p| p * self.scale),
            lcr: self.compliance(&window),
            window_size: Some(self.window_size),
            sample_count: window.len(),
        }
    }

    pub fn sweep_from_records(&self, records: &[JobRecord], kind: SweepKind) -> SweepMetrics {
        // (scenario, algorithm) -> trials as (axis value, success probability)
        let mut groups: BTreeMap<(String, String), Vec<(AxisValue, Option<f64>)>> =
            BTreeMap::new();
        for record in records {
            if let Some(((scenario, algorithm), value)) = kind.locate(&record.axis) {
                groups
                    .entry((scenario.to_string(), algorithm.to_string()))
                    .or_default()
                    .push((value, succeeded_probability(record)));
            }
        }

        let series = groups
            .into_iter()
            .map(|((scenario, algorithm), trials)| {
                debug!(
                    scenario = %scenario,
                    algorithm = %algorithm,
                    sweep = ?kind,
                    "Computed sweep"
                );
                SweepSeries {
                    scenario,
                    algorithm,
                    points: self.sweep_points(trials),
                }
            })
            .collect();

        SweepMetrics { kind, series }
    }

    /// Average the trials at each axis value of one curve.
    fn sweep_points(&self, mut trials: Vec<(AxisValue, Option<f64>)>) -> Vec<MetricPoint> {
        trials.sort_by(|a, b| a.0.as_f64().total_cmp(&b.0.as_f64()));

        let mut points = Vec::new();
        let mut i = 0;
        while i < trials.len() {
            let axis_value = trials[i].0;
            let mut j = i;
            while j < trials.len() && trials[j].0 == axis_value {
                j += 1;
            }
            let probs: Vec<f64> = trials[i..j].iter().filter_map(|(_, p)| *p).collect();
            let edrs: Vec<f64> = probs.iter().map(|p| p * self.scale).collect();
            points.push(MetricPoint {
                axis_value,
                p_succ: mean(&probs),
                edr: mean(&edrs),
                lcr: self.compliance(&probs),
                window_size: None,
                sample_count: probs.len(),
            });
            i = j;
        }
        points
    }

    fn compliance(&self, probs: &[f64]) -> Option<f64> {
        if probs.is_empty() {
            return None;
        }
        let compliant = probs.iter().filter(|&&p| p >= self.threshold).count();
        Some(compliant as f64 / probs.len() as f64)
    }
}

fn succeeded_probability(record: &JobRecord) -> Option<f64> {
    match record.status {
        JobStatus::Succeeded => record.success_probability(),
        _ => None,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
