// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tabular output of derived metrics (CSV and JSON).

use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

use super::{AxisValue, MetricPoint, SweepMetrics, TimeSeriesMetrics};
use crate::error::Result;

/// File name of the time-series table.
pub const TIMESERIES_FILE: &str = "timeseries_metrics.csv";

/// A single table cell. `Empty` marks an undefined value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Int(u64),
    Float(f64),
    Empty,
}

impl Cell {
    fn opt_float(v: Option<f64>) -> Self {
        match v {
            Some(x) if x.is_finite() => Cell::Float(x),
            _ => Cell::Empty,
        }
    }

    fn to_csv(&self) -> String {
        match self {
            Cell::Text(s) if s.contains([',', '"', '\n']) => {
                format!("\"{}\"", s.replace('"', "\"\""))
            }
            Cell::Text(s) => s.clone(),
            Cell::Int(n) => n.to_string(),
            Cell::Float(x) => x.to_string(),
            Cell::Empty => String::new(),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Cell::Text(s) => Value::from(s.as_str()),
            Cell::Int(n) => Value::from(*n),
            Cell::Float(x) => Value::from(*x),
            Cell::Empty => Value::Null,
        }
    }
}

/// Rows of derived metrics with a fixed header.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricTable {
    pub header: Vec<&'static str>,
    pub rows: Vec<Vec<Cell>>,
}

fn metric_cells(point: &MetricPoint) -> [Cell; 3] {
    [
        Cell::opt_float(point.p_succ),
        Cell::opt_float(point.edr),
        Cell::opt_float(point.lcr),
    ]
}

impl From<&TimeSeriesMetrics> for MetricTable {
    fn from(metrics: &TimeSeriesMetrics) -> Self {
        let mut rows = Vec::new();
        for series in &metrics.series {
            for point in &series.points {
                let [p_succ, edr, lcr] = metric_cells(point);
                rows.push(vec![
                    Cell::Text(series.scenario.clone()),
                    Cell::Text(series.algorithm.clone()),
                    axis_cell(point.axis_value),
                    p_succ,
                    edr,
                    lcr,
                    point
                        .window_size
                        .map_or(Cell::Empty, |w| Cell::Int(w as u64)),
                    Cell::Int(point.sample_count as u64),
                ]);
            }
        }
        Self {
            header: vec![
                "scenario",
                "algorithm",
                "epoch",
                "p_succ",
                "edr",
                "lcr",
                "window_size",
                "sample_count",
            ],
            rows,
        }
    }
}

impl From<&SweepMetrics> for MetricTable {
    fn from(metrics: &SweepMetrics) -> Self {
        let mut rows = Vec::new();
        for series in &metrics.series {
            for point in &series.points {
                let [p_succ, edr, lcr] = metric_cells(point);
                rows.push(vec![
                    Cell::Text(series.scenario.clone()),
                    Cell::Text(series.algorithm.clone()),
                    axis_cell(point.axis_value),
                    p_succ,
                    edr,
                    lcr,
                    Cell::Int(point.sample_count as u64),
                ]);
            }
        }
        Self {
            header: vec![
                "scenario",
                "algorithm",
                metrics.kind.axis_column(),
                "p_succ",
                "edr",
                "lcr",
                "sample_count",
            ],
            rows,
        }
    }
}

fn axis_cell(value: AxisValue) -> Cell {
    match value {
        AxisValue::Epoch(n) | AxisValue::SdPairs(n) => Cell::Int(n as u64),
        AxisValue::DistanceRatio(r) => Cell::Float(r),
    }
}

impl MetricTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write as CSV, creating parent directories.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "{}", self.header.join(","))?;
        for row in &self.rows {
            let line: Vec<String> = row.iter().map(Cell::to_csv).collect();
            writeln!(writer, "{}", line.join(","))?;
        }
        writer.flush()?;
        info!(path = %path.display(), rows = self.rows.len(), "Wrote metric table");
        Ok(())
    }

    /// Render as CSV text.
    pub fn to_csv(&self) -> String {
        let mut out = self.header.join(",");
        out.push('\n');
        for row in &self.rows {
            let line: Vec<String> = row.iter().map(Cell::to_csv).collect();
            out.push_str(&line.join(","));
            out.push('\n');
        }
        out
    }

    /// Render as a JSON array of objects keyed by column name.
    pub fn to_json(&self) -> Result<String> {
        let rows: Vec<Value> = self
            .rows
            .iter()
            .map(|row| {
                let object: Map<String, Value> = self
                    .header
                    .iter()
                    .zip(row)
                    .map(|(k, cell)| (k.to_string(), cell.to_json()))
                    .collect();
                Value::Object(object)
            })
            .collect();
        Ok(serde_json::to_string_pretty(&rows)?)
    }
}
