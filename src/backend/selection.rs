// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Backend selection.
//!
//! A run targets a single backend, chosen once up front and persisted to
//! `backend.json` so later stages (collection, metrics) agree on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{RemoteError, Result};

/// A backend advertised by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCandidate {
    pub name: String,
    pub num_qubits: u32,
    #[serde(default)]
    pub pending_jobs: u32,
    #[serde(default)]
    pub simulator: bool,
}

/// The persisted backend choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSelection {
    pub backend_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl BackendSelection {
    pub fn new(backend_name: impl Into<String>) -> Self {
        Self {
            backend_name: backend_name.into(),
            timestamp: Utc::now(),
            note: None,
        }
    }

    /// Read a selection written by [`BackendSelection::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the selection as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(backend = %self.backend_name, path = %path.display(), "Wrote backend selection");
        Ok(())
    }
}

/// Pick the most capable backend.
///
/// Real devices win over simulators; among real devices the one with the
/// most qubits, then the shortest queue. With no real device the first
/// simulator is used.
pub fn select_backend(
    candidates: &[BackendCandidate],
) -> std::result::Result<BackendSelection, RemoteError> {
    let best_device = candidates
        .iter()
        .filter(|c| !c.simulator)
        .min_by_key(|c| (std::cmp::Reverse(c.num_qubits), c.pending_jobs));

    if let Some(device) = best_device {
        info!(
            backend = %device.name,
            num_qubits = device.num_qubits,
            pending_jobs = device.pending_jobs,
            "Selected real backend"
        );
        let mut selection = BackendSelection::new(&device.name);
        selection.note = Some(format!(
            "real device, {} qubits, {} pending jobs",
            device.num_qubits, device.pending_jobs
        ));
        return Ok(selection);
    }

    if let Some(sim) = candidates.iter().find(|c| c.simulator) {
        info!(backend = %sim.name, "No real devices available; using simulator");
        let mut selection = BackendSelection::new(&sim.name);
        selection.note = Some("simulator fallback".into());
        return Ok(selection);
    }

    Err(RemoteError::NotFound(
        "no backends available; check token or instance".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, qubits: u32, pending: u32, simulator: bool) -> BackendCandidate {
        BackendCandidate {
            name: name.into(),
            num_qubits: qubits,
            pending_jobs: pending,
            simulator,
        }
    }

    #[test]
    fn test_prefers_most_qubits() {
        let selection = select_backend(&[
            candidate("ibm_brisbane", 127, 3, false),
            candidate("ibm_torino", 133, 40, false),
        ])
        .unwrap();
        assert_eq!(selection.backend_name, "ibm_torino");
    }

    #[test]
    fn test_ties_broken_by_queue() {
        let selection = select_backend(&[
            candidate("ibm_a", 156, 50, false),
            candidate("ibm_b", 156, 2, false),
        ])
        .unwrap();
        assert_eq!(selection.backend_name, "ibm_b");
    }

    #[test]
    fn test_real_device_beats_bigger_simulator() {
        let selection = select_backend(&[
            candidate("aer", 1000, 0, true),
            candidate("ibm_small", 5, 9, false),
        ])
        .unwrap();
        assert_eq!(selection.backend_name, "ibm_small");
    }

    #[test]
    fn test_simulator_fallback() {
        let selection = select_backend(&[candidate("aer", 32, 0, true)]).unwrap();
        assert_eq!(selection.backend_name, "aer");
        assert_eq!(selection.note.as_deref(), Some("simulator fallback"));
    }

    #[test]
    fn test_no_backends() {
        assert!(matches!(select_backend(&[]), Err(RemoteError::NotFound(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("backend.json");
        let selection = BackendSelection::new("ibm_torino");
        selection.save(&path).unwrap();

        let loaded = BackendSelection::load(&path).unwrap();
        assert_eq!(loaded, selection);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["backend_name"], "ibm_torino");
        assert!(raw.get("timestamp").is_some());
    }
}
