// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Remote execution collaborators.
//!
//! This module provides the [`RemoteExecutor`] trait the orchestrator drives,
//! the benchmark circuits it submits, and backend selection:
//!
//! - `ibm::IbmExecutor`: IBM Quantum via the Qiskit Runtime REST API
//! - `selection`: pick and persist the backend for a run

pub mod circuit;
pub mod ibm;
pub mod selection;
pub mod r#trait;

pub use circuit::{CircuitKind, CircuitSpec};
pub use r#trait::{PollResponse, RemoteExecutor};
pub use selection::{select_backend, BackendCandidate, BackendSelection};
