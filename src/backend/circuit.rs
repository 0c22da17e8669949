// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Benchmark circuits and their OpenQASM 3.0 rendering.
//!
//! Three circuit families drive the experiment matrices:
//!
//! - `Bell`: H on q0, CX q0→q1, measure both. Ideal outcome is 00/11.
//! - `Chain`: 3-qubit GHZ-like chain repeated `depth_pairs` times, standing
//!   in for longer entanglement-distribution distances.
//! - `RepeatedBell`: a Bell pair followed by extra H/CX blocks separated by
//!   barriers, standing in for contention from more SD pairs.

use std::fmt::Write as _;

/// Shape of a benchmark circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitKind {
    Bell,
    Chain { depth_pairs: u32 },
    RepeatedBell { reps: u32 },
}

/// A circuit ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitSpec {
    /// Name forwarded to the service
    pub name: String,
    pub kind: CircuitKind,
    /// Transpiler optimization level (0-3)
    pub optimization_level: u32,
    /// Transpiler seed
    pub seed: Option<u64>,
}

impl CircuitSpec {
    pub fn new(name: impl Into<String>, kind: CircuitKind, optimization_level: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            optimization_level,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Number of qubits (and classical bits) the circuit uses.
    pub fn num_qubits(&self) -> u32 {
        match self.kind {
            CircuitKind::Bell | CircuitKind::RepeatedBell { .. } => 2,
            CircuitKind::Chain { .. } => 3,
        }
    }

    /// Render as OpenQASM 3.0.
    pub fn to_qasm(&self) -> String {
        let n = self.num_qubits();
        let mut qasm = String::from("OPENQASM 3.0;\n");
        qasm.push_str("include \"stdgates.inc\";\n");
        let _ = writeln!(qasm, "qubit[{n}] q;");
        let _ = writeln!(qasm, "bit[{n}] c;\n");

        qasm.push_str("h q[0];\n");
        match self.kind {
            CircuitKind::Bell => {
                qasm.push_str("cx q[0], q[1];\n");
            }
            CircuitKind::Chain { depth_pairs } => {
                for _ in 0..depth_pairs {
                    qasm.push_str("cx q[0], q[1];\ncx q[1], q[2];\n");
                }
            }
            CircuitKind::RepeatedBell { reps } => {
                qasm.push_str("cx q[0], q[1];\n");
                for _ in 1..reps.max(1) {
                    qasm.push_str("barrier q;\nh q[0];\ncx q[0], q[1];\n");
                }
            }
        }

        qasm.push('\n');
        for i in 0..n {
            let _ = writeln!(qasm, "c[{i}] = measure q[{i}];");
        }
        qasm
    }
}
