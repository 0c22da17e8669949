// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Input validation for job submissions.

use std::time::Duration;

use crate::backend::circuit::{CircuitKind, CircuitSpec};
use crate::error::{Result, ValidationError};

/// Largest shot count accepted for a single job.
pub const MAX_SHOTS: u32 = 100_000;

/// Deepest chain circuit accepted (CX pairs).
pub const MAX_DEPTH_PAIRS: u32 = 64;

/// Most Bell blocks accepted in a repeated-Bell circuit.
pub const MAX_REPS: u32 = 64;

/// Retry budget ceiling for one experiment point.
pub const MAX_RETRIES: u32 = 10;

/// Validate submission parameters for one experiment point.
pub fn validate_submission(shot_count: u32, max_retries: u32, timeout: Duration) -> Result<()> {
    if shot_count == 0 {
        return Err(ValidationError::Field {
            field: "shot_count".into(),
            message: "must be greater than 0".into(),
        }
        .into());
    }

    if shot_count > MAX_SHOTS {
        return Err(ValidationError::ResourceLimit {
            resource: "shot_count".into(),
            limit: MAX_SHOTS as u64,
            requested: shot_count as u64,
        }
        .into());
    }

    if max_retries > MAX_RETRIES {
        return Err(ValidationError::ResourceLimit {
            resource: "max_retries".into(),
            limit: MAX_RETRIES as u64,
            requested: max_retries as u64,
        }
        .into());
    }

    if timeout.is_zero() {
        return Err(ValidationError::Field {
            field: "timeout".into(),
            message: "must be greater than 0".into(),
        }
        .into());
    }

    Ok(())
}

/// Validate a benchmark circuit before submission.
pub fn validate_circuit(circuit: &CircuitSpec) -> Result<()> {
    if circuit.name.trim().is_empty() {
        return Err(ValidationError::Field {
            field: "circuit.name".into(),
            message: "cannot be empty".into(),
        }
        .into());
    }

    if circuit.optimization_level > 3 {
        return Err(ValidationError::Field {
            field: "optimization_level".into(),
            message: format!("{} is outside 0..=3", circuit.optimization_level),
        }
        .into());
    }

    match circuit.kind {
        CircuitKind::Bell => {}
        CircuitKind::Chain { depth_pairs } => {
            if depth_pairs == 0 {
                return Err(ValidationError::Field {
                    field: "depth_pairs".into(),
                    message: "must be greater than 0".into(),
                }
                .into());
            }
            if depth_pairs > MAX_DEPTH_PAIRS {
                return Err(ValidationError::ResourceLimit {
                    resource: "depth_pairs".into(),
                    limit: MAX_DEPTH_PAIRS as u64,
                    requested: depth_pairs as u64,
                }
                .into());
            }
        }
        CircuitKind::RepeatedBell { reps } => {
            if reps == 0 {
                return Err(ValidationError::Field {
                    field: "reps".into(),
                    message: "must be greater than 0".into(),
                }
                .into());
            }
            if reps > MAX_REPS {
                return Err(ValidationError::ResourceLimit {
                    resource: "reps".into(),
                    limit: MAX_REPS as u64,
                    requested: reps as u64,
                }
                .into());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_validate_submission() {
        let timeout = Duration::from_secs(1800);

        // Valid request
        assert!(validate_submission(256, 3, timeout).is_ok());

        // Zero shots
        assert!(validate_submission(0, 3, timeout).is_err());

        // Exceeds max shots
        let err = validate_submission(1_000_000, 3, timeout).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::ResourceLimit { .. })
        ));

        // Zero timeout
        assert!(validate_submission(256, 3, Duration::ZERO).is_err());

        // Retry budget
        assert!(validate_submission(256, MAX_RETRIES + 1, timeout).is_err());
        assert!(validate_submission(256, 0, timeout).is_ok());
    }

    #[test]
    fn test_validate_circuit() {
        assert!(validate_circuit(&CircuitSpec::new("bell", CircuitKind::Bell, 1)).is_ok());
        assert!(validate_circuit(&CircuitSpec::new("bell", CircuitKind::Bell, 4)).is_err());
        assert!(validate_circuit(&CircuitSpec::new("", CircuitKind::Bell, 0)).is_err());

        let chain = |d| CircuitSpec::new("chain", CircuitKind::Chain { depth_pairs: d }, 0);
        assert!(validate_circuit(&chain(7)).is_ok());
        assert!(validate_circuit(&chain(0)).is_err());
        assert!(validate_circuit(&chain(MAX_DEPTH_PAIRS + 1)).is_err());

        let sd = |r| CircuitSpec::new("sd", CircuitKind::RepeatedBell { reps: r }, 3);
        assert!(validate_circuit(&sd(3)).is_ok());
        assert!(validate_circuit(&sd(0)).is_err());
    }
}
