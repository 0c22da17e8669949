// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Poll interval schedule.

use std::time::Duration;

use crate::config::OrchestratorConfig;

/// Exponential poll schedule capped at a maximum.
///
/// Delay `n` is `min(initial * multiplier^n, max)`. With `multiplier >= 1`
/// the sequence never decreases and never exceeds `max`.
#[derive(Debug, Clone)]
pub struct PollBackoff {
    initial_ms: u64,
    max_ms: u64,
    multiplier: f64,
    step: u32,
}

impl PollBackoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        let max_ms = max.as_millis() as u64;
        Self {
            initial_ms: (initial.as_millis() as u64).min(max_ms),
            max_ms,
            multiplier: multiplier.max(1.0),
            step: 0,
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(
            Duration::from_millis(config.poll_initial_ms),
            Duration::from_millis(config.poll_max_ms),
            config.poll_multiplier,
        )
    }

    /// Delay before the next poll; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let scaled = self.initial_ms as f64 * self.multiplier.powi(self.step as i32);
        let ms = if scaled.is_finite() && scaled < self.max_ms as f64 {
            scaled as u64
        } else {
            self.max_ms
        };
        self.step = self.step.saturating_add(1);
        Duration::from_millis(ms)
    }

    /// Start over for a new job.
    pub fn reset(&mut self) {
        self.step = 0;
    }
}
