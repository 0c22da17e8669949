// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Two-qubit outcome histograms.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::ValidationError;

/// A 2-bit measurement outcome label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Outcome {
    Zero0,
    Zero1,
    One0,
    One1,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [Outcome::Zero0, Outcome::Zero1, Outcome::One0, Outcome::One1];

    /// Label as printed by the sampler, e.g. `"01"`.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Zero0 => "00",
            Outcome::Zero1 => "01",
            Outcome::One0 => "10",
            Outcome::One1 => "11",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }

    fn from_bits(bits: u64) -> Self {
        Outcome::ALL[(bits & 0b11) as usize]
    }

    /// Parse an exact 2-bit label.
    pub fn parse(label: &str) -> Option<Self> {
        Outcome::ALL.into_iter().find(|o| o.label() == label)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Shot counts over the four 2-bit outcomes.
///
/// Serialized as a map `{"00": n, "01": n, "10": n, "11": n}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "BTreeMap<String, u64>", try_from = "BTreeMap<String, u64>")]
pub struct OutcomeCounts {
    counts: [u64; 4],
}

impl OutcomeCounts {
    pub fn new(c00: u64, c01: u64, c10: u64, c11: u64) -> Self {
        Self {
            counts: [c00, c01, c10, c11],
        }
    }

    /// Fold a raw sampler histogram onto the 2-bit outcomes of qubits 0 and 1.
    ///
    /// Keys may be binary bitstrings of any width (`"011"`, `"0 1"` register
    /// separators are ignored) or hex strings (`"0x3"`). Only the two
    /// least-significant bits are kept, which marginalizes out any wider
    /// registers. Counts whose sum does not fit in a `u64` are rejected.
    pub fn from_raw<'a, I>(raw: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (&'a String, &'a u64)>,
    {
        let mut counts = Self::default();
        for (key, &n) in raw {
            let bits = parse_outcome_key(key).ok_or_else(|| ValidationError::Field {
                field: "outcome_counts".into(),
                message: format!("unrecognized outcome label '{key}'"),
            })?;
            counts.add(Outcome::from_bits(bits), n)?;
        }
        Ok(counts)
    }

    fn add(&mut self, outcome: Outcome, n: u64) -> Result<(), ValidationError> {
        let overflow = || ValidationError::Field {
            field: "outcome_counts".into(),
            message: "shot counts overflow".into(),
        };
        // Keeping the running total in range means total() never wraps.
        self.checked_total()
            .and_then(|t| t.checked_add(n))
            .ok_or_else(overflow)?;
        let slot = &mut self.counts[outcome.index()];
        *slot = slot.checked_add(n).ok_or_else(overflow)?;
        Ok(())
    }

    fn checked_total(&self) -> Option<u64> {
        self.counts.iter().try_fold(0u64, |acc, &n| acc.checked_add(n))
    }

    /// Convenience wrapper over [`OutcomeCounts::from_raw`] for owned maps.
    pub fn from_histogram(raw: &HashMap<String, u64>) -> Result<Self, ValidationError> {
        Self::from_raw(raw.iter())
    }

    pub fn get(&self, outcome: Outcome) -> u64 {
        self.counts[outcome.index()]
    }

    /// Total shots; saturates for counts built directly with [`OutcomeCounts::new`].
    pub fn total(&self) -> u64 {
        self.checked_total().unwrap_or(u64::MAX)
    }

    /// Base success probability `(n00 + n11) / total`; `None` when empty.
    pub fn success_probability(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let hits = self.get(Outcome::Zero0).saturating_add(self.get(Outcome::One1));
        Some(hits as f64 / total as f64)
    }

    /// Check the counts account for exactly `shots` shots.
    pub fn check_total(&self, shots: u64) -> Result<(), ValidationError> {
        let actual = self.total();
        if actual != shots {
            return Err(ValidationError::ShotMismatch {
                expected: shots,
                actual,
            });
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Outcome, u64)> + '_ {
        Outcome::ALL.into_iter().map(move |o| (o, self.get(o)))
    }
}

fn parse_outcome_key(key: &str) -> Option<u64> {
    let key = key.trim();
    if let Some(hex) = key.strip_prefix("0x").or_else(|| key.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok();
    }
    let bits: String = key.chars().filter(|c| !c.is_whitespace()).collect();
    if bits.is_empty() || !bits.chars().all(|c| c == '0' || c == '1') {
        return None;
    }
    // Only the low two bits matter, so long registers never overflow.
    let tail = &bits[bits.len().saturating_sub(2)..];
    u64::from_str_radix(tail, 2).ok()
}

impl From<OutcomeCounts> for BTreeMap<String, u64> {
    fn from(counts: OutcomeCounts) -> Self {
        counts
            .iter()
            .map(|(o, n)| (o.label().to_string(), n))
            .collect()
    }
}

impl TryFrom<BTreeMap<String, u64>> for OutcomeCounts {
    type Error = String;

    fn try_from(map: BTreeMap<String, u64>) -> Result<Self, Self::Error> {
        let mut counts = Self::default();
        for (label, n) in map {
            let outcome =
                Outcome::parse(&label).ok_or_else(|| format!("invalid outcome label '{label}'"))?;
            counts.add(outcome, n).map_err(|e| e.to_string())?;
        }
        Ok(counts)
    }
}
