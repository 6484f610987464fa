//! Variance monitor — detects an erratic emotion signal.
//!
//! Keeps a fixed-capacity ring buffer of recent scalar samples and reports:
//!
//! - `variance_level`: population variance of the whole buffer (0 with < 2 samples)
//! - `high_variance`: `variance_level > high_variance_threshold`
//! - `increasing`: the newer half of the buffer is more spread out than the
//!   older half by more than `increasing_variance_threshold`
//!
//! The buffer splits at `len / 2`; the newer half takes the extra sample when
//! the length is odd.  `increasing` needs at least two samples in each half.
//! A step change is flagged while it straddles the split and clears once
//! both halves are flat again.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Minimum ring-buffer capacity: two samples in each half, so the
/// `increasing` comparison can fire.
pub const MIN_WINDOW: usize = 4;

/// One monitor observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarianceReading {
    pub variance_level: f32,
    pub high_variance: bool,
    pub increasing: bool,
}

impl Default for VarianceReading {
    fn default() -> Self {
        Self {
            variance_level: 0.0,
            high_variance: false,
            increasing: false,
        }
    }
}

/// Rolling-variance tracker over the most recent `capacity` samples.
#[derive(Debug, Clone)]
pub struct VarianceMonitor {
    capacity: usize,
    high_variance_threshold: f32,
    increasing_variance_threshold: f32,
    samples: VecDeque<f32>,
    last: VarianceReading,
}

impl VarianceMonitor {
    pub fn new(
        capacity: usize,
        high_variance_threshold: f32,
        increasing_variance_threshold: f32,
    ) -> Self {
        let capacity = capacity.max(MIN_WINDOW);
        Self {
            capacity,
            high_variance_threshold,
            increasing_variance_threshold,
            samples: VecDeque::with_capacity(capacity),
            last: VarianceReading::default(),
        }
    }

    /// Push a sample (evicting the oldest when full) and evaluate the buffer.
    pub fn observe(&mut self, value: f32) -> VarianceReading {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);

        let variance_level = population_variance(self.samples.iter().copied());
        let increasing = self.half_variance_gap() > self.increasing_variance_threshold;

        self.last = VarianceReading {
            variance_level,
            high_variance: variance_level > self.high_variance_threshold,
            increasing,
        };
        self.last
    }

    /// Reading produced by the most recent `observe`.
    pub fn last_reading(&self) -> VarianceReading {
        self.last
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffered samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.last = VarianceReading::default();
    }

    /// Newer-half variance minus older-half variance; `-inf` when either
    /// half has fewer than two samples.
    fn half_variance_gap(&self) -> f32 {
        let split = self.samples.len() / 2;
        if split < 2 {
            return f32::NEG_INFINITY;
        }
        let older = population_variance(self.samples.iter().take(split).copied());
        let newer = population_variance(self.samples.iter().skip(split).copied());
        newer - older
    }
}

/// Population variance; 0 for fewer than two samples.
fn population_variance(values: impl Iterator<Item = f32> + Clone) -> f32 {
    let (n, sum) = values.clone().fold((0usize, 0.0f32), |(n, s), v| (n + 1, s + v));
    if n < 2 {
        return 0.0;
    }
    let mean = sum / n as f32;
    values.map(|v| (v - mean) * (v - mean)).sum::<f32>() / n as f32
}

// ============================================================================
// Tests
// ============================================================================
