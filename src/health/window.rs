//! Fixed-capacity rolling window of probe samples.
//!
//! Oldest samples are evicted as new ones arrive, so memory stays bounded no
//! matter how long the process runs. Lifetime counters are kept alongside for
//! the metrics view.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

/// One recorded probe outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub success: bool,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    samples: VecDeque<Sample>,
    total_successes: u64,
    total_failures: u64,
    short_circuits: u64,
}

impl RollingWindow {
    /// A capacity of zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
            total_successes: 0,
            total_failures: 0,
            short_circuits: 0,
        }
    }

    pub fn record(&mut self, success: bool, duration: Duration, timestamp: DateTime<Utc>) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample {
            success,
            duration_ms: duration.as_secs_f64() * 1000.0,
            timestamp,
        });
        if success {
            self.total_successes += 1;
        } else {
            self.total_failures += 1;
        }
    }

    pub fn record_short_circuit(&mut self) {
        self.short_circuits += 1;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Share of successful samples currently in the window, `None` when empty.
    pub fn success_ratio(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let ok = self.samples.iter().filter(|s| s.success).count();
        Some(ok as f64 / self.samples.len() as f64)
    }

    /// Mean latency of the samples in the window, in milliseconds.
    pub fn average_latency_ms(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let total: f64 = self.samples.iter().map(|s| s.duration_ms).sum();
        Some(total / self.samples.len() as f64)
    }

    pub fn history(&self) -> Vec<Sample> {
        self.samples.iter().cloned().collect()
    }

    pub fn total_successes(&self) -> u64 {
        self.total_successes
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }

    pub fn short_circuits(&self) -> u64 {
        self.short_circuits
    }
}
