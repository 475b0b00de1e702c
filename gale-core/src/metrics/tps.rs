//! Per-second throughput sampling
//!
//! The controller's 1 Hz tick reads-and-resets a per-second counter and
//! publishes the value here. Samples live in a bounded ring; readers get
//! defensive copies.

use std::collections::VecDeque;
use std::sync::Mutex;

/// Default retention: one hour of one-second samples
pub const DEFAULT_MAX_SAMPLES: usize = 3600;

/// One throughput observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpsSample {
    pub timestamp_ms: u64,
    pub tps: u64,
}

/// Bounded ring of per-second TPS samples
pub struct TpsMetrics {
    max_samples: usize,
    samples: Mutex<VecDeque<TpsSample>>,
}

impl TpsMetrics {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_SAMPLES)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            max_samples,
            samples: Mutex::new(VecDeque::with_capacity(max_samples.min(1024))),
        }
    }

    /// Append a sample, evicting the oldest when the ring is full
    pub fn record(&self, timestamp_ms: u64, tps: u64) {
        let mut samples = self.samples.lock().unwrap();
        if samples.len() == self.max_samples {
            samples.pop_front();
        }
        samples.push_back(TpsSample { timestamp_ms, tps });
    }

    /// Defensive copy of all retained samples, oldest first
    pub fn samples(&self) -> Vec<TpsSample> {
        self.samples.lock().unwrap().iter().copied().collect()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.lock().unwrap().len()
    }

    pub fn max_tps(&self) -> u64 {
        self.samples
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.tps)
            .max()
            .unwrap_or(0)
    }

    pub fn min_tps(&self) -> u64 {
        self.samples
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.tps)
            .min()
            .unwrap_or(0)
    }

    pub fn average_tps(&self) -> f64 {
        let samples = self.samples.lock().unwrap();
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().map(|s| s.tps).sum::<u64>() as f64 / samples.len() as f64
    }

    /// The most recent sample's value; 0 when empty
    pub fn current_tps(&self) -> u64 {
        self.samples.lock().unwrap().back().map(|s| s.tps).unwrap_or(0)
    }

    pub fn reset(&self) {
        self.samples.lock().unwrap().clear();
    }
}

impl Default for TpsMetrics {
    fn default() -> Self {
        Self::new()
    }
}
