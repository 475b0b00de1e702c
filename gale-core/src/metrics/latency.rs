//! Latency histograms with periodic snapshotting
//!
//! Two high-dynamic-range histograms are kept: HTTP response times and rate
//! limiter waits, both in milliseconds over [0, 1h] at 3 significant digits.
//! Workers record into an interval histogram under a short lock; the 1 Hz
//! tick folds the interval into an accumulated histogram and republishes the
//! read snapshot. Percentile/mean/stddev reads see only snapshotted values,
//! so a value recorded before tick K is visible at or before tick K+1.

use hdrhistogram::Histogram;
use std::sync::{Mutex, RwLock};

/// Highest trackable value: one hour in milliseconds
pub const HISTOGRAM_MAX_MS: u64 = 3_600_000;

/// Histogram precision in significant digits
pub const HISTOGRAM_SIGFIGS: u8 = 3;

fn new_histogram() -> Histogram<u64> {
    Histogram::new_with_max(HISTOGRAM_MAX_MS, HISTOGRAM_SIGFIGS)
        .expect("histogram bounds are statically valid")
}

/// Interval/accumulated/snapshot triple for one measurement
struct HistogramSet {
    interval: Mutex<Histogram<u64>>,
    accumulated: Mutex<Histogram<u64>>,
    snapshot: RwLock<Histogram<u64>>,
}

impl HistogramSet {
    fn new() -> Self {
        Self {
            interval: Mutex::new(new_histogram()),
            accumulated: Mutex::new(new_histogram()),
            snapshot: RwLock::new(new_histogram()),
        }
    }

    fn record(&self, value_ms: u64) {
        self.interval.lock().unwrap().saturating_record(value_ms);
    }

    fn update_snapshot(&self) {
        let drained = {
            let mut interval = self.interval.lock().unwrap();
            std::mem::replace(&mut *interval, new_histogram())
        };
        let mut accumulated = self.accumulated.lock().unwrap();
        accumulated
            .add(&drained)
            .expect("histograms share identical bounds");
        *self.snapshot.write().unwrap() = accumulated.clone();
    }

    fn percentile(&self, percentile: f64) -> u64 {
        let snapshot = self.snapshot.read().unwrap();
        if snapshot.is_empty() {
            return 0;
        }
        snapshot.value_at_quantile(percentile / 100.0)
    }

    fn mean(&self) -> f64 {
        let snapshot = self.snapshot.read().unwrap();
        if snapshot.is_empty() {
            return 0.0;
        }
        snapshot.mean()
    }

    fn stdev(&self) -> f64 {
        let snapshot = self.snapshot.read().unwrap();
        if snapshot.is_empty() {
            return 0.0;
        }
        snapshot.stdev()
    }

    fn count(&self) -> u64 {
        self.snapshot.read().unwrap().len()
    }

    fn reset(&self) {
        self.interval.lock().unwrap().reset();
        self.accumulated.lock().unwrap().reset();
        self.snapshot.write().unwrap().reset();
    }
}

/// Response-time and rate-limiter-wait histograms behind the
/// recorder/snapshot pattern
pub struct LatencyMetrics {
    response: HistogramSet,
    limiter_wait: HistogramSet,
}

impl LatencyMetrics {
    pub fn new() -> Self {
        Self {
            response: HistogramSet::new(),
            limiter_wait: HistogramSet::new(),
        }
    }

    pub fn record_response_time(&self, response_time_ms: u64) {
        self.response.record(response_time_ms);
    }

    /// Wait is reported by the regulator in seconds; stored in milliseconds
    pub fn record_limiter_wait(&self, wait_secs: f64) {
        self.limiter_wait.record((wait_secs * 1000.0) as u64);
    }

    /// Fold recorded values into the read snapshots; called by the 1 Hz tick
    /// and once more at shutdown
    pub fn update_snapshots(&self) {
        self.response.update_snapshot();
        self.limiter_wait.update_snapshot();
    }

    pub fn response_percentile(&self, percentile: f64) -> u64 {
        self.response.percentile(percentile)
    }

    pub fn wait_percentile(&self, percentile: f64) -> u64 {
        self.limiter_wait.percentile(percentile)
    }

    pub fn mean_response_time(&self) -> f64 {
        self.response.mean()
    }

    pub fn response_time_stdev(&self) -> f64 {
        self.response.stdev()
    }

    pub fn response_count(&self) -> u64 {
        self.response.count()
    }

    pub fn reset(&self) {
        self.response.reset();
        self.limiter_wait.reset();
    }
}

impl Default for LatencyMetrics {
    fn default() -> Self {
        Self::new()
    }
}
