//! Request counters and status code accounting

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Monotonic request outcome counters, incremented lock-free by workers
#[derive(Default)]
pub struct RequestCounters {
    total_requests: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    timeout_count: AtomicU64,
    skipped_count: AtomicU64,
    /// Estimated bytes received (response bodies plus headers)
    bytes_received: AtomicU64,
}

impl RequestCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_total(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_success(&self) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_timeout(&self) {
        self.timeout_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_skipped(&self) {
        self.skipped_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_received(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn success_count(&self) -> u64 {
        self.success_count.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn timeout_count(&self) -> u64 {
        self.timeout_count.load(Ordering::Relaxed)
    }

    pub fn skipped_count(&self) -> u64 {
        self.skipped_count.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// `successCount / totalRequests`; 0 when nothing ran
    pub fn success_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        self.success_count() as f64 / total as f64
    }

    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.timeout_count.store(0, Ordering::Relaxed);
        self.skipped_count.store(0, Ordering::Relaxed);
        self.bytes_received.store(0, Ordering::Relaxed);
    }
}

/// Per-status-code counters with lazy key insertion. Increments for an
/// existing code only take the read lock.
#[derive(Default)]
pub struct StatusCodeMetrics {
    counts: RwLock<HashMap<u16, AtomicU64>>,
}

impl StatusCodeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, status: u16) {
        {
            let counts = self.counts.read().unwrap();
            if let Some(counter) = counts.get(&status) {
                counter.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        let mut counts = self.counts.write().unwrap();
        counts
            .entry(status)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, status: u16) -> u64 {
        self.counts
            .read()
            .unwrap()
            .get(&status)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Sorted snapshot of every observed status code
    pub fn all_counts(&self) -> BTreeMap<u16, u64> {
        self.counts
            .read()
            .unwrap()
            .iter()
            .map(|(code, count)| (*code, count.load(Ordering::Relaxed)))
            .collect()
    }

    fn count_range(&self, range: std::ops::Range<u16>) -> u64 {
        self.counts
            .read()
            .unwrap()
            .iter()
            .filter(|(code, _)| range.contains(code))
            .map(|(_, count)| count.load(Ordering::Relaxed))
            .sum()
    }

    pub fn success_count(&self) -> u64 {
        self.count_range(200..300)
    }

    pub fn client_error_count(&self) -> u64 {
        self.count_range(400..500)
    }

    pub fn server_error_count(&self) -> u64 {
        self.count_range(500..600)
    }

    pub fn total_count(&self) -> u64 {
        self.counts
            .read()
            .unwrap()
            .values()
            .map(|count| count.load(Ordering::Relaxed))
            .sum()
    }

    pub fn has_errors(&self) -> bool {
        self.counts.read().unwrap().keys().any(|code| *code >= 400)
    }

    pub fn reset(&self) {
        self.counts.write().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters_accumulate() {
        let counters = RequestCounters::new();
        counters.increment_total();
        counters.increment_total();
        counters.increment_success();
        counters.increment_failure();
        counters.increment_timeout();
        counters.increment_skipped();
        counters.add_bytes_received(512);

        assert_eq!(counters.total_requests(), 2);
        assert_eq!(counters.success_count(), 1);
        assert_eq!(counters.failure_count(), 1);
        assert_eq!(counters.timeout_count(), 1);
        assert_eq!(counters.skipped_count(), 1);
        assert_eq!(counters.bytes_received(), 512);
        assert!((counters.success_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_success_rate_empty() {
        assert_eq!(RequestCounters::new().success_rate(), 0.0);
    }

    #[test]
    fn test_counters_reset() {
        let counters = RequestCounters::new();
        counters.increment_total();
        counters.increment_success();
        counters.reset();
        assert_eq!(counters.total_requests(), 0);
        assert_eq!(counters.success_count(), 0);
        assert_eq!(counters.success_rate(), 0.0);
    }

    #[test]
    fn test_status_codes_lazy_insert() {
        let metrics = StatusCodeMetrics::new();
        metrics.record(200);
        metrics.record(200);
        metrics.record(404);
        metrics.record(503);

        assert_eq!(metrics.count(200), 2);
        assert_eq!(metrics.count(404), 1);
        assert_eq!(metrics.count(418), 0);
        assert_eq!(metrics.success_count(), 2);
        assert_eq!(metrics.client_error_count(), 1);
        assert_eq!(metrics.server_error_count(), 1);
        assert_eq!(metrics.total_count(), 4);
        assert!(metrics.has_errors());
    }

    #[test]
    fn test_status_codes_sorted_snapshot() {
        let metrics = StatusCodeMetrics::new();
        metrics.record(503);
        metrics.record(200);
        metrics.record(301);
        let all: Vec<u16> = metrics.all_counts().keys().copied().collect();
        assert_eq!(all, [200, 301, 503]);
    }

    #[test]
    fn test_status_codes_no_errors() {
        let metrics = StatusCodeMetrics::new();
        metrics.record(200);
        metrics.record(302);
        assert!(!metrics.has_errors());
    }

    #[test]
    fn test_status_codes_concurrent_increments() {
        let metrics = Arc::new(StatusCodeMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.record(200);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.count(200), 8000);
    }

    #[test]
    fn test_status_codes_reset() {
        let metrics = StatusCodeMetrics::new();
        metrics.record(500);
        metrics.reset();
        assert_eq!(metrics.total_count(), 0);
        assert!(!metrics.has_errors());
    }
}
