//! Metrics aggregation fabric
//!
//! `MetricsCollector` is the single entry point workers record into. It owns
//! the counters, status code map, latency histograms, TPS sampler, error
//! analyzer, and the optional resource monitor, and hands immutable views to
//! the report builder at end of test.

pub mod counters;
pub mod errors;
pub mod latency;
pub mod resource;
pub mod tps;

pub use counters::{RequestCounters, StatusCodeMetrics};
pub use errors::{ErrorAnalyzer, ErrorReport, ErrorSample};
pub use latency::LatencyMetrics;
pub use resource::{ResourceMonitor, ResourceSnapshot};
pub use tps::{TpsMetrics, TpsSample};

use crate::config::TestSpec;
use crate::timing;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Aggregates all metrics for one test run
pub struct MetricsCollector {
    counters: RequestCounters,
    status_codes: StatusCodeMetrics,
    latency: LatencyMetrics,
    tps: TpsMetrics,
    errors: ErrorAnalyzer,
    resources: Option<ResourceMonitor>,

    /// Start instants of requests that have begun but not yet finished
    in_flight: Mutex<HashMap<u64, Instant>>,

    running: AtomicBool,
    start_time_ms: AtomicU64,
    end_time_ms: AtomicU64,
    requests_last_second: AtomicU64,
    current_tps: AtomicU64,
    /// Final average TPS, stored as f64 bits once the run completes
    average_tps_bits: AtomicU64,
}

impl MetricsCollector {
    pub fn new(spec: &TestSpec) -> Self {
        let monitoring = &spec.metrics.resource_monitoring;
        let resources = monitoring
            .enabled
            .then(|| ResourceMonitor::new(monitoring.sample_interval));

        tracing::info!("Initialized metrics collector");
        Self {
            counters: RequestCounters::new(),
            status_codes: StatusCodeMetrics::new(),
            latency: LatencyMetrics::new(),
            tps: TpsMetrics::new(),
            errors: ErrorAnalyzer::new(),
            resources,
            in_flight: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            start_time_ms: AtomicU64::new(0),
            end_time_ms: AtomicU64::new(0),
            requests_last_second: AtomicU64::new(0),
            current_tps: AtomicU64::new(0),
            average_tps_bits: AtomicU64::new(0),
        }
    }

    /// Begin collection: stamp the start time and launch the resource
    /// monitor if configured
    pub fn start(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let now = timing::epoch_ms();
        self.start_time_ms.store(now, Ordering::Release);
        if let Some(resources) = &self.resources {
            resources.start();
        }
        tracing::info!("Started metrics collection at {now}");
    }

    /// Finish collection: stop the resource monitor, take a final snapshot,
    /// and compute the run-wide average TPS
    pub fn stop(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let end = timing::epoch_ms();
        self.end_time_ms.store(end, Ordering::Release);

        if let Some(resources) = &self.resources {
            resources.stop();
        }
        self.latency.update_snapshots();

        let duration_ms = end.saturating_sub(self.start_time_ms.load(Ordering::Acquire));
        if duration_ms > 0 {
            let average = 1000.0 * self.counters.total_requests() as f64 / duration_ms as f64;
            self.average_tps_bits.store(average.to_bits(), Ordering::Release);
        }
        tracing::info!("Stopped metrics collection, test duration: {duration_ms} ms");
    }

    /// 1 Hz tick: publish the last second's request count and roll the
    /// histogram snapshots
    pub fn update_tps(&self) {
        let tps = self.requests_last_second.swap(0, Ordering::AcqRel);
        self.current_tps.store(tps, Ordering::Release);
        self.tps.record(timing::epoch_ms(), tps);
        self.latency.update_snapshots();
    }

    // Recording entry points, one per request lifecycle outcome.

    pub fn record_rate_limiter_wait(&self, wait_secs: f64) {
        self.latency.record_limiter_wait(wait_secs);
    }

    /// The request is about to hit the wire; counted in `totalRequests`
    pub fn record_request_start(&self, request_id: u64) {
        self.in_flight
            .lock()
            .unwrap()
            .insert(request_id, Instant::now());
        self.counters.increment_total();
    }

    /// A response arrived. `success` is the final verdict after status-range
    /// and validator checks; error bodies reach the analyzer only for codes
    /// >= 400.
    pub fn record_response(
        &self,
        request_id: u64,
        status: u16,
        body: &str,
        response_bytes: u64,
        response_time_ms: u64,
        success: bool,
    ) {
        self.in_flight.lock().unwrap().remove(&request_id);

        self.latency.record_response_time(response_time_ms);
        self.status_codes.record(status);
        self.counters.add_bytes_received(response_bytes);

        if success {
            self.counters.increment_success();
        } else {
            self.counters.increment_failure();
            self.errors.record_error_response(status, body);
        }
        self.requests_last_second.fetch_add(1, Ordering::AcqRel);
    }

    /// The call exceeded the hard timeout: counts as timeout and failure
    pub fn record_timeout(&self, request_id: u64, response_time_ms: u64) {
        self.in_flight.lock().unwrap().remove(&request_id);

        self.latency.record_response_time(response_time_ms);
        self.counters.increment_timeout();
        self.counters.increment_failure();
        self.requests_last_second.fetch_add(1, Ordering::AcqRel);
    }

    /// The call failed without a response: counts as failure only
    pub fn record_error(&self, request_id: u64, kind: &str, message: &str, detail: &str) {
        let started = self.in_flight.lock().unwrap().remove(&request_id);
        if let Some(started) = started {
            self.latency
                .record_response_time(started.elapsed().as_millis() as u64);
        }
        self.counters.increment_failure();
        self.errors.record_error(kind, message, detail);
        self.requests_last_second.fetch_add(1, Ordering::AcqRel);
    }

    /// The unit of work never reached an HTTP attempt
    pub fn record_skipped(&self, _request_id: u64) {
        self.counters.increment_skipped();
    }

    // Read views.

    pub fn start_time_ms(&self) -> u64 {
        self.start_time_ms.load(Ordering::Acquire)
    }

    pub fn end_time_ms(&self) -> u64 {
        self.end_time_ms.load(Ordering::Acquire)
    }

    pub fn current_tps(&self) -> u64 {
        self.current_tps.load(Ordering::Acquire)
    }

    pub fn average_tps(&self) -> f64 {
        f64::from_bits(self.average_tps_bits.load(Ordering::Acquire))
    }

    pub fn counters(&self) -> &RequestCounters {
        &self.counters
    }

    pub fn status_codes(&self) -> &StatusCodeMetrics {
        &self.status_codes
    }

    pub fn latency(&self) -> &LatencyMetrics {
        &self.latency
    }

    pub fn tps(&self) -> &TpsMetrics {
        &self.tps
    }

    pub fn errors(&self) -> &ErrorAnalyzer {
        &self.errors
    }

    pub fn resources(&self) -> Option<&ResourceMonitor> {
        self.resources.as_ref()
    }

    /// Return every sub-component to its empty state
    pub fn reset(&self) {
        self.counters.reset();
        self.status_codes.reset();
        self.latency.reset();
        self.tps.reset();
        self.errors.reset();
        self.in_flight.lock().unwrap().clear();
        self.requests_last_second.store(0, Ordering::Release);
        self.current_tps.store(0, Ordering::Release);
        self.average_tps_bits.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> MetricsCollector {
        let spec = TestSpec::from_json(
            r#"{
                "name": "metrics-test",
                "testDuration": "5s",
                "trafficPattern": { "type": "stable", "targetTps": 10 },
                "requestTemplates": [
                    { "name": "t", "method": "GET", "urlTemplate": "http://host/" }
                ],
                "metrics": { "resourceMonitoring": { "enabled": false } }
            }"#,
        )
        .unwrap();
        MetricsCollector::new(&spec)
    }

    #[test]
    fn test_response_bookkeeping() {
        let metrics = collector();
        metrics.record_request_start(1);
        metrics.record_response(1, 200, "ok", 128, 15, true);

        assert_eq!(metrics.counters().total_requests(), 1);
        assert_eq!(metrics.counters().success_count(), 1);
        assert_eq!(metrics.counters().failure_count(), 0);
        assert_eq!(metrics.counters().bytes_received(), 128);
        assert_eq!(metrics.status_codes().count(200), 1);
    }

    #[test]
    fn test_failed_response_samples_body() {
        let metrics = collector();
        metrics.record_request_start(1);
        metrics.record_response(1, 500, "kaboom", 64, 20, false);

        assert_eq!(metrics.counters().failure_count(), 1);
        assert_eq!(metrics.errors().total_error_responses(), 1);
    }

    #[test]
    fn test_validation_failure_on_2xx_counts_failure_without_sample() {
        let metrics = collector();
        metrics.record_request_start(1);
        metrics.record_response(1, 200, "unexpected", 32, 5, false);

        assert_eq!(metrics.counters().failure_count(), 1);
        // The analyzer only samples codes >= 400
        assert_eq!(metrics.errors().total_error_responses(), 0);
    }

    #[test]
    fn test_timeout_counts_both() {
        let metrics = collector();
        metrics.record_request_start(7);
        metrics.record_timeout(7, 30_000);

        assert_eq!(metrics.counters().total_requests(), 1);
        assert_eq!(metrics.counters().timeout_count(), 1);
        assert_eq!(metrics.counters().failure_count(), 1);
        assert!(metrics.counters().timeout_count() <= metrics.counters().failure_count());
    }

    #[test]
    fn test_transport_error_counts_failure_only() {
        let metrics = collector();
        metrics.record_request_start(3);
        metrics.record_error(3, "connect", "refused", "tcp connect error: refused");

        assert_eq!(metrics.counters().failure_count(), 1);
        assert_eq!(metrics.counters().timeout_count(), 0);
        assert_eq!(metrics.errors().total_errors(), 1);
    }

    #[test]
    fn test_skip_does_not_touch_totals() {
        let metrics = collector();
        metrics.record_skipped(9);
        assert_eq!(metrics.counters().skipped_count(), 1);
        assert_eq!(metrics.counters().total_requests(), 0);
        metrics.update_tps();
        assert_eq!(metrics.current_tps(), 0, "skips do not count toward TPS");
    }

    #[test]
    fn test_tps_sampling_sum_then_reset() {
        let metrics = collector();
        for id in 0..5 {
            metrics.record_request_start(id);
            metrics.record_response(id, 200, "", 0, 1, true);
        }
        metrics.update_tps();
        assert_eq!(metrics.current_tps(), 5);
        metrics.update_tps();
        assert_eq!(metrics.current_tps(), 0, "counter must reset after each sample");
        assert_eq!(metrics.tps().sample_count(), 2);
    }

    #[test]
    fn test_accounting_identity() {
        let metrics = collector();
        // 3 successes, 1 timeout, 1 transport error, 2 skips
        for id in 0..3 {
            metrics.record_request_start(id);
            metrics.record_response(id, 200, "", 0, 1, true);
        }
        metrics.record_request_start(10);
        metrics.record_timeout(10, 500);
        metrics.record_request_start(11);
        metrics.record_error(11, "connect", "m", "d");
        metrics.record_skipped(20);
        metrics.record_skipped(21);

        let counters = metrics.counters();
        assert_eq!(
            counters.success_count() + counters.failure_count(),
            counters.total_requests()
        );
        assert!(counters.timeout_count() <= counters.failure_count());
        assert_eq!(counters.skipped_count(), 2);
    }

    #[test]
    fn test_start_stop_sets_average_tps() {
        let metrics = collector();
        metrics.start();
        for id in 0..10 {
            metrics.record_request_start(id);
            metrics.record_response(id, 200, "", 0, 1, true);
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
        metrics.stop();

        assert!(metrics.end_time_ms() >= metrics.start_time_ms());
        assert!(metrics.average_tps() > 0.0);
    }

    #[test]
    fn test_reset_returns_to_empty() {
        let metrics = collector();
        metrics.record_request_start(1);
        metrics.record_response(1, 500, "x", 10, 10, false);
        metrics.update_tps();
        metrics.reset();

        assert_eq!(metrics.counters().total_requests(), 0);
        assert_eq!(metrics.status_codes().total_count(), 0);
        assert_eq!(metrics.tps().sample_count(), 0);
        assert_eq!(metrics.errors().total_error_responses(), 0);
        assert_eq!(metrics.current_tps(), 0);
    }
}
