//! End-of-test result assembly
//!
//! `TestReport` is the immutable snapshot handed to exporters and the
//! console summary once the controller reaches its terminal state. Building
//! it reads only snapshot views of the metrics, so the same collector
//! produces the same report on repeated builds.

use crate::breaker::CircuitBreaker;
use crate::config::TestSpec;
use crate::metrics::{ErrorReport, MetricsCollector, ResourceSnapshot, TpsSample};
use std::collections::BTreeMap;

/// Response-time distribution summary in milliseconds
#[derive(Debug, Clone, Default)]
pub struct LatencySummary {
    pub min_ms: u64,
    pub median_ms: u64,
    pub p90_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub max_ms: u64,
    pub mean_ms: f64,
    pub std_dev_ms: f64,
}

/// Rate-limiter wait distribution summary in milliseconds
#[derive(Debug, Clone, Default)]
pub struct WaitSummary {
    pub min_ms: u64,
    pub median_ms: u64,
    pub p90_ms: u64,
    pub p99_ms: u64,
    pub max_ms: u64,
}

/// Immutable end-of-test snapshot
#[derive(Debug, Clone)]
pub struct TestReport {
    pub test_name: String,
    pub start_time_ms: u64,
    pub end_time_ms: u64,
    pub duration_ms: u64,

    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub timeout_count: u64,
    pub skipped_count: u64,
    pub success_rate: f64,
    pub bytes_received: u64,

    pub average_tps: f64,
    pub max_tps: u64,
    pub min_tps: u64,

    pub response_times: LatencySummary,
    pub limiter_waits: WaitSummary,
    /// The spec's requested percentiles, as (percentile, value ms) pairs
    pub requested_percentiles: Vec<(u8, u64)>,

    pub status_codes: BTreeMap<u16, u64>,
    pub tps_samples: Vec<TpsSample>,
    pub errors: ErrorReport,

    pub breaker_opened_at_ms: Option<u64>,

    pub max_cpu_pct: f64,
    pub max_rss_bytes: u64,
    pub resource_snapshots: Vec<ResourceSnapshot>,
}

impl TestReport {
    /// Assemble the snapshot from the collector's read views
    pub fn build(
        spec: &TestSpec,
        metrics: &MetricsCollector,
        breaker: Option<&CircuitBreaker>,
    ) -> Self {
        let counters = metrics.counters();
        let latency = metrics.latency();
        let tps = metrics.tps();

        let start_time_ms = metrics.start_time_ms();
        let end_time_ms = metrics.end_time_ms();

        let response_times = LatencySummary {
            min_ms: latency.response_percentile(0.0),
            median_ms: latency.response_percentile(50.0),
            p90_ms: latency.response_percentile(90.0),
            p95_ms: latency.response_percentile(95.0),
            p99_ms: latency.response_percentile(99.0),
            max_ms: latency.response_percentile(100.0),
            mean_ms: latency.mean_response_time(),
            std_dev_ms: latency.response_time_stdev(),
        };

        let limiter_waits = WaitSummary {
            min_ms: latency.wait_percentile(0.0),
            median_ms: latency.wait_percentile(50.0),
            p90_ms: latency.wait_percentile(90.0),
            p99_ms: latency.wait_percentile(99.0),
            max_ms: latency.wait_percentile(100.0),
        };

        let requested_percentiles = spec
            .metrics
            .response_time_percentiles
            .iter()
            .map(|&p| (p, latency.response_percentile(f64::from(p))))
            .collect();

        let (max_cpu_pct, max_rss_bytes, resource_snapshots) = match metrics.resources() {
            Some(resources) => (
                resources.max_cpu_pct(),
                resources.max_rss_bytes(),
                resources.snapshots(),
            ),
            None => (0.0, 0, Vec::new()),
        };

        Self {
            test_name: spec.name.clone(),
            start_time_ms,
            end_time_ms,
            duration_ms: end_time_ms.saturating_sub(start_time_ms),
            total_requests: counters.total_requests(),
            success_count: counters.success_count(),
            failure_count: counters.failure_count(),
            timeout_count: counters.timeout_count(),
            skipped_count: counters.skipped_count(),
            success_rate: counters.success_rate(),
            bytes_received: counters.bytes_received(),
            average_tps: metrics.average_tps(),
            max_tps: tps.max_tps(),
            min_tps: tps.min_tps(),
            response_times,
            limiter_waits,
            requested_percentiles,
            status_codes: metrics.status_codes().all_counts(),
            tps_samples: tps.samples(),
            errors: metrics.errors().report(10),
            breaker_opened_at_ms: breaker.and_then(|b| b.opened_at_ms()),
            max_cpu_pct,
            max_rss_bytes,
            resource_snapshots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TestSpec;

    fn spec() -> TestSpec {
        TestSpec::from_json(
            r#"{
                "name": "report-test",
                "testDuration": "5s",
                "trafficPattern": { "type": "stable", "targetTps": 10 },
                "requestTemplates": [
                    { "name": "t", "method": "GET", "urlTemplate": "http://host/" }
                ],
                "metrics": {
                    "responseTimePercentiles": [50, 95],
                    "resourceMonitoring": { "enabled": false }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_report_reflects_collector() {
        let spec = spec();
        let metrics = MetricsCollector::new(&spec);
        metrics.start();
        for id in 0..4 {
            metrics.record_request_start(id);
            metrics.record_response(id, 200, "ok", 10, 20, true);
        }
        metrics.record_request_start(99);
        metrics.record_response(99, 500, "err", 10, 40, false);
        metrics.update_tps();
        std::thread::sleep(std::time::Duration::from_millis(20));
        metrics.stop();

        let report = TestReport::build(&spec, &metrics, None);
        assert_eq!(report.test_name, "report-test");
        assert_eq!(report.total_requests, 5);
        assert_eq!(report.success_count, 4);
        assert_eq!(report.failure_count, 1);
        assert!((report.success_rate - 0.8).abs() < 1e-9);
        assert_eq!(report.status_codes[&200], 4);
        assert_eq!(report.status_codes[&500], 1);
        assert_eq!(report.tps_samples.len(), 1);
        assert_eq!(report.max_tps, 5);
        assert!(report.average_tps > 0.0);
        assert!(report.duration_ms >= 20);
        assert!(report.response_times.max_ms >= 40);
        assert_eq!(report.requested_percentiles.len(), 2);
        assert_eq!(report.requested_percentiles[0].0, 50);
        assert!(report.breaker_opened_at_ms.is_none());
    }

    #[test]
    fn test_report_includes_breaker_trip() {
        let spec = spec();
        let metrics = MetricsCollector::new(&spec);
        let breaker = CircuitBreaker::new(0.1, 2).unwrap();
        breaker.record_result(false);
        breaker.record_result(false);

        let report = TestReport::build(&spec, &metrics, Some(&breaker));
        assert!(report.breaker_opened_at_ms.is_some());
    }

    #[test]
    fn test_rebuild_is_stable() {
        let spec = spec();
        let metrics = MetricsCollector::new(&spec);
        metrics.start();
        metrics.record_request_start(1);
        metrics.record_response(1, 200, "", 0, 5, true);
        metrics.stop();

        let first = TestReport::build(&spec, &metrics, None);
        let second = TestReport::build(&spec, &metrics, None);
        assert_eq!(first.total_requests, second.total_requests);
        assert_eq!(first.response_times.max_ms, second.response_times.max_ms);
        assert_eq!(first.status_codes, second.status_codes);
    }
}
