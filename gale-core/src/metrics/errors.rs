//! Error taxonomy with bounded samples
//!
//! Keeps a capped set of response-body samples per error status code and a
//! per-kind count plus capped samples for transport-level errors. When a
//! sample set is full, new samples are dropped and the retained ones kept;
//! counts keep growing regardless.

use std::collections::HashMap;
use std::sync::Mutex;

/// Cap on stored samples per status code and per error kind
pub const MAX_ERROR_SAMPLES: usize = 100;

/// Cap on stored body length; longer bodies are truncated at a char boundary
pub const MAX_BODY_SAMPLE_BYTES: usize = 1024;

/// One captured transport-level error
#[derive(Debug, Clone)]
pub struct ErrorSample {
    pub timestamp_ms: u64,
    pub message: String,
    /// Full cause chain, most specific last
    pub detail: String,
}

struct StatusEntry {
    count: u64,
    bodies: Vec<String>,
    /// Insertion sequence, used to break count ties in reports
    seq: u64,
}

struct KindEntry {
    count: u64,
    samples: Vec<ErrorSample>,
    seq: u64,
}

#[derive(Default)]
struct AnalyzerInner {
    by_status: HashMap<u16, StatusEntry>,
    by_kind: HashMap<String, KindEntry>,
    next_seq: u64,
}

/// Aggregated error observations for one test run
#[derive(Default)]
pub struct ErrorAnalyzer {
    inner: Mutex<AnalyzerInner>,
}

/// Immutable top-N view produced at report time
#[derive(Debug, Clone, Default)]
pub struct ErrorReport {
    pub total_error_responses: u64,
    pub total_errors: u64,
    /// (status code, count), count-descending, insertion order on ties
    pub top_status_codes: Vec<(u16, u64)>,
    /// (error kind, count), count-descending, insertion order on ties
    pub top_error_kinds: Vec<(String, u64)>,
    /// Up to 3 most recent samples per kind, newest first
    pub recent_samples: Vec<(String, Vec<ErrorSample>)>,
    /// Up to 3 retained bodies per status code
    pub recent_bodies: Vec<(u16, Vec<String>)>,
}

impl ErrorAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error response body. Codes below 400 are ignored.
    pub fn record_error_response(&self, status: u16, body: &str) {
        if status < 400 {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.next_seq;
        let entry = inner.by_status.entry(status).or_insert_with(|| StatusEntry {
            count: 0,
            bodies: Vec::new(),
            seq,
        });
        entry.count += 1;
        if entry.bodies.len() < MAX_ERROR_SAMPLES {
            entry.bodies.push(truncate_body(body));
        }
        inner.next_seq += 1;
    }

    /// Record a transport-level error under its kind
    pub fn record_error(&self, kind: &str, message: &str, detail: &str) {
        let timestamp_ms = crate::timing::epoch_ms();
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.next_seq;
        let entry = inner
            .by_kind
            .entry(kind.to_string())
            .or_insert_with(|| KindEntry {
                count: 0,
                samples: Vec::new(),
                seq,
            });
        entry.count += 1;
        if entry.samples.len() < MAX_ERROR_SAMPLES {
            entry.samples.push(ErrorSample {
                timestamp_ms,
                message: message.to_string(),
                detail: detail.to_string(),
            });
        }
        inner.next_seq += 1;
    }

    pub fn total_error_responses(&self) -> u64 {
        self.inner
            .lock()
            .unwrap()
            .by_status
            .values()
            .map(|e| e.count)
            .sum()
    }

    pub fn total_errors(&self) -> u64 {
        self.inner
            .lock()
            .unwrap()
            .by_kind
            .values()
            .map(|e| e.count)
            .sum()
    }

    pub fn error_kind_counts(&self) -> HashMap<String, u64> {
        self.inner
            .lock()
            .unwrap()
            .by_kind
            .iter()
            .map(|(kind, entry)| (kind.clone(), entry.count))
            .collect()
    }

    /// Build the top-N report: counts descending, first-seen order on ties,
    /// last 3 samples of each entry (newest first)
    pub fn report(&self, limit: usize) -> ErrorReport {
        let inner = self.inner.lock().unwrap();

        let mut statuses: Vec<(&u16, &StatusEntry)> = inner.by_status.iter().collect();
        statuses.sort_by(|a, b| b.1.count.cmp(&a.1.count).then(a.1.seq.cmp(&b.1.seq)));
        statuses.truncate(limit);

        let mut kinds: Vec<(&String, &KindEntry)> = inner.by_kind.iter().collect();
        kinds.sort_by(|a, b| b.1.count.cmp(&a.1.count).then(a.1.seq.cmp(&b.1.seq)));
        kinds.truncate(limit);

        let recent_samples = kinds
            .iter()
            .map(|(kind, entry)| {
                let mut samples = entry.samples.clone();
                samples.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
                samples.truncate(3);
                ((*kind).clone(), samples)
            })
            .collect();

        let recent_bodies = statuses
            .iter()
            .map(|(status, entry)| {
                let bodies: Vec<String> =
                    entry.bodies.iter().rev().take(3).cloned().collect();
                (**status, bodies)
            })
            .collect();

        ErrorReport {
            total_error_responses: inner.by_status.values().map(|e| e.count).sum(),
            total_errors: inner.by_kind.values().map(|e| e.count).sum(),
            top_status_codes: statuses
                .iter()
                .map(|(status, entry)| (**status, entry.count))
                .collect(),
            top_error_kinds: kinds
                .iter()
                .map(|(kind, entry)| ((*kind).clone(), entry.count))
                .collect(),
            recent_samples,
            recent_bodies,
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.by_status.clear();
        inner.by_kind.clear();
        inner.next_seq = 0;
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_BODY_SAMPLE_BYTES {
        return body.to_string();
    }
    let mut end = MAX_BODY_SAMPLE_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_400_responses_ignored() {
        let analyzer = ErrorAnalyzer::new();
        analyzer.record_error_response(200, "fine");
        analyzer.record_error_response(302, "moved");
        assert_eq!(analyzer.total_error_responses(), 0);
    }

    #[test]
    fn test_error_responses_counted_and_sampled() {
        let analyzer = ErrorAnalyzer::new();
        analyzer.record_error_response(500, "boom-1");
        analyzer.record_error_response(500, "boom-2");
        analyzer.record_error_response(404, "missing");

        assert_eq!(analyzer.total_error_responses(), 3);
        let report = analyzer.report(10);
        assert_eq!(report.top_status_codes, vec![(500, 2), (404, 1)]);
    }

    #[test]
    fn test_sample_cap_keeps_oldest() {
        let analyzer = ErrorAnalyzer::new();
        for i in 0..(MAX_ERROR_SAMPLES + 50) {
            analyzer.record_error_response(503, &format!("body-{i}"));
        }
        let report = analyzer.report(1);
        assert_eq!(report.total_error_responses, (MAX_ERROR_SAMPLES + 50) as u64);
        // The retained set is the first MAX_ERROR_SAMPLES bodies; the report
        // surfaces the most recent of those.
        assert_eq!(
            report.recent_bodies[0].1[0],
            format!("body-{}", MAX_ERROR_SAMPLES - 1)
        );
    }

    #[test]
    fn test_body_truncation() {
        let analyzer = ErrorAnalyzer::new();
        let long_body = "x".repeat(MAX_BODY_SAMPLE_BYTES * 2);
        analyzer.record_error_response(500, &long_body);
        let report = analyzer.report(1);
        assert_eq!(report.recent_bodies[0].1[0].len(), MAX_BODY_SAMPLE_BYTES);
    }

    #[test]
    fn test_error_kinds_counted() {
        let analyzer = ErrorAnalyzer::new();
        analyzer.record_error("connect", "connection refused", "tcp connect error");
        analyzer.record_error("connect", "connection refused", "tcp connect error");
        analyzer.record_error("decode", "invalid body", "utf-8 error");

        assert_eq!(analyzer.total_errors(), 3);
        let counts = analyzer.error_kind_counts();
        assert_eq!(counts["connect"], 2);
        assert_eq!(counts["decode"], 1);
    }

    #[test]
    fn test_top_n_sorted_with_insertion_tiebreak() {
        let analyzer = ErrorAnalyzer::new();
        analyzer.record_error("first", "m", "d");
        analyzer.record_error("second", "m", "d");
        analyzer.record_error("third", "m", "d");
        analyzer.record_error("third", "m", "d");

        let report = analyzer.report(2);
        assert_eq!(report.top_error_kinds.len(), 2);
        assert_eq!(report.top_error_kinds[0], ("third".to_string(), 2));
        // "first" and "second" tie on count; insertion order breaks the tie
        assert_eq!(report.top_error_kinds[1], ("first".to_string(), 1));
    }

    #[test]
    fn test_recent_samples_newest_first_capped_at_three() {
        let analyzer = ErrorAnalyzer::new();
        for i in 0..5 {
            analyzer.record_error("timeout", &format!("message-{i}"), "detail");
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        let report = analyzer.report(5);
        let (kind, samples) = &report.recent_samples[0];
        assert_eq!(kind, "timeout");
        assert_eq!(samples.len(), 3);
        assert!(samples[0].timestamp_ms >= samples[1].timestamp_ms);
        assert!(samples[1].timestamp_ms >= samples[2].timestamp_ms);
        assert_eq!(samples[0].message, "message-4");
    }

    #[test]
    fn test_reset() {
        let analyzer = ErrorAnalyzer::new();
        analyzer.record_error_response(500, "x");
        analyzer.record_error("connect", "m", "d");
        analyzer.reset();
        assert_eq!(analyzer.total_error_responses(), 0);
        assert_eq!(analyzer.total_errors(), 0);
        assert!(analyzer.report(10).top_status_codes.is_empty());
    }
}
