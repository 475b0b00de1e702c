//! Sliding-window circuit breaker
//!
//! Tracks the last `window_size` request outcomes in a fixed-capacity ring.
//! Once the ring is full and the failure fraction exceeds the threshold the
//! breaker opens and stays open until `reset()`; there is no automatic
//! close. `allow_request` is a single atomic load so the hot path never
//! touches the ring lock.

use crate::error::{Error, Result};
use crate::timing;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

pub struct CircuitBreaker {
    error_threshold: f64,
    window_size: usize,
    results: RwLock<VecDeque<bool>>,
    open: AtomicBool,
    /// Epoch ms of the open transition; 0 while the breaker has never opened
    opened_at_ms: AtomicU64,
}

impl CircuitBreaker {
    /// Create a breaker tripping when the failure fraction over the last
    /// `window_size` results exceeds `error_threshold`.
    pub fn new(error_threshold: f64, window_size: usize) -> Result<Self> {
        if !(0.0..=1.0).contains(&error_threshold) {
            return Err(Error::Config(
                "circuitBreaker.errorThreshold must be between 0.0 and 1.0".into(),
            ));
        }
        if window_size == 0 {
            return Err(Error::Config("circuitBreaker.windowSize must be at least 1".into()));
        }
        tracing::info!(
            "Initialized circuit breaker with error threshold {error_threshold}, window size {window_size}"
        );
        Ok(Self {
            error_threshold,
            window_size,
            results: RwLock::new(VecDeque::with_capacity(window_size)),
            open: AtomicBool::new(false),
            opened_at_ms: AtomicU64::new(0),
        })
    }

    /// Whether new requests may be submitted
    pub fn allow_request(&self) -> bool {
        !self.open.load(Ordering::Acquire)
    }

    /// Record one request outcome (`true` = success), evicting the oldest
    /// entry once the ring is full, and trip the breaker if warranted.
    pub fn record_result(&self, success: bool) {
        let mut ring = self.results.write().unwrap();
        if ring.len() == self.window_size {
            ring.pop_front();
        }
        ring.push_back(success);

        if ring.len() < self.window_size {
            return;
        }
        let failures = ring.iter().filter(|ok| !**ok).count();
        let error_rate = failures as f64 / ring.len() as f64;
        if error_rate > self.error_threshold {
            self.trip(error_rate);
        }
    }

    /// Flip closed -> open at most once per continuous open period
    fn trip(&self, error_rate: f64) {
        if self
            .open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.opened_at_ms.store(timing::epoch_ms(), Ordering::Release);
            tracing::warn!(
                "Circuit breaker opened at error rate {error_rate:.2} (threshold {:.2})",
                self.error_threshold
            );
        }
    }

    /// Clear the window and close the breaker
    pub fn reset(&self) {
        let mut ring = self.results.write().unwrap();
        ring.clear();
        if self
            .open
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::info!("Circuit breaker manually reset to closed state");
        }
    }

    /// Failure fraction over the current ring contents; 0 when empty
    pub fn current_error_rate(&self) -> f64 {
        let ring = self.results.read().unwrap();
        if ring.is_empty() {
            return 0.0;
        }
        let failures = ring.iter().filter(|ok| !**ok).count();
        failures as f64 / ring.len() as f64
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Epoch ms of the most recent open transition, if any
    pub fn opened_at_ms(&self) -> Option<u64> {
        match self.opened_at_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_validation() {
        assert!(CircuitBreaker::new(-0.1, 10).is_err());
        assert!(CircuitBreaker::new(1.1, 10).is_err());
        assert!(CircuitBreaker::new(0.5, 0).is_err());
        assert!(CircuitBreaker::new(0.0, 1).is_ok());
        assert!(CircuitBreaker::new(1.0, 100).is_ok());
    }

    #[test]
    fn test_stays_closed_below_threshold() {
        let breaker = CircuitBreaker::new(0.5, 10).unwrap();
        for i in 0..30 {
            breaker.record_result(i % 3 != 0); // ~33% failures
            assert!(breaker.allow_request());
        }
        assert!(!breaker.is_open());
        assert!(breaker.opened_at_ms().is_none());
    }

    #[test]
    fn test_opens_when_threshold_exceeded() {
        let breaker = CircuitBreaker::new(0.5, 10).unwrap();
        for _ in 0..4 {
            breaker.record_result(true);
        }
        for _ in 0..6 {
            breaker.record_result(false);
        }
        // Window full with 60% failures > 50% threshold
        assert!(breaker.is_open());
        assert!(!breaker.allow_request());
        assert!(breaker.opened_at_ms().is_some());
    }

    #[test]
    fn test_no_trip_before_window_full() {
        let breaker = CircuitBreaker::new(0.1, 10).unwrap();
        for _ in 0..9 {
            breaker.record_result(false);
        }
        assert!(
            !breaker.is_open(),
            "breaker must not evaluate a partially filled window"
        );
        breaker.record_result(false);
        assert!(breaker.is_open());
    }

    #[test]
    fn test_open_timestamp_set_once_per_period() {
        let breaker = CircuitBreaker::new(0.2, 4).unwrap();
        for _ in 0..4 {
            breaker.record_result(false);
        }
        let first = breaker.opened_at_ms().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        for _ in 0..4 {
            breaker.record_result(false);
        }
        assert_eq!(
            breaker.opened_at_ms().unwrap(),
            first,
            "open timestamp must not move while the breaker stays open"
        );
    }

    #[test]
    fn test_only_reset_closes() {
        let breaker = CircuitBreaker::new(0.1, 5).unwrap();
        for _ in 0..5 {
            breaker.record_result(false);
        }
        assert!(breaker.is_open());
        // Successes do not close an open breaker
        for _ in 0..20 {
            breaker.record_result(true);
        }
        assert!(breaker.is_open());

        breaker.reset();
        assert!(!breaker.is_open());
        assert!(breaker.allow_request());
        assert_eq!(breaker.current_error_rate(), 0.0);
    }

    #[test]
    fn test_current_error_rate() {
        let breaker = CircuitBreaker::new(0.9, 10).unwrap();
        assert_eq!(breaker.current_error_rate(), 0.0);
        breaker.record_result(false);
        breaker.record_result(true);
        assert!((breaker.current_error_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_window_eviction() {
        let breaker = CircuitBreaker::new(0.9, 4).unwrap();
        for _ in 0..4 {
            breaker.record_result(false);
        }
        // 100% failures but threshold 0.9 < 1.0, so open
        assert!(breaker.is_open());
        breaker.reset();
        // Old failures pushed out by fresh successes
        for _ in 0..4 {
            breaker.record_result(false);
        }
        breaker.reset();
        for _ in 0..4 {
            breaker.record_result(true);
        }
        assert_eq!(breaker.current_error_rate(), 0.0);
    }
}
