//! Pacing rate regulator
//!
//! A token bucket with one second of burst capacity: permits accrue at the
//! configured rate, unclaimed permits are capped at one second's worth, and
//! each `acquire` either consumes a stored permit or reserves the next free
//! slot and sleeps until it arrives. `set_rate` takes effect for all future
//! acquisitions; in-flight waiters keep the reservation they already made.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Smallest accepted rate; requested rates below this are clamped up
const MIN_RATE: f64 = 1e-6;

/// Burst window in seconds (permits stored while idle)
const MAX_BURST_SECONDS: f64 = 1.0;

struct RegulatorState {
    permits_per_second: f64,
    stored_permits: f64,
    max_stored_permits: f64,
    next_free: Instant,
}

impl RegulatorState {
    /// Credit permits accrued since the last reservation
    fn resync(&mut self, now: Instant) {
        if now > self.next_free {
            let idle = now.duration_since(self.next_free).as_secs_f64();
            self.stored_permits =
                (self.stored_permits + idle * self.permits_per_second).min(self.max_stored_permits);
            self.next_free = now;
        }
    }
}

/// Thread-safe pacing limiter with a live-updatable rate
pub struct RateRegulator {
    state: Mutex<RegulatorState>,
}

impl RateRegulator {
    /// Create a regulator emitting `tps` permits per second. Rates at or
    /// below zero are clamped to a tiny positive floor rather than rejected;
    /// the traffic profile invariant keeps real configs well above it.
    pub fn new(tps: f64) -> Self {
        let rate = sanitize(tps);
        Self {
            state: Mutex::new(RegulatorState {
                permits_per_second: rate,
                stored_permits: 0.0,
                max_stored_permits: rate * MAX_BURST_SECONDS,
                next_free: Instant::now(),
            }),
        }
    }

    /// Block until a permit is available and return the time waited in
    /// seconds. Arrival order is not FIFO; each caller reserves the earliest
    /// slot open at the time it reaches the state lock.
    pub fn acquire(&self) -> f64 {
        let wait = {
            let mut state = self.state.lock().unwrap();
            let now = Instant::now();
            state.resync(now);

            let from_storage = state.stored_permits.min(1.0);
            let fresh = 1.0 - from_storage;
            state.stored_permits -= from_storage;

            let wait = state.next_free.saturating_duration_since(now);
            if fresh > 0.0 {
                let permits_per_second = state.permits_per_second;
                state.next_free += Duration::from_secs_f64(fresh / permits_per_second);
            }
            wait
        };

        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
        wait.as_secs_f64()
    }

    /// Update the rate; effective for all future `acquire` calls. Stored
    /// permits are rescaled so a burst allowance never exceeds one second of
    /// the new rate.
    pub fn set_rate(&self, tps: f64) {
        let rate = sanitize(tps);
        let mut state = self.state.lock().unwrap();
        state.resync(Instant::now());

        let old_max = state.max_stored_permits;
        state.permits_per_second = rate;
        state.max_stored_permits = rate * MAX_BURST_SECONDS;
        state.stored_permits = if old_max > 0.0 {
            (state.stored_permits * state.max_stored_permits / old_max)
                .min(state.max_stored_permits)
        } else {
            0.0
        };
    }

    /// Current configured rate in permits per second
    pub fn rate(&self) -> f64 {
        self.state.lock().unwrap().permits_per_second
    }
}

fn sanitize(tps: f64) -> f64 {
    if tps.is_finite() {
        tps.max(MIN_RATE)
    } else {
        MIN_RATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_first_acquire_is_immediate() {
        let regulator = RateRegulator::new(10.0);
        let wait = regulator.acquire();
        assert!(wait < 0.05, "first permit should be free, waited {wait}s");
    }

    #[test]
    fn test_acquire_paces_to_rate() {
        let regulator = RateRegulator::new(100.0);
        let start = Instant::now();
        for _ in 0..20 {
            regulator.acquire();
        }
        let elapsed = start.elapsed();
        // 20 permits at 100/s: first is free, remaining 19 take ~190ms
        assert!(
            elapsed >= Duration::from_millis(150),
            "20 permits at 100/s should take ~190ms, took {elapsed:?}"
        );
        assert!(
            elapsed < Duration::from_millis(500),
            "pacing overshot: {elapsed:?}"
        );
    }

    #[test]
    fn test_acquire_reports_wait_duration() {
        let regulator = RateRegulator::new(50.0);
        regulator.acquire();
        let wait = regulator.acquire();
        assert!(wait > 0.0, "second immediate acquire should have waited");
        assert!(wait < 0.1, "wait should be about one 20ms interval, got {wait}s");
    }

    #[test]
    fn test_idle_time_stores_burst() {
        let regulator = RateRegulator::new(100.0);
        regulator.acquire();
        thread::sleep(Duration::from_millis(120));
        // ~12 permits accrued while idle; the next few should be free
        let start = Instant::now();
        for _ in 0..5 {
            regulator.acquire();
        }
        assert!(
            start.elapsed() < Duration::from_millis(30),
            "stored permits should make bursts free"
        );
    }

    #[test]
    fn test_set_rate_applies_to_future_acquires() {
        let regulator = RateRegulator::new(2.0);
        regulator.acquire();
        regulator.set_rate(1000.0);
        let start = Instant::now();
        for _ in 0..10 {
            regulator.acquire();
        }
        assert!(
            start.elapsed() < Duration::from_millis(200),
            "new rate should govern immediately"
        );
        assert_eq!(regulator.rate(), 1000.0);
    }

    #[test]
    fn test_rate_clamped_to_floor() {
        let regulator = RateRegulator::new(0.0);
        assert!(regulator.rate() > 0.0);
        regulator.set_rate(-5.0);
        assert!(regulator.rate() > 0.0);
        regulator.set_rate(f64::NAN);
        assert!(regulator.rate() > 0.0);
    }

    #[test]
    fn test_concurrent_acquire_with_rate_updates() {
        let regulator = Arc::new(RateRegulator::new(500.0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let regulator = regulator.clone();
            handles.push(thread::spawn(move || {
                let mut total = 0.0;
                for _ in 0..25 {
                    total += regulator.acquire();
                }
                total
            }));
        }
        let updater = {
            let regulator = regulator.clone();
            thread::spawn(move || {
                for rate in [200.0, 800.0, 400.0] {
                    thread::sleep(Duration::from_millis(20));
                    regulator.set_rate(rate);
                }
            })
        };
        for handle in handles {
            let waited = handle.join().unwrap();
            assert!(waited >= 0.0);
        }
        updater.join().unwrap();
    }

    #[test]
    fn test_sub_hertz_rate_waits_without_starving() {
        let regulator = RateRegulator::new(20.0);
        regulator.acquire();
        regulator.set_rate(0.5);
        // The reservation for the next permit is 2s out; raising the rate
        // again must not leave a waiter stranded beyond its reservation.
        regulator.set_rate(100.0);
        let wait = regulator.acquire();
        assert!(wait < 1.0, "waiter should not starve, waited {wait}s");
    }
}
