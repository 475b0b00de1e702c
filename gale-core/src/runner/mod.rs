//! Test execution
//!
//! The controller wires the traffic profile, rate regulator, worker pool,
//! request generator, circuit breaker, and metrics collector together, runs
//! the submission loop for the configured duration, and produces the final
//! report. One controller instance runs exactly one test.

pub mod executor;
pub mod pool;

pub use executor::RequestExecutor;
pub use pool::WorkerPool;

use crate::breaker::CircuitBreaker;
use crate::config::TestSpec;
use crate::error::{Error, Result};
use crate::limiter::RateRegulator;
use crate::metrics::MetricsCollector;
use crate::report::TestReport;
use crate::request::{RequestGenerator, ResponseValidator};
use crate::timing;
use crate::traffic::TrafficProfile;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Connect timeout for the shared HTTP client
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Grace period for draining the worker pool at end of test
const POOL_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Cadence of the rate-update scheduler
const RATE_UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Cadence of progress log lines
const PROGRESS_LOG_INTERVAL_MS: u64 = 10_000;

/// Pause between submissions; real pacing comes from the rate regulator
const SUBMISSION_PAUSE: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RunState::Created,
            1 => RunState::Running,
            2 => RunState::Stopping,
            _ => RunState::Stopped,
        }
    }
}

/// Flag + condvar pair used to interrupt scheduler sleeps promptly
pub(crate) struct StopSignal {
    flag: AtomicBool,
    guard: Mutex<()>,
    condvar: Condvar,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
            guard: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    fn signal(&self) {
        self.flag.store(true, Ordering::Release);
        let _guard = self.guard.lock().unwrap();
        self.condvar.notify_all();
    }

    pub(crate) fn is_signaled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Sleep for `timeout` or until signaled; returns whether the signal is set
    fn wait(&self, timeout: Duration) -> bool {
        let guard = self.guard.lock().unwrap();
        if self.flag.load(Ordering::Acquire) {
            return true;
        }
        let _unused = self.condvar.wait_timeout(guard, timeout).unwrap();
        self.flag.load(Ordering::Acquire)
    }
}

/// Orchestrates one load test run
pub struct ExecutionController {
    spec: TestSpec,
    metrics: Arc<MetricsCollector>,
    profile: Arc<TrafficProfile>,
    regulator: Arc<RateRegulator>,
    breaker: Option<Arc<CircuitBreaker>>,
    generator: Arc<RequestGenerator>,
    validator: Option<Arc<ResponseValidator>>,
    client: reqwest::blocking::Client,

    state: AtomicU8,
    request_counter: AtomicU64,
    stop_signal: Arc<StopSignal>,
    pool: Mutex<Option<Arc<WorkerPool>>>,
    completion: Arc<(Mutex<bool>, Condvar)>,
}

impl ExecutionController {
    /// Validate the spec and construct every collaborator. All fallible
    /// setup happens here so `execute` starts clean.
    pub fn new(spec: TestSpec) -> Result<Self> {
        spec.validate()?;

        let profile = Arc::new(TrafficProfile::from_config(&spec.traffic_pattern)?);
        let total_ms = spec.test_duration.as_millis() as u64;
        let regulator = Arc::new(RateRegulator::new(profile.tps_at(0, total_ms)));
        let generator = Arc::new(RequestGenerator::new(&spec)?);

        let breaker = if spec.circuit_breaker.enabled {
            Some(Arc::new(CircuitBreaker::new(
                spec.circuit_breaker.error_threshold,
                spec.circuit_breaker.window_size,
            )?))
        } else {
            None
        };

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Other(format!("failed to build HTTP client: {e}")))?;

        let metrics = Arc::new(MetricsCollector::new(&spec));

        tracing::info!(
            "Initialized execution controller for '{}' with {} traffic profile (max {:.2} TPS)",
            spec.name,
            profile.name(),
            profile.max_tps()
        );

        Ok(Self {
            spec,
            metrics,
            profile,
            regulator,
            breaker,
            generator,
            validator: None,
            client,
            state: AtomicU8::new(RunState::Created as u8),
            request_counter: AtomicU64::new(0),
            stop_signal: Arc::new(StopSignal::new()),
            pool: Mutex::new(None),
            completion: Arc::new((Mutex::new(false), Condvar::new())),
        })
    }

    /// Attach an optional response validator
    pub fn with_validator(mut self, validator: ResponseValidator) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Run the test to completion. A controller instance runs once; any
    /// further call fails.
    pub fn execute(&self) -> Result<TestReport> {
        if self
            .state
            .compare_exchange(
                RunState::Created as u8,
                RunState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(Error::State(
                "test has already been started; a controller runs exactly once".into(),
            ));
        }

        let total_ms = self.spec.test_duration.as_millis() as u64;
        self.metrics.start();
        let start_instant = Instant::now();

        let scheduler = self.start_rate_scheduler(start_instant, total_ms);

        let pool = Arc::new(WorkerPool::new(&self.spec.thread_pool));
        *self.pool.lock().unwrap() = Some(pool.clone());

        let executor = Arc::new(RequestExecutor::new(
            self.client.clone(),
            self.generator.clone(),
            self.regulator.clone(),
            self.metrics.clone(),
            self.breaker.clone(),
            self.validator.clone(),
            self.spec.http_timeout,
            start_instant + self.spec.test_duration,
            self.stop_signal.clone(),
        ));

        tracing::info!(
            "Test started, will run for {}",
            timing::format_duration(self.spec.test_duration)
        );
        self.submission_loop(&pool, &executor, start_instant);

        tracing::info!("Test execution completed, waiting for pending requests to finish");
        let drain_timeout = if self.stop_signal.is_signaled() {
            // An external stop already cancelled the pool; don't hold the
            // caller for the full grace period.
            Duration::from_millis(250)
        } else {
            POOL_DRAIN_TIMEOUT
        };
        pool.shutdown(drain_timeout);

        self.stop_signal.signal();
        let _ = scheduler.join();

        self.metrics.stop();
        let report = TestReport::build(&self.spec, &self.metrics, self.breaker.as_deref());

        self.state.store(RunState::Stopped as u8, Ordering::Release);
        *self.pool.lock().unwrap() = None;
        self.release_completion_latch();

        Ok(report)
    }

    /// Dispatch units of work until the deadline, a stop request, or an open
    /// breaker ends the run
    fn submission_loop(
        &self,
        pool: &Arc<WorkerPool>,
        executor: &Arc<RequestExecutor>,
        start_instant: Instant,
    ) {
        let deadline = start_instant + self.spec.test_duration;

        while Instant::now() < deadline && !self.stop_signal.is_signaled() {
            if let Some(breaker) = &self.breaker {
                if !breaker.allow_request() {
                    tracing::warn!("Circuit breaker is open, stopping test");
                    break;
                }
            }

            let request_id = self.request_counter.fetch_add(1, Ordering::AcqRel) + 1;
            let executor = executor.clone();
            pool.execute(Box::new(move || {
                let elapsed_ms = start_instant.elapsed().as_millis() as u64;
                executor.execute_request(request_id, elapsed_ms);
            }));

            std::thread::sleep(SUBMISSION_PAUSE);
        }
    }

    /// 1 Hz scheduler: retarget the regulator from the profile, roll the
    /// per-second TPS sample and histogram snapshots, and log progress every
    /// 10 s. Tick errors are logged and swallowed.
    fn start_rate_scheduler(&self, start_instant: Instant, total_ms: u64) -> JoinHandle<()> {
        let profile = self.profile.clone();
        let regulator = self.regulator.clone();
        let metrics = self.metrics.clone();
        let stop_signal = self.stop_signal.clone();

        std::thread::Builder::new()
            .name("gale-scheduler".to_string())
            .spawn(move || {
                let mut last_progress_ms = 0u64;
                loop {
                    let tick = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        let elapsed_ms = start_instant.elapsed().as_millis() as u64;
                        let target_tps = profile.tps_at(elapsed_ms, total_ms);
                        regulator.set_rate(target_tps);
                        metrics.update_tps();

                        if elapsed_ms.saturating_sub(last_progress_ms) >= PROGRESS_LOG_INTERVAL_MS
                        {
                            last_progress_ms = elapsed_ms;
                            let completion = 100.0 * elapsed_ms as f64 / total_ms as f64;
                            tracing::info!(
                                "Progress: {completion:.1}% | Target TPS: {target_tps:.2} | Actual TPS: {} | Success Rate: {:.2}%",
                                metrics.current_tps(),
                                metrics.counters().success_rate() * 100.0
                            );
                        }
                    }));
                    if let Err(e) = tick {
                        tracing::error!("Error in rate update tick: {e:?}");
                    }
                    if stop_signal.wait(RATE_UPDATE_INTERVAL) {
                        break;
                    }
                }
            })
            .expect("scheduler thread name is valid")
    }

    /// Stop the test from another thread: cancel the pool and scheduler
    /// immediately and release the completion latch. Workers in flight are
    /// bounded by the per-request timeout; partial metrics remain valid.
    /// Idempotent.
    pub fn stop(&self) {
        if self
            .state
            .compare_exchange(
                RunState::Running as u8,
                RunState::Stopping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }
        tracing::info!("Stopping test execution");
        self.stop_signal.signal();
        if let Some(pool) = &*self.pool.lock().unwrap() {
            pool.shutdown_now();
        }
        self.release_completion_latch();
    }

    /// Block until the run reaches its terminal state or `timeout` elapses;
    /// returns whether the run completed
    pub fn wait_for_completion(&self, timeout: Duration) -> bool {
        let (lock, condvar) = &*self.completion;
        let deadline = Instant::now() + timeout;
        let mut done = lock.lock().unwrap();
        while !*done {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (next, result) = condvar.wait_timeout(done, remaining).unwrap();
            done = next;
            if result.timed_out() && !*done {
                return false;
            }
        }
        true
    }

    fn release_completion_latch(&self) {
        let (lock, condvar) = &*self.completion;
        *lock.lock().unwrap() = true;
        condvar.notify_all();
    }
}
