//! Bounded worker pool
//!
//! Core threads are spawned eagerly and live for the pool's lifetime. When
//! the queue is full, a transient thread is added (up to the maximum) and
//! handed the overflowing job directly; transients retire after sitting
//! idle for the keep-alive period. If the pool is already at its maximum
//! and the queue is still full, the submitting thread runs the job inline
//! rather than dropping it.

use crate::config::ThreadPoolConfig;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolShared {
    receiver: Mutex<Receiver<Job>>,
    /// When set, workers drain the queue without running the jobs
    discard: AtomicBool,
    live_threads: AtomicUsize,
}

impl PoolShared {
    fn run(&self, job: Job) {
        if !self.discard.load(Ordering::Acquire) {
            job();
        }
    }
}

pub struct WorkerPool {
    sender: Mutex<Option<SyncSender<Job>>>,
    shared: Arc<PoolShared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    next_worker_id: AtomicUsize,
    core_size: usize,
    max_size: usize,
    keep_alive: Duration,
}

impl WorkerPool {
    pub fn new(config: &ThreadPoolConfig) -> Self {
        // A zero-length queue would make sync_channel rendezvous-only;
        // keep at least one slot so submission stays decoupled.
        let queue_size = config.queue_size.max(1);
        let (sender, receiver) = std::sync::mpsc::sync_channel::<Job>(queue_size);

        let shared = Arc::new(PoolShared {
            receiver: Mutex::new(receiver),
            discard: AtomicBool::new(false),
            live_threads: AtomicUsize::new(0),
        });

        let pool = Self {
            sender: Mutex::new(Some(sender)),
            shared,
            handles: Mutex::new(Vec::with_capacity(config.max_size)),
            next_worker_id: AtomicUsize::new(0),
            core_size: config.core_size,
            max_size: config.max_size.max(config.core_size),
            keep_alive: config.keep_alive_time,
        };
        for _ in 0..pool.core_size {
            pool.spawn_worker(None, false);
        }
        pool
    }

    /// Submit a job. Saturation first grows the pool toward its maximum,
    /// handing the job to the new thread; once at the maximum the policy is
    /// caller-runs. After shutdown, jobs are silently dropped.
    pub fn execute(&self, job: Job) {
        let sender = match &*self.sender.lock().unwrap() {
            Some(sender) => sender.clone(),
            None => return,
        };

        match sender.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                if let Err(job) = self.spawn_worker(Some(job), true) {
                    job();
                }
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Spawn a worker, optionally seeded with a first job. Fails (returning
    /// the job) when the pool is already at its maximum size.
    fn spawn_worker(&self, initial: Option<Job>, transient: bool) -> Result<(), Job> {
        if self.shared.live_threads.fetch_add(1, Ordering::AcqRel) >= self.max_size {
            self.shared.live_threads.fetch_sub(1, Ordering::AcqRel);
            return match initial {
                Some(job) => Err(job),
                None => Ok(()),
            };
        }

        let worker_id = self.next_worker_id.fetch_add(1, Ordering::Relaxed) + 1;
        let shared = self.shared.clone();
        let keep_alive = self.keep_alive;
        let initial_slot = std::sync::Arc::new(std::sync::Mutex::new(initial));
        let initial_for_worker = initial_slot.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("gale-worker-{worker_id}"))
            .spawn(move || {
                if let Some(job) = initial_for_worker.lock().unwrap().take() {
                    shared.run(job);
                }
                loop {
                    let received = {
                        let receiver = shared.receiver.lock().unwrap();
                        if transient {
                            receiver.recv_timeout(keep_alive)
                        } else {
                            receiver.recv().map_err(|_| RecvTimeoutError::Disconnected)
                        }
                    };
                    match received {
                        Ok(job) => shared.run(job),
                        Err(_) => {
                            shared.live_threads.fetch_sub(1, Ordering::AcqRel);
                            break;
                        }
                    }
                }
            });

        match spawned {
            Ok(handle) => {
                self.handles.lock().unwrap().push(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.live_threads.fetch_sub(1, Ordering::AcqRel);
                tracing::error!("Failed to spawn worker thread: {e}");
                match initial_slot.lock().unwrap().take() {
                    Some(job) => Err(job),
                    None => Ok(()),
                }
            }
        }
    }

    /// Orderly shutdown: close the queue, let workers drain it, and wait up
    /// to `timeout` for every worker to exit. Returns whether the pool fully
    /// terminated in time; stragglers are left to finish detached.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        self.sender.lock().unwrap().take();

        let deadline = Instant::now() + timeout;
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        let mut drained = true;
        for handle in handles {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    drained = false;
                    break;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
        if !drained {
            tracing::warn!("Worker pool did not terminate within {timeout:?}");
        }
        drained
    }

    /// Immediate shutdown: close the queue and discard everything queued.
    /// In-flight jobs run to completion (their HTTP calls are bounded by the
    /// per-request timeout).
    pub fn shutdown_now(&self) {
        self.shared.discard.store(true, Ordering::Release);
        self.sender.lock().unwrap().take();
    }

    pub fn live_threads(&self) -> usize {
        self.shared.live_threads.load(Ordering::Acquire)
    }
}
