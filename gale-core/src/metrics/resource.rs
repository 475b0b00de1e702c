//! Process resource sampling
//!
//! A dedicated sampler thread captures CPU and memory usage of this process
//! (plus system memory headroom) on a fixed interval. Snapshots go into a
//! bounded list; running maxima for CPU and RSS feed the final report.

use crate::timing;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use sysinfo::System;

/// Default retention: ten hours of five-second samples
pub const DEFAULT_MAX_SNAPSHOTS: usize = 7200;

/// One resource observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSnapshot {
    pub timestamp_ms: u64,
    /// Process CPU usage in percent; clamped to >= 0, NaN maps to 0
    pub cpu_pct: f64,
    /// Resident set size in bytes
    pub rss_bytes: u64,
    /// Virtual memory size in bytes
    pub virtual_bytes: u64,
    pub system_used_bytes: u64,
    pub system_total_bytes: u64,
    pub system_free_bytes: u64,
    /// Number of OS tasks belonging to this process (0 where unsupported)
    pub thread_count: usize,
}

#[derive(Default)]
struct SharedSamples {
    snapshots: Mutex<Vec<ResourceSnapshot>>,
    /// Max CPU percent, stored as f64 bits
    max_cpu_bits: AtomicU64,
    max_rss_bytes: AtomicU64,
}

impl SharedSamples {
    fn push(&self, snapshot: ResourceSnapshot, cap: usize) {
        let mut snapshots = self.snapshots.lock().unwrap();
        if snapshots.len() < cap {
            snapshots.push(snapshot);
        }

        let mut current = self.max_cpu_bits.load(Ordering::Relaxed);
        while snapshot.cpu_pct > f64::from_bits(current) {
            match self.max_cpu_bits.compare_exchange(
                current,
                snapshot.cpu_pct.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(seen) => current = seen,
            }
        }
        self.max_rss_bytes.fetch_max(snapshot.rss_bytes, Ordering::Relaxed);
    }
}

/// Periodic sampler with cooperative shutdown
pub struct ResourceMonitor {
    shared: Arc<SharedSamples>,
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Mutex<Option<JoinHandle<()>>>,
    max_snapshots: usize,
    sample_interval: Duration,
}

impl ResourceMonitor {
    pub fn new(sample_interval: Duration) -> Self {
        Self {
            shared: Arc::new(SharedSamples::default()),
            stop: Arc::new((Mutex::new(false), Condvar::new())),
            handle: Mutex::new(None),
            max_snapshots: DEFAULT_MAX_SNAPSHOTS,
            sample_interval,
        }
    }

    /// Spawn the sampler thread; a second call is a no-op
    pub fn start(&self) {
        let mut handle = self.handle.lock().unwrap();
        if handle.is_some() {
            return;
        }
        *self.stop.0.lock().unwrap() = false;

        let shared = self.shared.clone();
        let stop = self.stop.clone();
        let interval = self.sample_interval;
        let cap = self.max_snapshots;

        let spawned = std::thread::Builder::new()
            .name("gale-resource-monitor".to_string())
            .spawn(move || {
                let mut system = System::new();
                let pid = match sysinfo::get_current_pid() {
                    Ok(pid) => pid,
                    Err(e) => {
                        tracing::error!("Resource monitor cannot resolve own pid: {e}");
                        return;
                    }
                };
                loop {
                    shared.push(capture(&mut system, pid), cap);

                    let (lock, condvar) = &*stop;
                    let stopped = lock.lock().unwrap();
                    let (stopped, _) = condvar.wait_timeout(stopped, interval).unwrap();
                    if *stopped {
                        break;
                    }
                }
            });

        match spawned {
            Ok(h) => {
                *handle = Some(h);
                tracing::info!(
                    "Started resource monitoring with sample interval {}",
                    timing::format_duration(self.sample_interval)
                );
            }
            Err(e) => tracing::error!("Failed to start resource monitor: {e}"),
        }
    }

    /// Signal the sampler and wait for it to exit
    pub fn stop(&self) {
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            {
                let (lock, condvar) = &*self.stop;
                *lock.lock().unwrap() = true;
                condvar.notify_all();
            }
            let _ = handle.join();
            tracing::info!(
                "Stopped resource monitoring, collected {} snapshots",
                self.snapshot_count()
            );
        }
    }

    /// Defensive copy of all snapshots, oldest first
    pub fn snapshots(&self) -> Vec<ResourceSnapshot> {
        self.shared.snapshots.lock().unwrap().clone()
    }

    pub fn snapshot_count(&self) -> usize {
        self.shared.snapshots.lock().unwrap().len()
    }

    pub fn max_cpu_pct(&self) -> f64 {
        f64::from_bits(self.shared.max_cpu_bits.load(Ordering::Relaxed))
    }

    pub fn max_rss_bytes(&self) -> u64 {
        self.shared.max_rss_bytes.load(Ordering::Relaxed)
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture(system: &mut System, pid: sysinfo::Pid) -> ResourceSnapshot {
    system.refresh_memory();
    system.refresh_processes();

    let timestamp_ms = timing::epoch_ms();
    let (cpu_pct, rss_bytes, virtual_bytes, thread_count) = match system.process(pid) {
        Some(process) => {
            let cpu = f64::from(process.cpu_usage());
            let cpu = if cpu.is_nan() { 0.0 } else { cpu.max(0.0) };
            let threads = process.tasks().map(|tasks| tasks.len()).unwrap_or(0);
            (cpu, process.memory(), process.virtual_memory(), threads)
        }
        None => (0.0, 0, 0, 0),
    };

    ResourceSnapshot {
        timestamp_ms,
        cpu_pct,
        rss_bytes,
        virtual_bytes,
        system_used_bytes: system.used_memory(),
        system_total_bytes: system.total_memory(),
        system_free_bytes: system.available_memory(),
        thread_count,
    }
}
