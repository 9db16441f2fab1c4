//! Time-bounded worker pools.
//!
//! [`run_phase`] spawns N workers against one shared store, releases them
//! together through a barrier, raises a stop flag once the phase duration
//! has elapsed, and merges the per-worker counters after every worker has
//! joined.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::BenchError;
use crate::store::Store;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Counters one worker owns for the length of a phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Attempted operations, hits and misses alike.
    pub ops: u64,
    /// Attempts that found nothing or failed.
    pub misses: u64,
}

impl WorkerStats {
    /// Count one attempt.
    #[inline]
    pub fn hit(&mut self) {
        self.ops += 1;
    }

    /// Count one attempt that missed.
    #[inline]
    pub fn miss(&mut self) {
        self.ops += 1;
        self.misses += 1;
    }
}

/// Merged outcome of one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseResult {
    pub workers: usize,
    /// Wall-clock time from worker release until the last join.
    pub elapsed: Duration,
    /// One entry per worker, in worker-id order.
    pub per_worker: Vec<WorkerStats>,
}

impl PhaseResult {
    pub fn total_ops(&self) -> u64 {
        self.per_worker.iter().map(|w| w.ops).sum()
    }

    pub fn total_misses(&self) -> u64 {
        self.per_worker.iter().map(|w| w.misses).sum()
    }
}

/// Lifecycle of a phase, logged as it advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
    Idle,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PhaseState::Idle => "idle",
            PhaseState::Running => "running",
            PhaseState::Draining => "draining",
            PhaseState::Stopped => "stopped",
        })
    }
}

// ---------------------------------------------------------------------------
// Worker context
// ---------------------------------------------------------------------------

/// What a worker closure gets to see.
pub struct Worker<'a> {
    /// Zero-based worker id.
    pub id: usize,
    /// Pool size.
    pub workers: usize,
    pub store: &'a dyn Store,
    stop: &'a AtomicBool,
}

impl Worker<'_> {
    /// Whether the phase deadline has passed.
    #[inline]
    pub fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Run `work_fn` on `workers` threads for `duration`.
///
/// Each worker must poll [`Worker::stopped`] between operations and return
/// its own counters. A worker that panics fails the phase with
/// [`BenchError::WorkerPanicked`] once every other worker has been joined.
pub fn run_phase<F>(
    phase: &'static str,
    store: &Arc<dyn Store>,
    workers: usize,
    duration: Duration,
    work_fn: F,
) -> Result<PhaseResult, BenchError>
where
    F: Fn(&Worker<'_>) -> WorkerStats + Send + Sync + 'static,
{
    debug!(phase, state = %PhaseState::Idle, workers, "phase");
    let work_fn = Arc::new(work_fn);
    let barrier = Arc::new(Barrier::new(workers + 1));
    let stop = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::with_capacity(workers);

    for id in 0..workers {
        let store = Arc::clone(store);
        let barrier = Arc::clone(&barrier);
        let stop = Arc::clone(&stop);
        let work_fn = Arc::clone(&work_fn);

        handles.push(std::thread::spawn(move || {
            barrier.wait();
            let worker = Worker {
                id,
                workers,
                store: store.as_ref(),
                stop: &stop,
            };
            work_fn(&worker)
        }));
    }

    barrier.wait(); // release all workers
    let start = Instant::now();
    debug!(phase, state = %PhaseState::Running, "phase");
    std::thread::sleep(duration);
    stop.store(true, Ordering::SeqCst);
    debug!(phase, state = %PhaseState::Draining, "phase");

    let mut per_worker = Vec::with_capacity(workers);
    let mut panicked = false;
    for h in handles {
        match h.join() {
            Ok(stats) => per_worker.push(stats),
            Err(_) => panicked = true,
        }
    }
    let elapsed = start.elapsed();
    debug!(phase, state = %PhaseState::Stopped, ?elapsed, "phase");

    if panicked {
        return Err(BenchError::WorkerPanicked(phase));
    }
    Ok(PhaseResult {
        workers,
        elapsed,
        per_worker,
    })
}
