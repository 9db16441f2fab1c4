//! Reduces a phase's operation count and wall-clock time to a rate and a
//! mean per-operation latency.

use std::time::Duration;

use super::phase::PhaseResult;

/// Column value recorded for a phase the backend cannot run.
pub const SENTINEL: i64 = -1;

/// Raw inputs of one phase's throughput figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throughput {
    /// Attempts summed over all workers.
    pub ops: u64,
    pub elapsed: Duration,
    /// Workers the phase ran with.
    pub workers: usize,
}

impl Throughput {
    pub fn new(ops: u64, elapsed: Duration, workers: usize) -> Self {
        Self {
            ops,
            elapsed,
            workers,
        }
    }

    /// Operations per second: `ops * 1_000_000 / elapsed_micros`.
    ///
    /// Elapsed time below one microsecond counts as one.
    pub fn ops_per_sec(&self) -> i64 {
        let micros = self.elapsed.as_micros().max(1);
        let rate = u128::from(self.ops) * 1_000_000 / micros;
        i64::try_from(rate).unwrap_or(i64::MAX)
    }

    /// Mean latency as `elapsed / (ops * workers)`.
    ///
    /// The extra `workers` factor keeps figures comparable with historical
    /// ledgers. `None` when nothing ran.
    pub fn mean_latency(&self) -> Option<Duration> {
        let divisor = u128::from(self.ops) * self.workers as u128;
        if divisor == 0 {
            return None;
        }
        let nanos = self.elapsed.as_nanos() / divisor;
        Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
    }

    /// Mean latency in nanoseconds, or [`SENTINEL`] when nothing ran.
    pub fn mean_latency_nanos(&self) -> i64 {
        self.mean_latency()
            .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
            .unwrap_or(SENTINEL)
    }
}

impl From<&PhaseResult> for Throughput {
    fn from(r: &PhaseResult) -> Self {
        Throughput::new(r.total_ops(), r.elapsed, r.workers)
    }
}
