//! The benchmark phases.
//!
//! Every timed phase runs the same shape of loop on each worker: poll the
//! stop flag, issue one store call for the worker's current stride index,
//! count it, move on. Each phase appends its own columns to the run's
//! [`Record`] and logs one rate line.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, trace, warn};

use crate::config::RunConfig;
use crate::error::{BenchError, StoreError};
use crate::harness::phase::{run_phase, PhaseResult, Worker, WorkerStats};
use crate::harness::throughput::{Throughput, SENTINEL};
use crate::harness::BULK_PAGE_SIZE;
use crate::keygen::{fill_random_key, key_prefix, printable_byte, random_key, Stride, KEY_LEN, PREFIX_LEN};
use crate::record::{self, Record};
use crate::store::Store;

// =============================================================================
// Bulk load
// =============================================================================

/// Outcome of the bulk-load phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkLoadResult {
    /// Entries written.
    pub inserted: u64,
    /// `pset` calls issued.
    pub batches: u64,
    pub elapsed: Duration,
}

/// Write `count` random entries in pages of [`BULK_PAGE_SIZE`], one `pset`
/// per page, on the calling thread.
///
/// Keys are random through all nine bytes with a printable first byte;
/// values are `payload_size` random bytes. The last page holds only what is
/// left of `count`. The first failing `pset` ends the load.
pub fn bulk_load<R: Rng>(
    store: &dyn Store,
    count: usize,
    payload_size: usize,
    rng: &mut R,
) -> Result<BulkLoadResult, StoreError> {
    let start = Instant::now();
    let mut keys = vec![vec![0u8; KEY_LEN]; BULK_PAGE_SIZE.min(count)];
    let mut values = vec![vec![0u8; payload_size]; keys.len()];
    let mut inserted = 0u64;
    let mut batches = 0u64;
    let mut remaining = count;

    while remaining > 0 {
        let page = remaining.min(BULK_PAGE_SIZE);
        for (k, v) in keys[..page].iter_mut().zip(values[..page].iter_mut()) {
            fill_random_key(rng, k);
            rng.fill(v.as_mut_slice());
        }
        store.pset(&keys[..page], &values[..page])?;
        inserted += page as u64;
        batches += 1;
        remaining -= page;
    }

    Ok(BulkLoadResult {
        inserted,
        batches,
        elapsed: start.elapsed(),
    })
}

// =============================================================================
// Timed phases
// =============================================================================

/// Outcome of the mixed phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixedResult {
    pub readers: PhaseResult,
    /// Successful writes by the single writer.
    pub writes: u64,
}

/// Per-phase salts so no two phases replay the same random stream.
mod salt {
    pub const BULK: u64 = 1;
    pub const KEYS: u64 = 2;
    pub const SET: u64 = 3;
    pub const GET: u64 = 4;
    pub const MIXED: u64 = 5;
    pub const DEL: u64 = 6;
}

fn phase_rng(seed: u64, salt: u64, worker: usize) -> StdRng {
    StdRng::seed_from_u64(seed ^ (salt << 32) ^ worker as u64)
}

/// Runs phases against one store with one run's settings.
pub struct Workload {
    store: Arc<dyn Store>,
    name: String,
    workers: usize,
    duration: Duration,
    payload: Arc<[u8]>,
    seed: u64,
}

impl Workload {
    pub fn new(store: Arc<dyn Store>, config: &RunConfig) -> Self {
        Self {
            store,
            name: config.run_name(),
            workers: config.workers,
            duration: config.phase_duration,
            payload: vec![0u8; config.payload_size].into(),
            seed: config.seed,
        }
    }

    /// Bulk load `count` entries. Appends `batch write cost(s)`.
    pub fn bulk_load(&self, record: &mut Record, count: usize) -> Result<BulkLoadResult, BenchError> {
        let mut rng = phase_rng(self.seed, salt::BULK, 0);
        let result = bulk_load(self.store.as_ref(), count, self.payload.len(), &mut rng)
            .map_err(BenchError::BulkLoad)?;
        info!(
            "{} batch write test inserted: {} entries in {} batches; took: {:?}",
            self.name, result.inserted, result.batches, result.elapsed
        );
        record.push(record::BULK_LOAD_SECS, result.elapsed.as_secs() as i64);
        Ok(result)
    }

    /// Prefix scans. Appends `Keys op/s`, or `-1` when the store cannot scan.
    pub fn prefix_scan(&self, record: &mut Record) -> Result<Option<PhaseResult>, BenchError> {
        let mut rng = phase_rng(self.seed, salt::KEYS, usize::MAX);
        let probe = key_prefix(0, printable_byte(&mut rng), PREFIX_LEN);
        if let Err(StoreError::NotSupported) = self.store.keys(&probe, 0, true) {
            info!(
                "{} keys rate: {} op/s, mean: {} ns, took: {} s",
                self.name, SENTINEL, SENTINEL, SENTINEL
            );
            record.push(record::KEYS_RATE, SENTINEL);
            return Ok(None);
        }

        let seed = self.seed;
        let result = run_phase("keys", &self.store, self.workers, self.duration, move |w| {
            let mut rng = phase_rng(seed, salt::KEYS, w.id);
            strided(w, |store, i| {
                let prefix = key_prefix(i, printable_byte(&mut rng), PREFIX_LEN);
                match store.keys(&prefix, 0, true) {
                    Ok(_) => Outcome::Hit,
                    Err(e) => {
                        trace!(error = %e, "scan failed");
                        Outcome::Reset
                    }
                }
            })
        })?;
        self.report(record, "keys", record::KEYS_RATE, Throughput::from(&result));
        Ok(Some(result))
    }

    /// Point writes. Appends `Set op/s`.
    pub fn point_set(&self, record: &mut Record) -> Result<PhaseResult, BenchError> {
        let seed = self.seed;
        let payload = Arc::clone(&self.payload);
        let result = run_phase("set", &self.store, self.workers, self.duration, move |w| {
            let mut rng = phase_rng(seed, salt::SET, w.id);
            strided(w, |store, i| match store.set(&random_key(&mut rng, i), &payload) {
                Ok(()) => Outcome::Hit,
                Err(e) => {
                    trace!(error = %e, "set failed");
                    Outcome::Miss
                }
            })
        })?;
        self.report(record, "set", record::SET_RATE, Throughput::from(&result));
        Ok(result)
    }

    /// Point reads, rewinding to the worker's first index on a miss.
    /// Appends `Get op/s`.
    pub fn point_get(&self, record: &mut Record) -> Result<PhaseResult, BenchError> {
        let seed = self.seed;
        let result = run_phase("get", &self.store, self.workers, self.duration, move |w| {
            let mut rng = phase_rng(seed, salt::GET, w.id);
            strided(w, |store, i| get_once(store, &random_key(&mut rng, i)))
        })?;
        self.report(record, "get", record::GET_RATE, Throughput::from(&result));
        Ok(result)
    }

    /// Point reads alongside one sequential writer.
    ///
    /// The writer has its own stop flag, raised only after every reader has
    /// joined. Appends `Setmixed op/s` then `Getmixed op/s`.
    pub fn mixed(&self, record: &mut Record) -> Result<MixedResult, BenchError> {
        let writer_stop = Arc::new(AtomicBool::new(false));
        let writer = {
            let store = Arc::clone(&self.store);
            let stop = Arc::clone(&writer_stop);
            let payload = Arc::clone(&self.payload);
            let mut rng = phase_rng(self.seed, salt::MIXED, usize::MAX);
            std::thread::spawn(move || {
                let mut writes = 0u64;
                let mut i = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    match store.set(&random_key(&mut rng, i), &payload) {
                        Ok(()) => writes += 1,
                        Err(e) => trace!(error = %e, index = i, "mixed write failed"),
                    }
                    i += 1;
                }
                writes
            })
        };

        let seed = self.seed;
        let readers = run_phase("mixed", &self.store, self.workers, self.duration, move |w| {
            let mut rng = phase_rng(seed, salt::MIXED, w.id);
            strided(w, |store, i| get_once(store, &random_key(&mut rng, i)))
        });
        writer_stop.store(true, Ordering::SeqCst);
        let writes = writer
            .join()
            .map_err(|_| BenchError::WorkerPanicked("mixed writer"))?;
        let readers = readers?;

        if writes == 0 {
            warn!("{} setmixed rate: -1 op/s, mean: -1 ns, took: {} s", self.name, readers.elapsed.as_secs());
            record.push(record::MIXED_SET_RATE, SENTINEL);
        } else {
            let t = Throughput::new(writes, readers.elapsed, 1);
            self.report(record, "setmixed", record::MIXED_SET_RATE, t);
        }
        self.report(record, "getmixed", record::MIXED_GET_RATE, Throughput::from(&readers));
        Ok(MixedResult { readers, writes })
    }

    /// Point deletes; absent keys are not failures. Appends `Del op/s`.
    pub fn delete(&self, record: &mut Record) -> Result<PhaseResult, BenchError> {
        let seed = self.seed;
        let result = run_phase("del", &self.store, self.workers, self.duration, move |w| {
            let mut rng = phase_rng(seed, salt::DEL, w.id);
            strided(w, |store, i| match store.del(&random_key(&mut rng, i)) {
                Ok(_) => Outcome::Hit,
                Err(e) => {
                    trace!(error = %e, "del failed");
                    Outcome::Miss
                }
            })
        })?;
        self.report(record, "del", record::DEL_RATE, Throughput::from(&result));
        Ok(result)
    }

    fn report(&self, record: &mut Record, label: &str, header: &'static str, t: Throughput) {
        let rate = t.ops_per_sec();
        info!(
            "{} {} rate: {} op/s, mean: {} ns, took: {} s",
            self.name,
            label,
            rate,
            t.mean_latency_nanos(),
            t.elapsed.as_secs()
        );
        record.push(header, rate);
    }
}

// =============================================================================
// Worker loop
// =============================================================================

/// What one attempt did to the worker's stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Counted, advance.
    Hit,
    /// Counted as a miss, advance.
    Miss,
    /// Counted as a miss, rewind to the first index, then advance.
    Reset,
}

fn get_once(store: &dyn Store, key: &[u8]) -> Outcome {
    match store.get(key) {
        Ok(Some(_)) => Outcome::Hit,
        Ok(None) => Outcome::Reset,
        Err(e) => {
            trace!(error = %e, "get failed");
            Outcome::Reset
        }
    }
}

/// Call `op` on successive stride indices until the phase stops.
fn strided<F>(w: &Worker<'_>, mut op: F) -> WorkerStats
where
    F: FnMut(&dyn Store, u64) -> Outcome,
{
    let mut stride = Stride::new(w.id, w.workers);
    let mut stats = WorkerStats::default();
    while !w.stopped() {
        match op(w.store, stride.current()) {
            Outcome::Hit => stats.hit(),
            Outcome::Miss => stats.miss(),
            Outcome::Reset => {
                stats.miss();
                stride.reset();
            }
        }
        stride.advance();
    }
    stats
}
