//! Shared test fixtures: an instrumented store and run settings small
//! enough for tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use kvbench::config::RunConfig;
use kvbench::error::{StoreError, StoreResult};
use kvbench::store::{BTreeStore, KeyScan, Store, StoreOptions};

// =============================================================================
// Run settings
// =============================================================================

pub fn quick_config(backend: &str, workers: usize) -> RunConfig {
    RunConfig {
        phase_duration: Duration::from_millis(30),
        workers,
        bulk_load_count: 2_000,
        payload_size: 16,
        backend: backend.parse().unwrap(),
        ..RunConfig::default()
    }
}

/// Logical index carried in bytes 1..9 of a generated key.
pub fn index_of(key: &[u8]) -> u64 {
    u64::from_be_bytes(key[1..9].try_into().unwrap())
}

// =============================================================================
// Counting store
// =============================================================================

/// An in-memory ordered store that counts every call made on it.
#[derive(Default)]
pub struct CountingStore {
    inner: Option<BTreeStore>,
    scan_supported: bool,
    fail_pset: bool,
    always_miss: bool,
    pub sets: AtomicU64,
    pub gets: AtomicU64,
    pub dels: AtomicU64,
    pub scans: AtomicU64,
    pub closes: AtomicU64,
    /// Batch sizes of every `pset`, as (keys, values).
    pub psets: Mutex<Vec<(usize, usize)>>,
    /// Logical index of every `get`.
    pub get_indices: Mutex<Vec<u64>>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: Some(BTreeStore::open(&StoreOptions::memory(false)).unwrap()),
            scan_supported: true,
            ..Self::default()
        }
    }

    /// `keys` reports `NotSupported`.
    pub fn without_scan(mut self) -> Self {
        self.scan_supported = false;
        self
    }

    /// Every `pset` fails.
    pub fn failing_pset(mut self) -> Self {
        self.fail_pset = true;
        self
    }

    /// Every `get` finds nothing.
    pub fn always_miss(mut self) -> Self {
        self.always_miss = true;
        self
    }

    pub fn count(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::SeqCst)
    }

    fn inner(&self) -> &BTreeStore {
        self.inner.as_ref().unwrap()
    }
}

impl Store for CountingStore {
    fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.inner().set(key, value)?;
        self.sets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.get_indices.lock().unwrap().push(index_of(key));
        if self.always_miss {
            return Ok(None);
        }
        self.inner().get(key)
    }

    fn del(&self, key: &[u8]) -> StoreResult<bool> {
        self.dels.fetch_add(1, Ordering::SeqCst);
        self.inner().del(key)
    }

    fn pset(&self, keys: &[Vec<u8>], values: &[Vec<u8>]) -> StoreResult<()> {
        self.psets.lock().unwrap().push((keys.len(), values.len()));
        if self.fail_pset {
            return Err(StoreError::Backend("disk full".into()));
        }
        self.inner().pset(keys, values)
    }

    fn keys(&self, prefix: &[u8], limit: usize, with_values: bool) -> StoreResult<KeyScan> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        if !self.scan_supported {
            return Err(StoreError::NotSupported);
        }
        self.inner().keys(prefix, limit, with_values)
    }

    fn flush_db(&self) -> StoreResult<()> {
        self.inner().flush_db()
    }

    fn close(&self) -> StoreResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner().close()
    }
}
