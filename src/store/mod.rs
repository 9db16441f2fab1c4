//! The storage contract every backend adapter implements, and the registry
//! that maps backend names to constructors.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{StoreError, StoreResult};

pub mod btree;
pub mod journal;
pub mod map;
#[cfg(feature = "rocksdb")]
pub mod rocks;
#[cfg(feature = "strata")]
pub mod strata;

pub use btree::BTreeStore;
pub use map::MapStore;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksStore;
#[cfg(feature = "strata")]
pub use strata::StrataStore;

/// Result of a prefix scan. `values` is empty unless values were requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyScan {
    pub keys: Vec<Vec<u8>>,
    pub values: Vec<Vec<u8>>,
}

/// A key-value store under benchmark.
///
/// Implementations must tolerate concurrent calls to `set`, `get`, `del` and
/// `pset` from many threads; the driver does no locking of its own.
pub trait Store: Send + Sync {
    /// Upsert one entry.
    fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Look up one entry. `Ok(None)` means the key is absent.
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Remove one entry, reporting whether it existed.
    fn del(&self, key: &[u8]) -> StoreResult<bool>;

    /// Write a batch of pairs in one call.
    fn pset(&self, keys: &[Vec<u8>], values: &[Vec<u8>]) -> StoreResult<()>;

    /// Batched point lookups, one result per key.
    fn pget(&self, keys: &[Vec<u8>]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        keys.iter().map(|k| self.get(k)).collect()
    }

    /// All keys starting with `prefix`, at most `limit` of them (0 = no limit).
    ///
    /// Returns [`StoreError::NotSupported`] when the backend cannot scan.
    fn keys(&self, prefix: &[u8], limit: usize, with_values: bool) -> StoreResult<KeyScan>;

    /// Drop every entry, keeping the configuration.
    fn flush_db(&self) -> StoreResult<()>;

    /// Release backend resources. Further calls are no-ops.
    fn close(&self) -> StoreResult<()>;
}

/// Reject batches whose key and value counts differ.
pub fn check_batch(keys: &[Vec<u8>], values: &[Vec<u8>]) -> StoreResult<()> {
    if keys.len() != values.len() {
        return Err(StoreError::BatchMismatch {
            keys: keys.len(),
            values: values.len(),
        });
    }
    Ok(())
}

/// Keep at most `limit` items; 0 keeps everything.
#[inline]
pub(crate) fn under_limit(len: usize, limit: usize) -> bool {
    limit == 0 || len < limit
}

// =============================================================================
// Registry
// =============================================================================

/// How to open a backend.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// On-disk location; `None` requests the in-memory variant.
    pub path: Option<PathBuf>,
    /// Synchronously persist each acknowledged write.
    pub durable: bool,
}

impl StoreOptions {
    pub fn memory(durable: bool) -> Self {
        Self {
            path: None,
            durable,
        }
    }

    pub fn at(path: impl Into<PathBuf>, durable: bool) -> Self {
        Self {
            path: Some(path.into()),
            durable,
        }
    }
}

/// Constructor registered for a backend name.
pub type StoreConstructor = fn(&StoreOptions) -> StoreResult<Box<dyn Store>>;

/// Backend name → constructor.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    constructors: BTreeMap<String, StoreConstructor>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every adapter shipped with this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("map", |opts| Ok(Box::new(MapStore::open(opts)?)));
        registry.register("btree", |opts| Ok(Box::new(BTreeStore::open(opts)?)));
        #[cfg(feature = "rocksdb")]
        registry.register("rocksdb", |opts| Ok(Box::new(RocksStore::open(opts)?)));
        #[cfg(feature = "strata")]
        registry.register("strata", |opts| Ok(Box::new(StrataStore::open(opts)?)));
        registry
    }

    /// Add or replace a backend.
    pub fn register(&mut self, name: impl Into<String>, ctor: StoreConstructor) {
        self.constructors.insert(name.into(), ctor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn open(&self, name: &str, opts: &StoreOptions) -> StoreResult<Box<dyn Store>> {
        let ctor = self
            .constructors
            .get(name)
            .ok_or_else(|| StoreError::UnknownBackend(name.to_string()))?;
        ctor(opts)
    }
}
