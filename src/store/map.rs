//! `map` backend: an unordered hash map, optionally journaled to a file.
//!
//! Hash order gives no cheap way to find keys sharing a prefix, so `keys`
//! reports `NotSupported`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use super::journal::{Replayed, SharedJournal};
use super::{check_batch, KeyScan, Store, StoreOptions};
use crate::error::{StoreError, StoreResult};

pub struct MapStore {
    map: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    journal: SharedJournal,
    closed: AtomicBool,
}

impl MapStore {
    pub fn open(opts: &StoreOptions) -> StoreResult<Self> {
        let (journal, records) = SharedJournal::open(opts.path.as_deref(), opts.durable)?;
        let mut map = HashMap::new();
        for record in records {
            match record {
                Replayed::Put { key, value } => {
                    map.insert(key, value);
                }
                Replayed::Del { key } => {
                    map.remove(&key);
                }
            }
        }
        Ok(Self {
            map: RwLock::new(map),
            journal,
            closed: AtomicBool::new(false),
        })
    }

    pub fn len(&self) -> usize {
        self.map.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Store for MapStore {
    fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.check_open()?;
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        self.journal.put(key, value)?;
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.check_open()?;
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        Ok(map.get(key).cloned())
    }

    fn del(&self, key: &[u8]) -> StoreResult<bool> {
        self.check_open()?;
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        if !map.contains_key(key) {
            return Ok(false);
        }
        self.journal.del(key)?;
        map.remove(key);
        Ok(true)
    }

    fn pset(&self, keys: &[Vec<u8>], values: &[Vec<u8>]) -> StoreResult<()> {
        self.check_open()?;
        check_batch(keys, values)?;
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        self.journal.put_batch(keys, values)?;
        for (k, v) in keys.iter().zip(values) {
            map.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    fn pget(&self, keys: &[Vec<u8>]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        self.check_open()?;
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        Ok(keys.iter().map(|k| map.get(k).cloned()).collect())
    }

    fn keys(&self, _prefix: &[u8], _limit: usize, _with_values: bool) -> StoreResult<KeyScan> {
        Err(StoreError::NotSupported)
    }

    fn flush_db(&self) -> StoreResult<()> {
        self.check_open()?;
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        self.journal.truncate()?;
        map.clear();
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.journal.sync()
    }
}
