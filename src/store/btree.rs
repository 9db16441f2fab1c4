//! `btree` backend: an ordered map, optionally journaled to a file.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use super::journal::{Replayed, SharedJournal};
use super::{check_batch, under_limit, KeyScan, Store, StoreOptions};
use crate::error::{StoreError, StoreResult};

pub struct BTreeStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    journal: SharedJournal,
    closed: AtomicBool,
}

impl BTreeStore {
    pub fn open(opts: &StoreOptions) -> StoreResult<Self> {
        let (journal, records) = SharedJournal::open(opts.path.as_deref(), opts.durable)?;
        let mut map = BTreeMap::new();
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

    fn check_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

/// Smallest key greater than every key starting with `prefix`, if any.
fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

impl Store for BTreeStore {
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

    fn keys(&self, prefix: &[u8], limit: usize, with_values: bool) -> StoreResult<KeyScan> {
        self.check_open()?;
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        let successor = prefix_successor(prefix);
        let upper = match &successor {
            Some(end) => Bound::Excluded(end.as_slice()),
            None => Bound::Unbounded,
        };
        let mut scan = KeyScan::default();
        for (k, v) in map.range::<[u8], _>((Bound::Included(prefix), upper)) {
            if !under_limit(scan.keys.len(), limit) {
                break;
            }
            scan.keys.push(k.clone());
            if with_values {
                scan.values.push(v.clone());
            }
        }
        Ok(scan)
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

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> BTreeStore {
        BTreeStore::open(&StoreOptions::memory(false)).unwrap()
    }

    #[test]
    fn prefix_scan_matches_only_prefix() {
        let s = store();
        for k in [&b"ab1"[..], b"ab2", b"ac1", b"b", b"a"] {
            s.set(k, k).unwrap();
        }
        let scan = s.keys(b"ab", 0, true).unwrap();
        assert_eq!(scan.keys, vec![b"ab1".to_vec(), b"ab2".to_vec()]);
        assert_eq!(scan.values, scan.keys);
        let scan = s.keys(b"a", 0, false).unwrap();
        assert_eq!(scan.keys.len(), 4);
        assert!(scan.values.is_empty());
    }

    #[test]
    fn prefix_scan_respects_limit() {
        let s = store();
        for i in 0..10u8 {
            s.set(&[b'p', i], b"v").unwrap();
        }
        assert_eq!(s.keys(b"p", 3, false).unwrap().keys.len(), 3);
        assert_eq!(s.keys(b"p", 0, false).unwrap().keys.len(), 10);
    }

    #[test]
    fn prefix_with_max_bytes() {
        let s = store();
        s.set(&[0xff, 0xff, 1], b"v").unwrap();
        s.set(&[0xfe], b"v").unwrap();
        let scan = s.keys(&[0xff, 0xff], 0, false).unwrap();
        assert_eq!(scan.keys, vec![vec![0xff, 0xff, 1]]);
    }

    #[test]
    fn successor() {
        assert_eq!(prefix_successor(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(prefix_successor(&[1, 0xff]), Some(vec![2]));
        assert_eq!(prefix_successor(&[0xff]), None);
    }

    #[test]
    fn flush_empties() {
        let s = store();
        s.set(b"k", b"v").unwrap();
        s.flush_db().unwrap();
        assert_eq!(s.get(b"k").unwrap(), None);
        assert!(s.keys(b"", 0, false).unwrap().keys.is_empty());
    }
}
