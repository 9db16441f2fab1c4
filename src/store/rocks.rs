//! `rocksdb` backend: the RocksDB LSM engine.
//!
//! RocksDB always needs a directory; opening without a path fails with
//! [`StoreError::MemoryNotAllowed`].

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, WriteOptions, DB};

use super::{check_batch, under_limit, KeyScan, Store, StoreOptions};
use crate::error::{StoreError, StoreResult};

pub struct RocksStore {
    db: RwLock<Option<DB>>,
    path: PathBuf,
    durable: bool,
}

fn db_options() -> Options {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts
}

fn open_db(path: &Path) -> StoreResult<DB> {
    DB::open(&db_options(), path)
        .map_err(|err| StoreError::Backend(format!("rocksdb open error: {err}")))
}

fn rocks_error(err: rocksdb::Error) -> StoreError {
    StoreError::Backend(format!("rocksdb error: {err}"))
}

impl RocksStore {
    pub fn open(opts: &StoreOptions) -> StoreResult<Self> {
        let path = opts.path.clone().ok_or(StoreError::MemoryNotAllowed)?;
        let db = open_db(&path)?;
        Ok(Self {
            db: RwLock::new(Some(db)),
            path,
            durable: opts.durable,
        })
    }

    fn write_options(&self) -> WriteOptions {
        let mut write_options = WriteOptions::default();
        write_options.set_sync(self.durable);
        write_options
    }

    fn with_db<T>(&self, f: impl FnOnce(&DB) -> StoreResult<T>) -> StoreResult<T> {
        let db = self.db.read().unwrap_or_else(PoisonError::into_inner);
        f(db.as_ref().ok_or(StoreError::Closed)?)
    }
}

impl Store for RocksStore {
    fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.with_db(|db| {
            db.put_opt(key, value, &self.write_options())
                .map_err(rocks_error)
        })
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.with_db(|db| {
            db.get(key)
                .map_err(|err| StoreError::Backend(format!("rocksdb get error: {err}")))
        })
    }

    fn del(&self, key: &[u8]) -> StoreResult<bool> {
        self.with_db(|db| {
            if db.get_pinned(key).map_err(rocks_error)?.is_none() {
                return Ok(false);
            }
            db.delete_opt(key, &self.write_options())
                .map_err(rocks_error)?;
            Ok(true)
        })
    }

    fn pset(&self, keys: &[Vec<u8>], values: &[Vec<u8>]) -> StoreResult<()> {
        check_batch(keys, values)?;
        self.with_db(|db| {
            let mut batch = WriteBatch::default();
            for (k, v) in keys.iter().zip(values) {
                batch.put(k, v);
            }
            db.write_opt(batch, &self.write_options())
                .map_err(rocks_error)
        })
    }

    fn keys(&self, prefix: &[u8], limit: usize, with_values: bool) -> StoreResult<KeyScan> {
        self.with_db(|db| {
            let mut scan = KeyScan::default();
            for item in db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
                let (key, value) =
                    item.map_err(|err| StoreError::Backend(format!("rocksdb iterator error: {err}")))?;
                if !key.starts_with(prefix) || !under_limit(scan.keys.len(), limit) {
                    break;
                }
                scan.keys.push(key.into_vec());
                if with_values {
                    scan.values.push(value.into_vec());
                }
            }
            Ok(scan)
        })
    }

    fn flush_db(&self) -> StoreResult<()> {
        let mut db = self.db.write().unwrap_or_else(PoisonError::into_inner);
        // The old handle must be dropped before its files can be destroyed.
        if db.take().is_none() {
            return Err(StoreError::Closed);
        }
        DB::destroy(&db_options(), &self.path).map_err(rocks_error)?;
        *db = Some(open_db(&self.path)?);
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        let mut db = self.db.write().unwrap_or_else(PoisonError::into_inner);
        match db.take() {
            Some(db) => db.flush().map_err(rocks_error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_in(dir: &tempfile::TempDir, durable: bool) -> RocksStore {
        RocksStore::open(&StoreOptions::at(dir.path().join("rocksdb.db"), durable)).unwrap()
    }

    #[test]
    fn memory_not_allowed() {
        assert!(matches!(
            RocksStore::open(&StoreOptions::memory(false)),
            Err(StoreError::MemoryNotAllowed)
        ));
    }

    #[test]
    fn point_operations() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, false);
        store.set(b"a", b"first").unwrap();
        store.set(b"a", b"second").unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"second".to_vec()));
        assert!(store.del(b"a").unwrap());
        assert!(!store.del(b"a").unwrap());
        assert_eq!(store.get(b"a").unwrap(), None);
        store.close().unwrap();
        assert!(matches!(store.get(b"a"), Err(StoreError::Closed)));
    }

    #[test]
    fn scan_stops_at_prefix_end() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, false);
        let keys = vec![b"pa".to_vec(), b"pb".to_vec(), b"pc".to_vec(), b"q".to_vec()];
        let values = vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec(), b"4".to_vec()];
        store.pset(&keys, &values).unwrap();

        let scan = store.keys(b"p", 0, true).unwrap();
        assert_eq!(scan.keys, keys[..3].to_vec());
        assert_eq!(scan.values, values[..3].to_vec());
        assert_eq!(store.keys(b"p", 2, false).unwrap().keys.len(), 2);
        assert!(store.keys(b"z", 0, false).unwrap().keys.is_empty());
    }

    #[test]
    fn flush_db_destroys_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, true);
        store.set(b"a", b"1").unwrap();
        store.flush_db().unwrap();
        assert_eq!(store.get(b"a").unwrap(), None);
        store.set(b"b", b"2").unwrap();
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
        store.close().unwrap();
        assert!(matches!(store.flush_db(), Err(StoreError::Closed)));
    }
}
