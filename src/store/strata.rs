//! `strata` backend: the StrataDB embedded engine.
//!
//! Strata keys are strings, so byte keys are hex encoded; hex preserves byte
//! prefixes, which lets prefix scans go straight to `kv_list`. Each worker
//! thread borrows its own `Strata` handle from a pool.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use stratadb::{Command, Database, Strata, Value};

use super::{check_batch, under_limit, KeyScan, Store, StoreOptions};
use crate::error::{StoreError, StoreResult};

/// Config file Strata reads from its data directory.
const CONFIG_FILE: &str = "strata.toml";

struct Engine {
    db: Strata,
    idle: Mutex<Vec<Strata>>,
}

impl Engine {
    fn open(path: Option<&Path>, durable: bool) -> StoreResult<Self> {
        let database = match path {
            None => Database::cache().map_err(StoreError::backend)?,
            Some(path) => {
                std::fs::create_dir_all(path)?;
                if durable {
                    std::fs::write(path.join(CONFIG_FILE), "durability = \"always\"\n")?;
                }
                Database::open(path).map_err(StoreError::backend)?
            }
        };
        let db = Strata::from_database(database).map_err(StoreError::backend)?;
        Ok(Self {
            db,
            idle: Mutex::new(Vec::new()),
        })
    }

    /// Run `f` on a pooled handle.
    fn with_handle<T>(&self, f: impl FnOnce(&Strata) -> StoreResult<T>) -> StoreResult<T> {
        let handle = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let handle = match handle {
            Some(h) => h,
            None => self.db.new_handle().map_err(StoreError::backend)?,
        };
        let result = f(&handle);
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
        result
    }
}

pub struct StrataStore {
    engine: RwLock<Option<Engine>>,
    path: Option<PathBuf>,
    durable: bool,
}

impl StrataStore {
    pub fn open(opts: &StoreOptions) -> StoreResult<Self> {
        let engine = Engine::open(opts.path.as_deref(), opts.durable)?;
        Ok(Self {
            engine: RwLock::new(Some(engine)),
            path: opts.path.clone(),
            durable: opts.durable,
        })
    }

    fn with_handle<T>(&self, f: impl FnOnce(&Strata) -> StoreResult<T>) -> StoreResult<T> {
        let engine = self.engine.read().unwrap_or_else(PoisonError::into_inner);
        engine.as_ref().ok_or(StoreError::Closed)?.with_handle(f)
    }
}

/// Lower-case hex encoding of a byte key.
pub fn encode_key(key: &[u8]) -> String {
    hex::encode(key)
}

/// Inverse of [`encode_key`].
pub fn decode_key(s: &str) -> StoreResult<Vec<u8>> {
    hex::decode(s).map_err(|e| StoreError::Corrupt(format!("key {s:?}: {e}")))
}

fn into_bytes(value: Value) -> StoreResult<Vec<u8>> {
    match value {
        Value::Bytes(b) => Ok(b),
        other => Err(StoreError::Corrupt(format!("expected bytes, found {other:?}"))),
    }
}

impl Store for StrataStore {
    fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let key = encode_key(key);
        self.with_handle(|h| {
            h.kv_put(&key, Value::Bytes(value.to_vec()))
                .map_err(StoreError::backend)?;
            Ok(())
        })
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let key = encode_key(key);
        self.with_handle(|h| match h.kv_get(&key).map_err(StoreError::backend)? {
            Some(v) => into_bytes(v).map(Some),
            None => Ok(None),
        })
    }

    fn del(&self, key: &[u8]) -> StoreResult<bool> {
        let key = encode_key(key);
        self.with_handle(|h| h.kv_delete(&key).map_err(StoreError::backend))
    }

    fn pset(&self, keys: &[Vec<u8>], values: &[Vec<u8>]) -> StoreResult<()> {
        check_batch(keys, values)?;
        self.with_handle(|h| {
            let mut session = h.session();
            session
                .execute(Command::TxnBegin {
                    branch: None,
                    options: None,
                })
                .map_err(StoreError::backend)?;
            for (k, v) in keys.iter().zip(values) {
                session
                    .execute(Command::KvPut {
                        branch: None,
                        key: encode_key(k),
                        value: Value::Bytes(v.clone()),
                    })
                    .map_err(StoreError::backend)?;
            }
            session
                .execute(Command::TxnCommit)
                .map_err(StoreError::backend)?;
            Ok(())
        })
    }

    fn keys(&self, prefix: &[u8], limit: usize, with_values: bool) -> StoreResult<KeyScan> {
        let prefix = encode_key(prefix);
        self.with_handle(|h| {
            let listed = h.kv_list(Some(prefix.as_str())).map_err(StoreError::backend)?;
            let mut scan = KeyScan::default();
            for name in listed {
                if !under_limit(scan.keys.len(), limit) {
                    break;
                }
                if with_values {
                    // Deleted between list and get: skip it.
                    match h.kv_get(&name).map_err(StoreError::backend)? {
                        Some(v) => scan.values.push(into_bytes(v)?),
                        None => continue,
                    }
                }
                scan.keys.push(decode_key(&name)?);
            }
            Ok(scan)
        })
    }

    fn flush_db(&self) -> StoreResult<()> {
        let mut engine = self.engine.write().unwrap_or_else(PoisonError::into_inner);
        if engine.take().is_none() {
            return Err(StoreError::Closed);
        }
        if let Some(path) = &self.path {
            if path.exists() {
                std::fs::remove_dir_all(path)?;
            }
        }
        *engine = Some(Engine::open(self.path.as_deref(), self.durable)?);
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        let mut engine = self.engine.write().unwrap_or_else(PoisonError::into_inner);
        match engine.take() {
            Some(e) if self.path.is_some() => e.db.flush().map(|_| ()).map_err(StoreError::backend),
            _ => Ok(()),
        }
    }
}
