//! One complete benchmark run: open the backend, run every phase in order,
//! close the backend, persist the record.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::error::BenchError;
use crate::harness::metrics::{disk_usage_mib, sample_memory};
use crate::record::{self, Ledger, Record};
use crate::store::{BackendRegistry, Store, StoreOptions};
use crate::workload::Workload;

/// Where a disk-backed store lives for the run.
enum DataDir {
    Temp(TempDir),
    Given(PathBuf),
}

impl DataDir {
    fn path(&self) -> &Path {
        match self {
            DataDir::Temp(dir) => dir.path(),
            DataDir::Given(path) => path.as_path(),
        }
    }
}

/// Run every phase against the backend `config` selects from the built-in
/// adapters.
pub fn run(config: &RunConfig) -> Result<Record, BenchError> {
    run_with(&BackendRegistry::builtin(), config)
}

/// Run every phase against a backend from `registry`.
///
/// The store is closed exactly once whether or not the phases succeed. A
/// failed run returns its error and writes nothing to the ledger.
pub fn run_with(registry: &BackendRegistry, config: &RunConfig) -> Result<Record, BenchError> {
    config.validate()?;

    let backend = &config.backend;
    let data_dir = if backend.memory {
        None
    } else {
        Some(match &config.data_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                DataDir::Given(dir.clone())
            }
            None => DataDir::Temp(tempfile::Builder::new().prefix("kvbench-").tempdir()?),
        })
    };
    let store_path = data_dir
        .as_ref()
        .map(|dir| dir.path().join(format!("{}.db", backend.name)));
    let opts = StoreOptions {
        path: store_path.clone(),
        durable: config.durability.is_durable(),
    };

    let store: Arc<dyn Store> = registry
        .open(&backend.name, &opts)
        .map_err(BenchError::Open)?
        .into();
    debug!(store = %backend, path = ?store_path, durable = opts.durable, "opened store");

    let mut record = Record::new(config.run_name());
    let workload = Workload::new(Arc::clone(&store), config);
    let outcome = run_phases(&workload, &mut record, config, store_path.as_deref());
    let closed = store.close();
    drop(workload);
    drop(store);

    if let (Some(path), Some(DataDir::Given(_))) = (&store_path, &data_dir) {
        remove_store(path);
    }

    outcome?;
    closed.map_err(BenchError::Close)?;

    if let Some(path) = &config.ledger {
        Ledger::new(path).append(&record)?;
        info!(ledger = %path.display(), "saved record");
    }
    Ok(record)
}

/// Run the phases in their fixed order, each appending its columns.
fn run_phases(
    workload: &Workload,
    record: &mut Record,
    config: &RunConfig,
    store_path: Option<&Path>,
) -> Result<(), BenchError> {
    let name = record.name().to_string();

    workload.bulk_load(record, config.bulk_load_count)?;

    let mem = sample_memory();
    info!(
        "{} resident = {} MiB\theap in use = {} MiB",
        name, mem.resident_mib, mem.heap_mib
    );
    record.push(record::MEM_USAGE, mem.resident_mib as i64);
    record.push(record::HEAP_IN_USE, mem.heap_mib as i64);

    let disk_mib = match store_path {
        None => 0,
        Some(path) => match disk_usage_mib(path) {
            Ok(mib) => mib,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not measure disk usage");
                0
            }
        },
    };
    info!("{} disk usage: {} MiB", name, disk_mib);
    record.push(record::DISK_USAGE, disk_mib as i64);

    workload.prefix_scan(record)?;
    workload.point_set(record)?;
    workload.point_get(record)?;
    workload.mixed(record)?;
    workload.delete(record)?;
    Ok(())
}

fn remove_store(path: &Path) {
    let removed = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match removed {
        Ok(()) => debug!(path = %path.display(), "removed store data"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove store data"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendSelector;
    use std::time::Duration;

    fn quick(backend: &str) -> RunConfig {
        RunConfig {
            phase_duration: Duration::from_millis(20),
            workers: 2,
            bulk_load_count: 1_500,
            payload_size: 32,
            backend: backend.parse().unwrap(),
            ..RunConfig::default()
        }
    }

    #[test]
    fn full_record_for_memory_store() {
        let record = run(&quick("btree/memory")).unwrap();
        assert_eq!(record.name(), "btree/memory/nofsync");
        let headers: Vec<&str> = record.headers().iter().map(String::as_str).collect();
        assert_eq!(headers, record::COLUMNS.to_vec());
        assert_eq!(record.get(record::DISK_USAGE), Some(0));
    }

    #[test]
    fn unknown_backend_fails_to_open() {
        let cfg = RunConfig {
            backend: BackendSelector::new("nope"),
            ..quick("map")
        };
        assert!(matches!(run(&cfg), Err(BenchError::Open(_))));
    }

    #[cfg(feature = "rocksdb")]
    #[test]
    fn memory_not_allowed_is_fatal() {
        let err = run(&quick("rocksdb/memory")).unwrap_err();
        assert!(matches!(
            err,
            BenchError::Open(crate::error::StoreError::MemoryNotAllowed)
        ));
    }

    #[test]
    fn given_data_dir_is_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RunConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..quick("btree")
        };
        let record = run(&cfg).unwrap();
        assert_eq!(record.len(), record::COLUMNS.len());
        assert!(record.get(record::DISK_USAGE).is_some());
        assert!(!dir.path().join("btree.db").exists());
    }
}
