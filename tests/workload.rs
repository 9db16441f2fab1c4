//! Phase behaviour observed through an instrumented store.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use common::{index_of, quick_config, CountingStore};
use kvbench::error::BenchError;
use kvbench::harness::throughput::{Throughput, SENTINEL};
use kvbench::record::{self, Record};
use kvbench::store::Store;
use kvbench::workload::{bulk_load, Workload};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn workload(store: &Arc<CountingStore>, workers: usize) -> Workload {
    Workload::new(store.clone(), &quick_config("counting", workers))
}

// =============================================================================
// Bulk load
// =============================================================================

#[test]
fn bulk_load_issues_one_pset_per_page() {
    let store = CountingStore::new();
    let mut rng = StdRng::seed_from_u64(123);
    let r = bulk_load(&store, 4_000, 64, &mut rng).unwrap();
    assert_eq!(r.inserted, 4_000);
    assert_eq!(r.batches, 4);
    assert_eq!(*store.psets.lock().unwrap(), vec![(1000, 1000); 4]);
}

#[test]
fn bulk_load_final_page_is_partial() {
    let store = CountingStore::new();
    let mut rng = StdRng::seed_from_u64(123);
    bulk_load(&store, 1_234, 8, &mut rng).unwrap();
    assert_eq!(*store.psets.lock().unwrap(), vec![(1000, 1000), (234, 234)]);
}

#[test]
fn bulk_load_stops_at_first_failure() {
    let store = Arc::new(CountingStore::new().failing_pset());
    let mut record = Record::new("failing");
    let err = workload(&store, 1).bulk_load(&mut record, 5_000).unwrap_err();
    assert!(matches!(err, BenchError::BulkLoad(_)));
    assert_eq!(store.psets.lock().unwrap().len(), 1);
    assert!(record.is_empty());
}

// =============================================================================
// Timed phases
// =============================================================================

#[test]
fn set_rate_matches_observed_calls() {
    let store = Arc::new(CountingStore::new());
    let mut cfg = quick_config("counting", 4);
    cfg.phase_duration = Duration::from_secs(1);
    let w = Workload::new(store.clone(), &cfg);
    let mut record = Record::new("counting");
    let result = w.point_set(&mut record).unwrap();

    let observed = CountingStore::count(&store.sets);
    assert_eq!(result.per_worker.len(), 4);
    assert_eq!(result.total_ops(), observed);
    let expected = observed as u128 * 1_000_000 / result.elapsed.as_micros();
    assert_eq!(record.get(record::SET_RATE), Some(expected as i64));
    assert_eq!(
        record.get(record::SET_RATE),
        Some(Throughput::from(&result).ops_per_sec())
    );
}

#[test]
fn workers_write_disjoint_strides() {
    let store = Arc::new(CountingStore::new());
    let w = workload(&store, 3);
    let mut record = Record::new("counting");
    let result = w.point_set(&mut record).unwrap();

    let scan = store.keys(b"", 0, false).unwrap();
    let indices: BTreeSet<u64> = scan.keys.iter().map(|k| index_of(k)).collect();
    // Each index is written once, whatever its random lead byte.
    assert_eq!(indices.len() as u64, result.total_ops());
    assert_eq!(scan.keys.len() as u64, result.total_ops());
}

#[test]
fn get_rewinds_stride_on_miss() {
    let store = Arc::new(CountingStore::new().always_miss());
    let w = workload(&store, 4);
    let mut record = Record::new("counting");
    let result = w.point_get(&mut record).unwrap();

    assert_eq!(result.total_ops(), result.total_misses());
    assert_eq!(result.total_ops(), CountingStore::count(&store.gets));
    // After a miss a worker restarts from its own first index.
    assert!(store.get_indices.lock().unwrap().iter().all(|&i| i < 8));
}

#[test]
fn delete_of_absent_keys_is_not_a_failure() {
    let store = Arc::new(CountingStore::new());
    let w = workload(&store, 2);
    let mut record = Record::new("counting");
    let result = w.delete(&mut record).unwrap();
    assert_eq!(result.total_misses(), 0);
    assert_eq!(result.total_ops(), CountingStore::count(&store.dels));
    assert!(record.get(record::DEL_RATE).unwrap() > 0);
}

#[test]
fn unsupported_scan_skips_workers() {
    let store = Arc::new(CountingStore::new().without_scan());
    let w = workload(&store, 4);
    let mut record = Record::new("counting");
    assert!(w.prefix_scan(&mut record).unwrap().is_none());
    assert_eq!(CountingStore::count(&store.scans), 1);
    assert_eq!(record.get(record::KEYS_RATE), Some(SENTINEL));
}

#[test]
fn mixed_writer_count_never_exceeds_distinct_writes() {
    let store = Arc::new(CountingStore::new());
    let w = workload(&store, 2);
    let mut record = Record::new("counting");
    let r = w.mixed(&mut record).unwrap();

    let indices: BTreeSet<u64> = store
        .keys(b"", 0, false)
        .unwrap()
        .keys
        .iter()
        .map(|k| index_of(k))
        .collect();
    assert!(r.writes > 0);
    assert!(r.writes <= indices.len() as u64);
    // Sequential from zero, never restarted.
    assert_eq!(indices.iter().copied().max(), Some(indices.len() as u64 - 1));
    assert_eq!(CountingStore::count(&store.gets), r.readers.total_ops());
    assert_eq!(
        record.headers(),
        &[record::MIXED_SET_RATE.to_string(), record::MIXED_GET_RATE.to_string()]
    );
}
