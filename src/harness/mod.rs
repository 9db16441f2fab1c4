//! Shared benchmark harness: the worker-pool phase runner, the throughput
//! aggregator and the memory and disk samplers every phase reports through.

pub mod metrics;
pub mod phase;
pub mod throughput;

/// Keys and values per `pset` call in the bulk-load phase.
pub const BULK_PAGE_SIZE: usize = 1000;

/// Bytes per MiB, for the record's memory and disk columns.
pub const MIB: u64 = 1024 * 1024;
