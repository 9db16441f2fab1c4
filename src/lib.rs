//! kvbench: throughput benchmarks for embedded key-value stores.
//!
//! A run opens one backend through the [`store::Store`] trait and drives it
//! through a fixed sequence of phases:
//!
//! 1. bulk load (count-bounded, one `pset` per page of 1000)
//! 2. process memory and on-disk footprint samples
//! 3. prefix scan (`-1` when the backend cannot scan)
//! 4. point set, point get, mixed get/set, delete (time-bounded)
//!
//! Timed phases run a pool of worker threads, each walking its own stride
//! of the logical key space so no two workers touch the same index. Every
//! phase appends its columns to one [`record::Record`], which is finally
//! appended to a CSV ledger.
//!
//! ```no_run
//! use kvbench::config::RunConfig;
//!
//! let config = RunConfig {
//!     backend: "btree/memory".parse()?,
//!     ..RunConfig::default()
//! };
//! let record = kvbench::runner::run(&config)?;
//! println!("{:?}", record.get(kvbench::record::SET_RATE));
//! # Ok::<(), kvbench::error::BenchError>(())
//! ```

pub mod config;
pub mod error;
pub mod harness;
pub mod keygen;
pub mod record;
pub mod runner;
pub mod store;
pub mod workload;

pub use config::RunConfig;
pub use error::{BenchError, StoreError};
pub use record::{Ledger, Record};
pub use store::{BackendRegistry, Store};
