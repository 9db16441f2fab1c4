//! Command-line interface for kvbench
//!
//! # Usage Examples
//!
//! ```bash
//! # 10 seconds per phase against the in-memory btree store, 8 workers
//! kvbench -s btree/memory -c 8
//!
//! # Durable writes to RocksDB, appending the result to a ledger
//! kvbench -s rocksdb --fsync -d 5s --save results.csv
//!
//! # Settings from a file, overridden on the command line
//! kvbench --config bench.json --size 1024 --json
//! ```
//!
//! Set `RUST_LOG=debug` to see phase transitions.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use kvbench::config::{format_duration, parse_duration, BackendSelector, Durability, RunConfig};
use kvbench::runner;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kvbench")]
#[command(about = "Throughput benchmarks for embedded key-value stores")]
#[command(long_about = None)]
struct Cli {
    /// Time bound for each timed phase (e.g. "10s", "500ms", "2m")
    #[arg(short = 'd', long, value_parser = parse_duration_arg)]
    duration: Option<Duration>,

    /// Worker threads per phase [default: available parallelism]
    #[arg(short = 'c', long)]
    concurrency: Option<usize>,

    /// Entries written by the bulk-load phase [default: 4000000]
    #[arg(long = "set")]
    bulk_load_count: Option<usize>,

    /// Value size in bytes [default: 256]
    #[arg(long)]
    size: Option<usize>,

    /// Synchronously persist every acknowledged write
    #[arg(long)]
    fsync: bool,

    /// Store to benchmark; append "/memory" for the in-memory variant
    #[arg(short = 's', long = "store", value_name = "STORE")]
    store: Option<BackendSelector>,

    /// Ledger CSV to append the run's record to
    #[arg(long = "save", value_name = "PATH", env = "KVBENCH_LEDGER")]
    ledger: Option<PathBuf>,

    /// Directory for on-disk stores [default: a temporary directory]
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Seed for key and value generation [default: 123]
    #[arg(long)]
    seed: Option<u64>,

    /// JSON file with run settings; flags given here override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the finished record as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

impl Cli {
    /// File settings (or defaults) with command-line overrides applied.
    fn into_config(self) -> anyhow::Result<(RunConfig, bool)> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_json_file(path)
                .with_context(|| format!("Failed to load settings from {path:?}"))?,
            None => RunConfig::default(),
        };
        if let Some(d) = self.duration {
            config.phase_duration = d;
        }
        if let Some(c) = self.concurrency {
            config.workers = c;
        }
        if let Some(n) = self.bulk_load_count {
            config.bulk_load_count = n;
        }
        if let Some(size) = self.size {
            config.payload_size = size;
        }
        if self.fsync {
            config.durability = Durability::Durable;
        }
        if let Some(store) = self.store {
            config.backend = store;
        }
        if self.ledger.is_some() {
            config.ledger = self.ledger;
        }
        if self.data_dir.is_some() {
            config.data_dir = self.data_dir;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        Ok((config, self.json))
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (config, json) = Cli::parse().into_config()?;
    info!(
        "duration={}, c={} size={} store={}",
        format_duration(config.phase_duration),
        config.workers,
        config.payload_size,
        config.backend
    );

    let record = runner::run(&config).with_context(|| format!("{} run failed", config.run_name()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    }
    Ok(())
}
