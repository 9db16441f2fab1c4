//! A run's metric columns and the CSV ledger they are appended to.

use std::fs::OpenOptions;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use csv::Writer;
use serde::Serialize;
use tracing::debug;

use crate::error::BenchError;

// =============================================================================
// Column names
// =============================================================================

pub const NAME: &str = "name";
pub const BULK_LOAD_SECS: &str = "batch write cost(s)";
pub const MEM_USAGE: &str = "MemUsage(MiB)";
pub const HEAP_IN_USE: &str = "HeapInuse(MiB)";
pub const DISK_USAGE: &str = "DiskUsage(MiB)";
pub const KEYS_RATE: &str = "Keys op/s";
pub const SET_RATE: &str = "Set op/s";
pub const GET_RATE: &str = "Get op/s";
pub const MIXED_SET_RATE: &str = "Setmixed op/s";
pub const MIXED_GET_RATE: &str = "Getmixed op/s";
pub const DEL_RATE: &str = "Del op/s";

/// Every metric column of a full run, in the order phases append them.
pub const COLUMNS: [&str; 10] = [
    BULK_LOAD_SECS,
    MEM_USAGE,
    HEAP_IN_USE,
    DISK_USAGE,
    KEYS_RATE,
    SET_RATE,
    GET_RATE,
    MIXED_SET_RATE,
    MIXED_GET_RATE,
    DEL_RATE,
];

// =============================================================================
// Record
// =============================================================================

/// Metric columns of one run, in the order phases produced them.
///
/// Headers and values only grow together, so they always have the same
/// length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    name: String,
    headers: Vec<String>,
    values: Vec<i64>,
}

impl Record {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            headers: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Append one column.
    pub fn push(&mut self, header: impl Into<String>, value: i64) {
        self.headers.push(header.into());
        self.values.push(value);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of the first column named `header`.
    pub fn get(&self, header: &str) -> Option<i64> {
        self.headers
            .iter()
            .position(|h| h == header)
            .map(|i| self.values[i])
    }

    /// Pairs of header and value, in order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, i64)> {
        self.headers
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    fn header_row(&self) -> Vec<&str> {
        std::iter::once(NAME)
            .chain(self.headers.iter().map(String::as_str))
            .collect()
    }

    fn value_row(&self) -> Vec<String> {
        std::iter::once(self.name.clone())
            .chain(self.values.iter().map(i64::to_string))
            .collect()
    }
}

// =============================================================================
// Ledger
// =============================================================================

/// An append-only CSV file of run records.
///
/// The header row is written only when the file is created. Rows appended
/// later are assumed to share that column order. There is no locking
/// between processes.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `record` as one row.
    pub fn append(&self, record: &Record) -> Result<(), BenchError> {
        let fresh = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = Writer::from_writer(BufWriter::new(file));
        if fresh {
            writer.write_record(record.header_row())?;
        }
        writer.write_record(record.value_row())?;
        writer.flush()?;
        debug!(ledger = %self.path.display(), fresh, run = record.name(), "appended record");
        Ok(())
    }
}
