//! Run configuration.
//!
//! A [`RunConfig`] is built once at startup (defaults, then an optional JSON
//! file, then command-line overrides) and handed to the runner by reference.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BenchError;

/// Default time bound for each timed phase.
pub const DEFAULT_PHASE_DURATION: Duration = Duration::from_secs(10);

/// Default number of entries written by the bulk-load phase.
pub const DEFAULT_BULK_LOAD_COUNT: usize = 4_000_000;

/// Default value payload size in bytes.
pub const DEFAULT_PAYLOAD_SIZE: usize = 256;

/// Default seed for the per-worker random generators.
pub const DEFAULT_SEED: u64 = 123;

/// Suffix on a backend name that requests its in-memory variant.
pub const MEMORY_SUFFIX: &str = "/memory";

// =============================================================================
// Durability
// =============================================================================

/// Whether writes must reach stable storage before being acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Durability {
    #[default]
    #[serde(rename = "nofsync")]
    Buffered,
    #[serde(rename = "fsync")]
    Durable,
}

impl Durability {
    pub const ALL: [Self; 2] = [Self::Buffered, Self::Durable];

    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Durable)
    }

    /// Label used in run names.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Buffered => "nofsync",
            Self::Durable => "fsync",
        }
    }
}

impl fmt::Display for Durability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Backend selector
// =============================================================================

/// Which adapter to open, and whether in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BackendSelector {
    pub name: String,
    pub memory: bool,
}

impl BackendSelector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            memory: false,
        }
    }

    pub fn in_memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            memory: true,
        }
    }
}

impl Default for BackendSelector {
    fn default() -> Self {
        Self::new("map")
    }
}

impl FromStr for BackendSelector {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, memory) = match s.strip_suffix(MEMORY_SUFFIX) {
            Some(name) => (name, true),
            None => (s, false),
        };
        if name.is_empty() {
            return Err(BenchError::Config(format!("empty store type in {s:?}")));
        }
        Ok(Self {
            name: name.to_string(),
            memory,
        })
    }
}

impl TryFrom<String> for BackendSelector {
    type Error = BenchError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<BackendSelector> for String {
    fn from(sel: BackendSelector) -> String {
        sel.to_string()
    }
}

impl fmt::Display for BackendSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.memory {
            f.write_str(MEMORY_SUFFIX)?;
        }
        Ok(())
    }
}

// =============================================================================
// Duration strings
// =============================================================================

/// Parse a duration like "10s", "500ms", "2m", "1h", or a plain number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration, BenchError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(BenchError::Config("empty duration string".into()));
    }
    let invalid = || BenchError::Config(format!("invalid duration: {s}"));
    let (num, scale_ms) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3_600_000)
    } else {
        (s, 1_000)
    };
    let n: u64 = num.trim().parse().map_err(|_| invalid())?;
    n.checked_mul(scale_ms)
        .map(Duration::from_millis)
        .ok_or_else(invalid)
}

/// Render a duration the way `parse_duration` reads it.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms % 1_000 == 0 {
        format!("{}s", ms / 1_000)
    } else {
        format!("{}ms", ms)
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(d)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// RunConfig
// =============================================================================

/// Immutable settings for one benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Time bound for each timed phase.
    #[serde(with = "duration_str")]
    pub phase_duration: Duration,
    /// Worker threads per timed phase.
    pub workers: usize,
    /// Entries written by the bulk-load phase.
    pub bulk_load_count: usize,
    /// Bytes per value.
    pub payload_size: usize,
    pub durability: Durability,
    pub backend: BackendSelector,
    /// Ledger to append the run's record to; `None` skips persistence.
    pub ledger: Option<PathBuf>,
    /// Parent directory for on-disk stores; `None` uses a temporary directory.
    pub data_dir: Option<PathBuf>,
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            phase_duration: DEFAULT_PHASE_DURATION,
            workers: default_workers(),
            bulk_load_count: DEFAULT_BULK_LOAD_COUNT,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            durability: Durability::default(),
            backend: BackendSelector::default(),
            ledger: None,
            data_dir: None,
            seed: DEFAULT_SEED,
        }
    }
}

/// Available hardware parallelism, or 1 when it cannot be determined.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl RunConfig {
    /// Load from a JSON file; absent fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, BenchError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| BenchError::Config(format!("{}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<(), BenchError> {
        if self.workers == 0 {
            return Err(BenchError::Config("worker count must be at least 1".into()));
        }
        if self.payload_size == 0 {
            return Err(BenchError::Config("payload size must be at least 1".into()));
        }
        if self.phase_duration.is_zero() {
            return Err(BenchError::Config("phase duration must be non-zero".into()));
        }
        Ok(())
    }

    /// Backend, memory mode and durability, e.g. `btree/memory/nofsync`.
    pub fn run_name(&self) -> String {
        format!("{}/{}", self.backend, self.durability.label())
    }
}
