//! Error types for storage adapters and benchmark runs.

use thiserror::Error;

/// Errors a storage adapter may return.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The adapter does not implement this operation.
    #[error("operation not supported")]
    NotSupported,

    /// An in-memory variant was requested of a backend that needs a path.
    #[error("in-memory mode not allowed for this backend")]
    MemoryNotAllowed,

    /// No constructor registered under this name.
    #[error("unknown store type: {0}")]
    UnknownBackend(String),

    /// A batched write was handed keys and values of different lengths.
    #[error("batch has {keys} keys but {values} values")]
    BatchMismatch { keys: usize, values: usize },

    /// The store was used after `close`.
    #[error("store is closed")]
    Closed,

    /// On-disk data could not be decoded.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by the underlying engine.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Wrap an engine error that only offers `Display`.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        StoreError::Backend(err.to_string())
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, StoreError::NotSupported)
    }
}

/// Errors that terminate a benchmark run.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Invalid run configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The backend could not be constructed.
    #[error("failed to open store: {0}")]
    Open(#[source] StoreError),

    /// A batched write failed during the bulk-load phase.
    #[error("bulk load failed: {0}")]
    BulkLoad(#[source] StoreError),

    /// Closing the backend failed after all phases ran.
    #[error("failed to close store: {0}")]
    Close(#[source] StoreError),

    /// The ledger could not be written.
    #[error("ledger error: {0}")]
    Ledger(#[from] csv::Error),

    /// IO error outside the store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker thread panicked before reporting its counters.
    #[error("{0} worker panicked")]
    WorkerPanicked(&'static str),
}

pub type StoreResult<T> = Result<T, StoreError>;
