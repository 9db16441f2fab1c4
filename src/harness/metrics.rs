//! Memory and disk footprint of a run.
//!
//! Memory comes from /proc/self/status and reads as zero off Linux.

use std::io;
use std::path::Path;

use super::MIB;

/// Process memory, in MiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemorySample {
    /// Resident set size (`VmRSS`).
    pub resident_mib: u64,
    /// Anonymous resident memory (`RssAnon`), the closest /proc analogue to
    /// heap in use.
    pub heap_mib: u64,
}

/// Sample the process's current memory use.
pub fn sample_memory() -> MemorySample {
    #[cfg(target_os = "linux")]
    {
        match std::fs::read_to_string("/proc/self/status") {
            Ok(status) => parse_memory(&status),
            Err(_) => MemorySample::default(),
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        MemorySample::default()
    }
}

fn parse_memory(status: &str) -> MemorySample {
    MemorySample {
        resident_mib: kib_field(status, "VmRSS:").unwrap_or(0) / 1024,
        heap_mib: kib_field(status, "RssAnon:").unwrap_or(0) / 1024,
    }
}

/// Bytes used on disk by `path`: the file size, or the sum over every file
/// beneath a directory.
pub fn disk_usage(path: &Path) -> io::Result<u64> {
    let meta = std::fs::symlink_metadata(path)?;
    if !meta.is_dir() {
        return Ok(meta.len());
    }
    let mut total = 0;
    for entry in std::fs::read_dir(path)? {
        total += disk_usage(&entry?.path())?;
    }
    Ok(total)
}

/// [`disk_usage`] in whole MiB.
pub fn disk_usage_mib(path: &Path) -> io::Result<u64> {
    disk_usage(path).map(|bytes| bytes / MIB)
}

/// The number on a `Name:   1234 kB` line.
fn kib_field(status: &str, field: &str) -> Option<u64> {
    status.lines().find_map(|line| {
        line.strip_prefix(field)?
            .split_whitespace()
            .next()?
            .parse()
            .ok()
    })
}
