//! Key generation.
//!
//! A key is one printable leading byte followed by the big-endian logical
//! index. The leading byte spreads keys across the keyspace of ordered
//! backends; uniqueness comes from the 8-byte index alone.

use rand::Rng;

/// Total key length in bytes.
pub const KEY_LEN: usize = 9;

/// Length of the prefix used by the prefix-scan phase.
pub const PREFIX_LEN: usize = 3;

/// Lowest printable ASCII byte.
const PRINTABLE_LO: u8 = 32;
/// One past the highest printable ASCII byte.
const PRINTABLE_HI: u8 = 127;

/// Build the key for logical index `index` with leading byte `lead`.
#[inline]
pub fn key(index: u64, lead: u8) -> [u8; KEY_LEN] {
    let mut k = [0u8; KEY_LEN];
    k[0] = lead;
    k[1..].copy_from_slice(&index.to_be_bytes());
    k
}

/// Draw a printable leading byte.
#[inline]
pub fn printable_byte<R: Rng>(rng: &mut R) -> u8 {
    rng.random_range(PRINTABLE_LO..PRINTABLE_HI)
}

/// Key for `index` with a random printable leading byte.
#[inline]
pub fn random_key<R: Rng>(rng: &mut R, index: u64) -> [u8; KEY_LEN] {
    key(index, printable_byte(rng))
}

/// The first `len` bytes of `key(index, lead)`.
///
/// The index is big-endian, so a short prefix holds only its high-order
/// bytes. Those are zero below 2^48: a [`PREFIX_LEN`] prefix is
/// `[lead, 0, 0]` in practice, and scans differ only by their lead byte.
pub fn key_prefix(index: u64, lead: u8, len: usize) -> Vec<u8> {
    key(index, lead)[..len.min(KEY_LEN)].to_vec()
}

/// Fill `buf` with random bytes, forcing the first one printable.
///
/// Bulk-load keys are random through all nine bytes; they do not carry
/// a logical index.
pub fn fill_random_key<R: Rng>(rng: &mut R, buf: &mut [u8]) {
    rng.fill(&mut *buf);
    if let Some(first) = buf.first_mut() {
        *first = printable_byte(rng);
    }
}

/// A worker's private walk through the logical index space.
///
/// Worker `w` of `c` visits `w, w + c, w + 2c, ...`, so no two workers of the
/// same phase ever target the same index.
#[derive(Debug, Clone)]
pub struct Stride {
    start: u64,
    step: u64,
    current: u64,
}

impl Stride {
    pub fn new(worker: usize, workers: usize) -> Self {
        let start = worker as u64;
        Self {
            start,
            step: workers.max(1) as u64,
            current: start,
        }
    }

    /// The index the next operation targets.
    #[inline]
    pub fn current(&self) -> u64 {
        self.current
    }

    #[inline]
    pub fn advance(&mut self) {
        self.current = self.current.wrapping_add(self.step);
    }

    /// Rewind to the worker's starting index.
    #[inline]
    pub fn reset(&mut self) {
        self.current = self.start;
    }
}

impl Iterator for Stride {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let i = self.current;
        self.advance();
        Some(i)
    }
}
