//! Append-only record log behind the file-backed `map` and `btree` stores.
//!
//! Record layout: `tag:u8 | key_len:u32be | value_len:u32be | key | value`.
//! A torn record at the tail (crash mid-append) is dropped on open.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::StoreResult;

const TAG_PUT: u8 = 1;
const TAG_DEL: u8 = 2;
const HEADER_LEN: usize = 9;

/// One record read back during replay.
#[derive(Debug, PartialEq, Eq)]
pub enum Replayed {
    Put { key: Vec<u8>, value: Vec<u8> },
    Del { key: Vec<u8> },
}

pub struct Journal {
    file: File,
    /// Length of the file up to the last complete record.
    len: u64,
    durable: bool,
    pending: Vec<u8>,
}

impl Journal {
    /// Open (creating if needed) and replay the journal at `path`.
    pub fn open(path: &Path, durable: bool) -> io::Result<(Self, Vec<Replayed>)> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let (records, good_len) = replay(&file)?;
        if good_len < file.metadata()?.len() {
            file.set_len(good_len)?;
        }
        Ok((
            Self {
                file,
                len: good_len,
                durable,
                pending: Vec::new(),
            },
            records,
        ))
    }

    /// Bytes written so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> io::Result<()> {
        self.encode(TAG_PUT, key, value)?;
        self.append()
    }

    pub fn del(&mut self, key: &[u8]) -> io::Result<()> {
        self.encode(TAG_DEL, key, &[])?;
        self.append()
    }

    /// Append many puts in one write.
    pub fn put_batch(&mut self, keys: &[Vec<u8>], values: &[Vec<u8>]) -> io::Result<()> {
        for (k, v) in keys.iter().zip(values) {
            if let Err(e) = self.encode(TAG_PUT, k, v) {
                self.pending.clear();
                return Err(e);
            }
        }
        self.append()
    }

    /// Discard every record.
    pub fn truncate(&mut self) -> io::Result<()> {
        self.file.set_len(0)?;
        self.len = 0;
        if self.durable {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Sync written records to disk.
    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }

    fn encode(&mut self, tag: u8, key: &[u8], value: &[u8]) -> io::Result<()> {
        let key_len = u32::try_from(key.len()).map_err(|_| too_large("key"))?;
        let value_len = u32::try_from(value.len()).map_err(|_| too_large("value"))?;
        self.pending.push(tag);
        self.pending.extend_from_slice(&key_len.to_be_bytes());
        self.pending.extend_from_slice(&value_len.to_be_bytes());
        self.pending.extend_from_slice(key);
        self.pending.extend_from_slice(value);
        Ok(())
    }

    /// Write the encoded records. On failure the file is cut back to the
    /// last complete record, so later appends stay readable.
    fn append(&mut self) -> io::Result<()> {
        let written = self.file.write_all(&self.pending).and_then(|()| {
            if self.durable {
                self.file.sync_data()
            } else {
                Ok(())
            }
        });
        let appended = self.pending.len() as u64;
        self.pending.clear();
        match written {
            Ok(()) => {
                self.len += appended;
                Ok(())
            }
            Err(e) => {
                self.rollback()?;
                Err(e)
            }
        }
    }

    fn rollback(&mut self) -> io::Result<()> {
        self.file.set_len(self.len)
    }
}

/// A journal shared between threads; absent for in-memory stores.
#[derive(Default)]
pub struct SharedJournal(Option<Mutex<Journal>>);

impl SharedJournal {
    /// Open the journal at `path`, or an inert one when `path` is `None`.
    pub fn open(path: Option<&Path>, durable: bool) -> StoreResult<(Self, Vec<Replayed>)> {
        match path {
            Some(path) => {
                let (journal, records) = Journal::open(path, durable)?;
                Ok((Self(Some(Mutex::new(journal))), records))
            }
            None => Ok((Self(None), Vec::new())),
        }
    }

    /// Lock the journal, if any.
    fn lock(&self) -> Option<MutexGuard<'_, Journal>> {
        self.0
            .as_ref()
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        if let Some(mut j) = self.lock() {
            j.put(key, value)?;
        }
        Ok(())
    }

    pub fn del(&self, key: &[u8]) -> StoreResult<()> {
        if let Some(mut j) = self.lock() {
            j.del(key)?;
        }
        Ok(())
    }

    pub fn put_batch(&self, keys: &[Vec<u8>], values: &[Vec<u8>]) -> StoreResult<()> {
        if let Some(mut j) = self.lock() {
            j.put_batch(keys, values)?;
        }
        Ok(())
    }

    pub fn truncate(&self) -> StoreResult<()> {
        if let Some(mut j) = self.lock() {
            j.truncate()?;
        }
        Ok(())
    }

    pub fn sync(&self) -> StoreResult<()> {
        if let Some(mut j) = self.lock() {
            j.sync()?;
        }
        Ok(())
    }
}

fn too_large(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("{what} exceeds 4 GiB"))
}

/// Read every complete record; returns them with the length they span.
fn replay(file: &File) -> io::Result<(Vec<Replayed>, u64)> {
    let mut reader = BufReader::new(file.try_clone()?);
    reader.seek(SeekFrom::Start(0))?;
    let mut records = Vec::new();
    let mut pos = 0u64;
    loop {
        let mut header = [0u8; HEADER_LEN];
        if !read_full(&mut reader, &mut header)? {
            break;
        }
        let key_len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
        let value_len = u32::from_be_bytes([header[5], header[6], header[7], header[8]]) as usize;
        let mut key = vec![0u8; key_len];
        let mut value = vec![0u8; value_len];
        if !read_full(&mut reader, &mut key)? || !read_full(&mut reader, &mut value)? {
            break;
        }
        match header[0] {
            TAG_PUT => records.push(Replayed::Put { key, value }),
            TAG_DEL => records.push(Replayed::Del { key }),
            // Unknown tag: everything from here on is garbage.
            _ => break,
        }
        pos += (HEADER_LEN + key_len + value_len) as u64;
    }
    Ok((records, pos))
}

/// Fill `buf`; `false` when the input ends first.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal");
        {
            let (mut j, records) = Journal::open(&path, false).unwrap();
            assert!(records.is_empty());
            j.put(b"a", b"1").unwrap();
            j.put(b"b", b"22").unwrap();
            j.del(b"a").unwrap();
            j.sync().unwrap();
        }
        let (_, records) = Journal::open(&path, false).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(
            records[1],
            Replayed::Put {
                key: b"b".to_vec(),
                value: b"22".to_vec()
            }
        );
        assert_eq!(records[2], Replayed::Del { key: b"a".to_vec() });
    }

    #[test]
    fn torn_tail_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("j");
        {
            let (mut j, _) = Journal::open(&path, false).unwrap();
            j.put(b"ok", b"value").unwrap();
            j.sync().unwrap();
        }
        let good = std::fs::metadata(&path).unwrap().len();
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[TAG_PUT, 0, 0, 0, 9, 0, 0]).unwrap();
        }
        let (j, records) = Journal::open(&path, false).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(j.len(), good);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good);
    }

    #[test]
    fn rollback_drops_partial_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("j");
        let (mut j, _) = Journal::open(&path, false).unwrap();
        j.put(b"a", b"1").unwrap();
        // Half a record, as left behind by a write that failed midway.
        j.file.write_all(&[TAG_PUT, 0, 0, 0, 1]).unwrap();
        j.rollback().unwrap();
        j.put(b"b", b"2").unwrap();
        drop(j);

        let (_, records) = Journal::open(&path, false).unwrap();
        assert_eq!(
            records,
            vec![
                Replayed::Put {
                    key: b"a".to_vec(),
                    value: b"1".to_vec()
                },
                Replayed::Put {
                    key: b"b".to_vec(),
                    value: b"2".to_vec()
                },
            ]
        );
    }

    #[test]
    fn batch_is_one_append() {
        let dir = tempfile::tempdir().unwrap();
        let (mut j, _) = Journal::open(&dir.path().join("j"), false).unwrap();
        j.put_batch(&[b"a".to_vec(), b"bb".to_vec()], &[b"1".to_vec(), b"22".to_vec()])
            .unwrap();
        assert_eq!(j.len(), (2 * HEADER_LEN + 1 + 1 + 2 + 2) as u64);
    }

    #[test]
    fn truncate_empties() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("j");
        let (mut j, _) = Journal::open(&path, false).unwrap();
        j.put_batch(&[b"a".to_vec(), b"b".to_vec()], &[b"1".to_vec(), b"2".to_vec()])
            .unwrap();
        assert!(!j.is_empty());
        j.truncate().unwrap();
        assert!(j.is_empty());
        drop(j);
        let (_, records) = Journal::open(&path, false).unwrap();
        assert!(records.is_empty());
    }
}
