//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{FlatError, Result};

use super::{WalEntry, HEADER_SIZE};

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,

    /// Byte offset just past the last entry returned
    position: u64,

    /// Set when the file ended in the middle of an entry
    torn_tail: bool,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            torn_tail: false,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// `Ok(None)` at a clean end of file. A partial or corrupt entry is a
    /// `WalCorruption` error.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        let mut header = [0u8; HEADER_SIZE];
        let got = read_up_to(&mut self.reader, &mut header)?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_SIZE {
            self.torn_tail = true;
            return Err(FlatError::WalCorruption(format!(
                "partial header at offset {}",
                self.position
            )));
        }

        let (_, _, len) = WalEntry::parse_header(&header)?;
        let mut bytes = vec![0u8; HEADER_SIZE + len];
        bytes[..HEADER_SIZE].copy_from_slice(&header);
        let got = read_up_to(&mut self.reader, &mut bytes[HEADER_SIZE..])?;
        if got < len {
            self.torn_tail = true;
            return Err(FlatError::WalCorruption(format!(
                "partial entry at offset {}: {} of {} payload bytes",
                self.position, got, len
            )));
        }

        let entry = WalEntry::deserialize(&bytes)?;
        self.position += bytes.len() as u64;
        Ok(Some(entry))
    }

    /// Offset just past the last valid entry read so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether reading stopped on an incomplete (torn) write
    pub fn hit_torn_tail(&self) -> bool {
        self.torn_tail
    }

    /// Iterate over entries until the end or the first error
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Fill `buf` as far as the file allows, returning the number of bytes read
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Iterator over WAL entries; yields at most one error, then stops
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
