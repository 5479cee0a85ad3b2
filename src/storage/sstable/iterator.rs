//! SSTable Iterator
//!
//! Sequential iteration over the data block of an SSTable.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

use parking_lot::MutexGuard;

use crate::error::{FlatError, Result};

use super::{le_u32, SSTableRecord, TOMBSTONE_MARKER};

/// Iterator over table records in key order
///
/// Holds the reader's file lock for its whole lifetime, so point lookups on
/// the same table wait until it is dropped.
pub struct SSTableIterator<'a> {
    file: MutexGuard<'a, BufReader<File>>,
    /// Start of the index block
    end_offset: u64,
    current_offset: u64,
    failed: bool,
}

impl<'a> SSTableIterator<'a> {
    pub(super) fn new(
        mut file: MutexGuard<'a, BufReader<File>>,
        start_offset: u64,
        end_offset: u64,
    ) -> Result<Self> {
        file.seek(SeekFrom::Start(start_offset))?;
        Ok(Self {
            file,
            end_offset,
            current_offset: start_offset,
            failed: false,
        })
    }

    fn read_record(&mut self) -> Result<SSTableRecord> {
        let mut header = [0u8; 8];
        self.file.read_exact(&mut header)?;
        let key_len = le_u32(&header[0..4]) as usize;
        let value_len = le_u32(&header[4..8]);

        let mut consumed = 8 + key_len as u64;
        if value_len != TOMBSTONE_MARKER {
            consumed += value_len as u64;
        }
        if self.current_offset + consumed > self.end_offset {
            return Err(FlatError::Storage(format!(
                "SSTable record at offset {} overruns data block",
                self.current_offset
            )));
        }

        let mut key = vec![0u8; key_len];
        self.file.read_exact(&mut key)?;

        let value = if value_len == TOMBSTONE_MARKER {
            None
        } else {
            let mut v = vec![0u8; value_len as usize];
            self.file.read_exact(&mut v)?;
            Some(v)
        };

        self.current_offset += consumed;
        Ok((key, value))
    }
}

impl Iterator for SSTableIterator<'_> {
    type Item = Result<SSTableRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.current_offset >= self.end_offset {
            return None;
        }
        let record = self.read_record();
        if record.is_err() {
            self.failed = true;
        }
        Some(record)
    }
}
