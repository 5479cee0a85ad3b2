//! SSTable Builder
//!
//! Writes sorted key-value entries to a new SSTable file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{FlatError, Result};

use super::{SSTableMeta, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION};

/// Streams sorted records into a new table file
pub struct SSTableBuilder {
    path: PathBuf,
    writer: BufWriter<File>,
    entry_count: u64,
    /// Offset the next record will be written at
    offset: u64,
    index: Vec<(Vec<u8>, u64)>,
    last_key: Option<Vec<u8>>,
    data_crc: crc32fast::Hasher,
}

impl SSTableBuilder {
    /// Create the file and write a header; the entry count is patched in by
    /// [`finish`](Self::finish).
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&0u64.to_le_bytes())?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            entry_count: 0,
            offset: HEADER_SIZE,
            index: Vec::new(),
            last_key: None,
            data_crc: crc32fast::Hasher::new(),
        })
    }

    /// Add a live record. Keys must arrive in strictly ascending order.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.append(key, Some(value))
    }

    /// Add a tombstone. Keys must arrive in strictly ascending order.
    pub fn add_tombstone(&mut self, key: &[u8]) -> Result<()> {
        self.append(key, None)
    }

    fn append(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        if let Some(last) = &self.last_key {
            if key <= last.as_slice() {
                return Err(FlatError::Storage(format!(
                    "SSTable keys out of order in {}",
                    self.path.display()
                )));
            }
        }

        let value_len = match value {
            Some(v) => {
                if v.len() >= TOMBSTONE_MARKER as usize {
                    return Err(FlatError::Storage("value too large for SSTable".into()));
                }
                v.len() as u32
            }
            None => TOMBSTONE_MARKER,
        };

        let mut record = Vec::with_capacity(8 + key.len() + value.map_or(0, |v| v.len()));
        record.extend_from_slice(&(key.len() as u32).to_le_bytes());
        record.extend_from_slice(&value_len.to_le_bytes());
        record.extend_from_slice(key);
        if let Some(v) = value {
            record.extend_from_slice(v);
        }

        self.writer.write_all(&record)?;
        self.data_crc.update(&record);
        self.index.push((key.to_vec(), self.offset));
        self.offset += record.len() as u64;
        self.entry_count += 1;
        self.last_key = Some(key.to_vec());
        Ok(())
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Write index and footer, fsync, and describe the finished table
    pub fn finish(mut self) -> Result<SSTableMeta> {
        let index_offset = self.offset;

        let mut index_crc = crc32fast::Hasher::new();
        for (key, offset) in &self.index {
            let mut slot = Vec::with_capacity(12 + key.len());
            slot.extend_from_slice(&(key.len() as u32).to_le_bytes());
            slot.extend_from_slice(&offset.to_le_bytes());
            slot.extend_from_slice(key);
            self.writer.write_all(&slot)?;
            index_crc.update(&slot);
        }

        self.writer.write_all(&index_offset.to_le_bytes())?;
        self.writer.write_all(&self.data_crc.finalize().to_le_bytes())?;
        self.writer.write_all(&index_crc.finalize().to_le_bytes())?;
        self.writer.flush()?;

        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| FlatError::Storage(format!("failed to flush SSTable: {}", e)))?;
        file.seek(SeekFrom::Start(6))?;
        file.write_all(&self.entry_count.to_le_bytes())?;
        file.sync_all()?;

        let file_size = file.metadata()?.len();
        let min_key = self.index.first().map(|(k, _)| k.clone()).unwrap_or_default();
        let max_key = self.last_key.unwrap_or_default();

        Ok(SSTableMeta {
            path: self.path,
            entry_count: self.entry_count,
            min_key,
            max_key,
            file_size,
        })
    }
}
