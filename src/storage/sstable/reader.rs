//! SSTable Reader
//!
//! Opens SSTable files and serves lookups through an in-memory index.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::Bound;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{FlatError, Result};

use super::iterator::SSTableIterator;
use super::{
    le_u32, le_u64, Lookup, SSTableRecord, FOOTER_SIZE, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER,
    VERSION,
};

/// Read handle for one table
///
/// The file sits behind a mutex so lookups only need `&self`; the index is
/// immutable after open and read without locking.
pub struct SSTableReader {
    path: PathBuf,
    file: Mutex<BufReader<File>>,
    /// key -> offset of its record
    index: BTreeMap<Vec<u8>, u64>,
    entry_count: u64,
    index_offset: u64,
}

impl SSTableReader {
    /// Open a table, validating header, footer and both block checksums
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(corrupt(path, "file too short"));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        if &header[0..4] != MAGIC {
            return Err(corrupt(path, "bad magic"));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(FlatError::Storage(format!(
                "unsupported SSTable version {} in {}",
                version,
                path.display()
            )));
        }
        let entry_count = le_u64(&header[6..14]);

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;
        let index_offset = le_u64(&footer[0..8]);
        let data_crc = le_u32(&footer[8..12]);
        let index_crc = le_u32(&footer[12..16]);

        let index_end = file_size - FOOTER_SIZE;
        if index_offset < HEADER_SIZE || index_offset > index_end {
            return Err(corrupt(path, "index offset out of bounds"));
        }

        let mut block = vec![0u8; (index_end - index_offset) as usize];
        file.seek(SeekFrom::Start(index_offset))?;
        file.read_exact(&mut block)?;
        if crc32fast::hash(&block) != index_crc {
            return Err(corrupt(path, "index checksum mismatch"));
        }

        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        if checksum_of(&mut file, index_offset - HEADER_SIZE)? != data_crc {
            return Err(corrupt(path, "data checksum mismatch"));
        }

        let index = parse_index(&block).ok_or_else(|| corrupt(path, "malformed index"))?;
        if index.len() as u64 != entry_count {
            return Err(corrupt(path, "entry count disagrees with index"));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(BufReader::new(file)),
            index,
            entry_count,
            index_offset,
        })
    }

    /// Point lookup
    pub fn get(&self, key: &[u8]) -> Result<Lookup> {
        let offset = match self.index.get(key) {
            Some(&offset) => offset,
            None => return Ok(Lookup::Absent),
        };

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; 8];
        file.read_exact(&mut header)?;
        let key_len = le_u32(&header[0..4]) as i64;
        let value_len = le_u32(&header[4..8]);
        if value_len == TOMBSTONE_MARKER {
            return Ok(Lookup::Deleted);
        }

        file.seek_relative(key_len)?;
        let mut value = vec![0u8; value_len as usize];
        file.read_exact(&mut value)?;
        Ok(Lookup::Found(value))
    }

    /// Records with `lower <= key < upper`, tombstones included, at most
    /// `limit` of them
    pub fn read_range(
        &self,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        limit: Option<usize>,
    ) -> Result<Vec<SSTableRecord>> {
        let start = match lower {
            Some(lower) => self
                .index
                .range::<[u8], _>((Bound::Included(lower), Bound::Unbounded))
                .next(),
            None => self.index.iter().next(),
        };
        let start = match start {
            Some((_, &offset)) => offset,
            None => return Ok(Vec::new()),
        };

        let mut records = Vec::new();
        for record in self.iter_from(start)?.take(limit.unwrap_or(usize::MAX)) {
            let (key, value) = record?;
            if upper.is_some_and(|upper| key.as_slice() >= upper) {
                break;
            }
            records.push((key, value));
        }
        Ok(records)
    }

    /// Iterate over every record (compaction, debugging)
    pub fn iter(&self) -> Result<SSTableIterator<'_>> {
        self.iter_from(HEADER_SIZE)
    }

    fn iter_from(&self, offset: u64) -> Result<SSTableIterator<'_>> {
        SSTableIterator::new(self.file.lock(), offset, self.index_offset)
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn min_key(&self) -> Option<&[u8]> {
        self.index.keys().next().map(|k| k.as_slice())
    }

    pub fn max_key(&self) -> Option<&[u8]> {
        self.index.keys().next_back().map(|k| k.as_slice())
    }

    /// False only when the key is definitely outside `[min_key, max_key]`
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => key >= min && key <= max,
            _ => false,
        }
    }

    /// Whether any key could fall in `[lower, upper)`
    pub fn overlaps(&self, lower: Option<&[u8]>, upper: Option<&[u8]>) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => {
                lower.map_or(true, |lower| max >= lower) && upper.map_or(true, |upper| min < upper)
            }
            _ => false,
        }
    }
}

fn corrupt(path: &Path, reason: &str) -> FlatError {
    FlatError::Storage(format!("corrupt SSTable {}: {}", path.display(), reason))
}

/// CRC32 of the next `len` bytes of `file`, read in fixed-size chunks
fn checksum_of(file: &mut File, len: u64) -> Result<u32> {
    let mut hasher = crc32fast::Hasher::new();
    let mut chunk = vec![0u8; 64 * 1024];
    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(chunk.len() as u64) as usize;
        file.read_exact(&mut chunk[..n])?;
        hasher.update(&chunk[..n]);
        remaining -= n as u64;
    }
    Ok(hasher.finalize())
}

/// Parse `[klen u32][offset u64][key]` slots; `None` on any truncation
fn parse_index(block: &[u8]) -> Option<BTreeMap<Vec<u8>, u64>> {
    let mut index = BTreeMap::new();
    let mut pos = 0;
    while pos < block.len() {
        let slot = block.get(pos..pos + 12)?;
        let key_len = le_u32(&slot[0..4]) as usize;
        let offset = le_u64(&slot[4..12]);
        pos += 12;
        let key = block.get(pos..pos + key_len)?;
        pos += key_len;
        index.insert(key.to_vec(), offset);
    }
    Some(index)
}
