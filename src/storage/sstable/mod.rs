//! SSTable Module
//!
//! Sorted String Table - immutable on-disk sorted key-value storage.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                       │
//! │   Magic: "FKVT" (4) | Version: u16 (2) | Count: u64 (8) │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                   │
//! │   [KeyLen: u32][ValLen: u32][Key][Value]                │
//! │   (ValLen = u32::MAX marks a tombstone, no value bytes) │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Block (variable)                                  │
//! │   [KeyLen: u32][Offset: u64][Key]                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (16 bytes)                                       │
//! │   IndexOffset: u64 | DataCRC: u32 | IndexCRC: u32       │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod builder;
mod iterator;
mod reader;

use std::path::PathBuf;

pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::SSTableReader;

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

pub(crate) const MAGIC: &[u8; 4] = b"FKVT";

pub(crate) const VERSION: u16 = 1;

/// Magic (4) + Version (2) + EntryCount (8)
pub(crate) const HEADER_SIZE: u64 = 14;

/// IndexOffset (8) + DataCRC (4) + IndexCRC (4)
pub(crate) const FOOTER_SIZE: u64 = 16;

pub(crate) const TOMBSTONE_MARKER: u32 = u32::MAX;

/// One decoded data-block record; `None` value is a tombstone
pub type SSTableRecord = (Vec<u8>, Option<Vec<u8>>);

/// Outcome of a point lookup in a single table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Live value
    Found(Vec<u8>),
    /// Key deleted as of this table; older tables must not be consulted
    Deleted,
    /// Table says nothing about the key
    Absent,
}

/// Summary of a finished table
#[derive(Debug, Clone)]
pub struct SSTableMeta {
    pub path: PathBuf,
    pub entry_count: u64,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
    pub file_size: u64,
}

pub(crate) fn le_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

pub(crate) fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}
