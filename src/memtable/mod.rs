//! MemTable Module
//!
//! In-memory write buffer of the `lsm` backend.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Atomic application of write batches
//! - Track size for flush triggers
//! - Ordered iteration for SSTable creation and range snapshots
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in RwLock:
//! - Ordered keys (required for SSTable generation and scans)
//! - One write-lock acquisition per batch makes batches atomic to readers

mod table;

pub use table::{MemTable, MemTableIterator};

/// Entry stored in the MemTable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemTableEntry {
    /// A live value
    Value(Vec<u8>),

    /// A tombstone (deleted key)
    Tombstone,
}

impl MemTableEntry {
    /// The value, or `None` for a tombstone
    pub fn into_value(self) -> Option<Vec<u8>> {
        match self {
            MemTableEntry::Value(v) => Some(v),
            MemTableEntry::Tombstone => None,
        }
    }

    fn footprint(&self) -> usize {
        match self {
            MemTableEntry::Value(v) => v.len(),
            MemTableEntry::Tombstone => 0,
        }
    }
}
