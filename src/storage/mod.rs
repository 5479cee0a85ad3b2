//! Storage Module
//!
//! Persistent storage layer of the `lsm` backend.
//!
//! ## Responsibilities
//! - Persist flushed memtables as immutable sorted tables
//! - Point lookups newest table first, tombstones shadowing older tables
//! - Merged range reads for scans
//! - Full compaction once the table count passes a threshold

mod manager;
mod sstable;

pub use manager::StorageManager;
pub use sstable::{Lookup, SSTableBuilder, SSTableIterator, SSTableMeta, SSTableReader, SSTableRecord};
