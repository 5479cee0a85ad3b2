//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::MemTableEntry;

/// In-memory table for recent writes
pub struct MemTable {
    data: RwLock<BTreeMap<Vec<u8>, MemTableEntry>>,

    /// Approximate payload size in bytes (keys + values)
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Get the entry for a key (value or tombstone)
    pub fn get(&self, key: &[u8]) -> Option<MemTableEntry> {
        self.data.read().get(key).cloned()
    }

    /// Put a key-value pair, returning the new approximate size
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> usize {
        let mut data = self.data.write();
        self.insert_locked(&mut data, key, MemTableEntry::Value(value))
    }

    /// Record a tombstone for a key, returning the new approximate size
    pub fn delete(&self, key: Vec<u8>) -> usize {
        let mut data = self.data.write();
        self.insert_locked(&mut data, key, MemTableEntry::Tombstone)
    }

    /// Insert every pair under one write lock; readers see all or none
    pub fn apply_batch(&self, pairs: Vec<(Vec<u8>, Vec<u8>)>) -> usize {
        let mut data = self.data.write();
        let mut size = self.size.load(Ordering::Acquire);
        for (key, value) in pairs {
            size = self.insert_locked(&mut data, key, MemTableEntry::Value(value));
        }
        size
    }

    fn insert_locked(
        &self,
        data: &mut BTreeMap<Vec<u8>, MemTableEntry>,
        key: Vec<u8>,
        entry: MemTableEntry,
    ) -> usize {
        let key_len = key.len();
        let footprint = entry.footprint();
        let current = self.size.load(Ordering::Acquire);

        // Key bytes of an overwritten entry are already counted
        let updated = match data.insert(key, entry) {
            Some(old) => current.saturating_sub(old.footprint()) + footprint,
            None => current + key_len + footprint,
        };
        self.size.store(updated, Ordering::Release);
        updated
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Get entry count (tombstones included)
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Check if should flush (size >= limit)
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() >= size_limit
    }

    /// Sorted snapshot of entries with `lower <= key < upper`, at most
    /// `limit` of them
    ///
    /// Missing bounds are open.
    pub fn range(
        &self,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        limit: Option<usize>,
    ) -> Vec<(Vec<u8>, MemTableEntry)> {
        let lower = lower.map_or(Bound::Unbounded, Bound::Included);
        let upper = upper.map_or(Bound::Unbounded, Bound::Excluded);
        self.data
            .read()
            .range::<[u8], _>((lower, upper))
            .take(limit.unwrap_or(usize::MAX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Iterate over a snapshot of all entries in sorted key order
    pub fn iter(&self) -> MemTableIterator {
        MemTableIterator {
            inner: self.range(None, None, None).into_iter(),
        }
    }

    /// Clear all entries (after successful flush)
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.clear();
        self.size.store(0, Ordering::Release);
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over a MemTable snapshot
pub struct MemTableIterator {
    inner: std::vec::IntoIter<(Vec<u8>, MemTableEntry)>,
}

impl Iterator for MemTableIterator {
    type Item = (Vec<u8>, MemTableEntry);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}
