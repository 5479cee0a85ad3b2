//! Storage Manager
//!
//! Manages the set of SSTables and coordinates reads, flushes and
//! compaction.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{FlatError, Result};
use crate::memtable::{MemTable, MemTableEntry};

use super::{Lookup, SSTableBuilder, SSTableMeta, SSTableReader};

/// Manages the storage layer
///
/// ## Concurrency:
/// - `sstables`: RwLock over shared readers; lookups take the read side
/// - `next_sstable_id`: atomic counter
/// - Flush and compaction are serialized by the caller
pub struct StorageManager {
    data_dir: PathBuf,

    /// Open readers, ordered newest → oldest
    sstables: RwLock<Vec<Arc<SSTableReader>>>,

    next_sstable_id: AtomicU64,
}

impl StorageManager {
    /// Open or create storage in the given directory, loading every table
    /// found there
    pub fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;

        let mut ids = Vec::new();
        for entry in fs::read_dir(path)? {
            let file_path = entry?.path();
            if !file_path.is_file() {
                continue;
            }
            match Self::parse_sstable_id(&file_path) {
                Some(id) => ids.push(id),
                None if file_path.extension().is_some_and(|ext| ext == "tmp") => {
                    tracing::warn!(path = %file_path.display(), "removing unfinished SSTable");
                    fs::remove_file(&file_path)?;
                }
                None => {}
            }
        }

        ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut sstables = Vec::with_capacity(ids.len());
        for id in &ids {
            let reader = SSTableReader::open(&Self::sstable_path_with_dir(path, *id))?;
            sstables.push(Arc::new(reader));
        }

        let next_id = ids.first().map_or(1, |&id| id + 1);
        tracing::debug!(dir = %path.display(), tables = sstables.len(), "storage opened");

        Ok(Self {
            data_dir: path.to_path_buf(),
            sstables: RwLock::new(sstables),
            next_sstable_id: AtomicU64::new(next_id),
        })
    }

    /// Look a key up across all tables, newest → oldest
    ///
    /// A tombstone in a newer table hides any value in older ones.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let sstables = self.sstables.read().clone();

        for reader in &sstables {
            if !reader.might_contain(key) {
                continue;
            }
            match reader.get(key)? {
                Lookup::Found(value) => return Ok(Some(value)),
                Lookup::Deleted => return Ok(None),
                Lookup::Absent => continue,
            }
        }

        Ok(None)
    }

    /// Merge every table's records in `[lower, upper)` into `out`
    ///
    /// Entries already in `out` win, so callers insert newer sources first.
    /// Tombstones are kept as `None`. With a `limit`, each table contributes
    /// at most that many records; the returned key is then the highest key
    /// up to which `out` is complete, or `None` when no table was cut short.
    pub fn collect_range(
        &self,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        limit: Option<usize>,
        out: &mut BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    ) -> Result<Option<Vec<u8>>> {
        let sstables = self.sstables.read().clone();
        let mut complete_to: Option<Vec<u8>> = None;

        for reader in sstables.iter().filter(|r| r.overlaps(lower, upper)) {
            let records = reader.read_range(lower, upper, limit)?;
            if limit.is_some_and(|limit| records.len() >= limit) {
                if let Some((last, _)) = records.last() {
                    if complete_to.as_ref().map_or(true, |k| last < k) {
                        complete_to = Some(last.clone());
                    }
                }
            }
            for (key, value) in records {
                out.entry(key).or_insert(value);
            }
        }
        Ok(complete_to)
    }

    /// Write a memtable out as a new table and make it visible
    pub fn flush(&self, memtable: &MemTable) -> Result<SSTableMeta> {
        if memtable.is_empty() {
            return Err(FlatError::Storage("cannot flush empty MemTable".to_string()));
        }

        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let records = memtable
            .iter()
            .map(|(key, entry)| (key, entry.into_value()));
        let (meta, reader) = self.build(id, records)?;

        self.sstables.write().insert(0, Arc::new(reader));
        tracing::debug!(
            path = %meta.path.display(),
            entries = meta.entry_count,
            "memtable flushed"
        );
        Ok(meta)
    }

    /// Merge every table into one
    ///
    /// Tombstones are dropped: after a full merge nothing older remains for
    /// them to shadow. Returns `None` when there was nothing to do.
    pub fn compact(&self) -> Result<Option<SSTableMeta>> {
        let inputs = self.sstables.read().clone();
        if inputs.len() < 2 {
            return Ok(None);
        }

        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();
        for reader in &inputs {
            for record in reader.iter()? {
                let (key, value) = record?;
                merged.entry(key).or_insert(value);
            }
        }

        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let live = merged.into_iter().filter(|(_, value)| value.is_some());
        let (meta, reader) = self.build(id, live)?;

        {
            let mut sstables = self.sstables.write();
            sstables.retain(|r| !inputs.iter().any(|old| Arc::ptr_eq(r, old)));
            sstables.push(Arc::new(reader));
        }

        for old in &inputs {
            if let Err(e) = fs::remove_file(old.path()) {
                tracing::warn!(path = %old.path().display(), error = %e, "failed to remove compacted SSTable");
            }
        }

        tracing::info!(
            inputs = inputs.len(),
            entries = meta.entry_count,
            "compaction finished"
        );
        Ok(Some(meta))
    }

    /// Build a table under a temporary name, then rename it into place
    fn build<I>(&self, id: u64, records: I) -> Result<(SSTableMeta, SSTableReader)>
    where
        I: Iterator<Item = (Vec<u8>, Option<Vec<u8>>)>,
    {
        let path = self.sstable_path(id);
        let tmp = path.with_extension("tmp");

        let mut builder = SSTableBuilder::new(&tmp)?;
        for (key, value) in records {
            match value {
                Some(v) => builder.add(&key, &v)?,
                None => builder.add_tombstone(&key)?,
            }
        }
        let mut meta = builder.finish()?;

        fs::rename(&tmp, &path)?;
        meta.path = path.clone();
        let reader = SSTableReader::open(&path)?;
        Ok((meta, reader))
    }

    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Next table id (for testing/debugging)
    pub fn next_sstable_id(&self) -> u64 {
        self.next_sstable_id.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn sstable_path(&self, id: u64) -> PathBuf {
        Self::sstable_path_with_dir(&self.data_dir, id)
    }

    fn sstable_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("sstable_{:06}.sst", id))
    }

    /// "sstable_000042.sst" → Some(42)
    fn parse_sstable_id(path: &Path) -> Option<u64> {
        if path.extension()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        name.strip_prefix("sstable_")?.parse().ok()
    }
}
