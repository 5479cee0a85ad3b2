//! LSM backend
//!
//! The persistent engine: every mutation is logged to the WAL, applied to
//! the memtable, and flushed to sorted tables once the memtable is full.
//!
//! ## Directory Layout
//! ```text
//! <name>/
//!   LOCK            exclusive lock held while open
//!   wal.log         write-ahead log
//!   sstables/       sstable_000001.sst, ...
//! ```
//!
//! ## Concurrency Model: Single-Writer / Multiple-Reader
//!
//! - Writes (put/bulk_put/delete/flush/compaction) are serialized by
//!   `write_lock`, then take the WAL mutex, then touch the memtable.
//! - Point reads take no engine lock: memtable first, then tables newest
//!   to oldest. A flush publishes its table before clearing the memtable,
//!   so a reader always finds the latest value in one of the two.
//! - Cursors materialize the visible records while holding `write_lock`,
//!   which makes every scan a point-in-time snapshot. A scan with a limit
//!   materializes only that many records.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use fs2::FileExt;
use parking_lot::Mutex;

use crate::config::WalSyncStrategy;
use crate::error::{FlatError, Result};
use crate::memtable::{MemTable, MemTableEntry};
use crate::storage::StorageManager;
use crate::wal::{Operation, WalRecovery, WalWriter};

use super::scan::{self, SnapshotCursor};
use super::{Backend, BackendFactory, BackendOptions, Cursor, KeyValue, ScanOptions};

/// Tuning knobs of the LSM engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LsmOptions {
    /// WAL fsync policy (`sync=always` or `sync=every:<N>`)
    pub sync: WalSyncStrategy,

    /// Memtable size that triggers a flush, in bytes (`memtable_size`)
    pub memtable_size_limit: usize,

    /// Table count above which all tables are compacted (`max_sstables`)
    pub max_sstables: usize,
}

impl Default for LsmOptions {
    fn default() -> Self {
        Self {
            sync: WalSyncStrategy::default(),
            memtable_size_limit: 64 * 1024 * 1024,
            max_sstables: 8,
        }
    }
}

impl LsmOptions {
    /// Read recognised keys from opaque backend options; others are ignored
    pub fn from_options(options: &BackendOptions) -> Result<Self> {
        let mut lsm = Self::default();

        if let Some(sync) = options.get_str("sync") {
            lsm.sync = parse_sync(sync)?;
        }
        if let Some(size) = options.get_parsed::<usize>("memtable_size")? {
            if size == 0 {
                return Err(FlatError::Config("memtable_size must be positive".into()));
            }
            lsm.memtable_size_limit = size;
        }
        if let Some(max) = options.get_parsed::<usize>("max_sstables")? {
            if max == 0 {
                return Err(FlatError::Config("max_sstables must be positive".into()));
            }
            lsm.max_sstables = max;
        }

        Ok(lsm)
    }
}

fn parse_sync(raw: &str) -> Result<WalSyncStrategy> {
    if raw == "always" {
        return Ok(WalSyncStrategy::EveryWrite);
    }
    match raw.strip_prefix("every:").map(str::parse::<usize>) {
        Some(Ok(count)) if count > 0 => Ok(WalSyncStrategy::EveryNEntries { count }),
        _ => Err(FlatError::Config(format!(
            "invalid sync '{}': expected 'always' or 'every:<N>'",
            raw
        ))),
    }
}

/// Persistent backend rooted at one directory
pub struct LsmBackend {
    data_dir: PathBuf,
    options: LsmOptions,

    /// Write-ahead log (exclusive access needed)
    wal: Mutex<WalWriter>,

    /// Recent writes (internal RwLock)
    memtable: MemTable,

    /// Flushed tables (internal RwLock)
    storage: StorageManager,

    /// Serializes writers, flushes and snapshot materialization
    write_lock: Mutex<()>,

    closed: AtomicBool,

    /// Held for the lifetime of the backend
    lock_file: File,
}

impl LsmBackend {
    const LOCK_FILENAME: &'static str = "LOCK";
    const WAL_FILENAME: &'static str = "wal.log";
    const SSTABLE_DIR: &'static str = "sstables";

    /// Open or create an engine in `path`
    ///
    /// On startup:
    /// 1. Create the directory and take its lock
    /// 2. Load existing tables
    /// 3. Replay the WAL and flush what it held
    /// 4. Start a fresh WAL
    pub fn open(path: &Path, options: LsmOptions) -> Result<Self> {
        fs::create_dir_all(path)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(Self::LOCK_FILENAME))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(FlatError::Open {
                name: path.display().to_string(),
                reason: "directory is locked by another instance".to_string(),
            });
        }

        let storage = StorageManager::open(&path.join(Self::SSTABLE_DIR))?;
        let memtable = MemTable::new();

        let wal_path = path.join(Self::WAL_FILENAME);
        let mut next_lsn = 1;
        if wal_path.exists() {
            let (entries, recovery) = WalRecovery::recover(&wal_path)?;
            if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
                tracing::info!(
                    recovered = recovery.entries_recovered,
                    corrupted = recovery.entries_corrupted,
                    last_lsn = recovery.last_lsn,
                    truncated = recovery.was_truncated,
                    "WAL recovery"
                );
            }
            next_lsn = recovery.last_lsn + 1;

            for entry in entries {
                match entry.operation {
                    Operation::Put { key, value } => {
                        memtable.put(key, value);
                    }
                    Operation::Delete { key } => {
                        memtable.delete(key);
                    }
                    Operation::Batch { pairs } => {
                        memtable.apply_batch(pairs);
                    }
                }
            }

            // Recovered data must be durable before the WAL is reset
            if !memtable.is_empty() {
                tracing::debug!(entries = memtable.entry_count(), "flushing recovered entries");
                storage.flush(&memtable)?;
                memtable.clear();
            }
        }

        let wal = WalWriter::open_at(&wal_path, options.sync, next_lsn)?;

        tracing::info!(
            dir = %path.display(),
            sstables = storage.sstable_count(),
            "lsm backend opened"
        );

        Ok(Self {
            data_dir: path.to_path_buf(),
            options,
            wal: Mutex::new(wal),
            memtable,
            storage,
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            lock_file,
        })
    }

    /// Force the memtable out to a table
    pub fn flush(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.check_open()?;
        self.flush_internal()
    }

    /// Merge every table into one, regardless of the threshold
    pub fn compact(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.check_open()?;
        self.storage.compact()?;
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn options(&self) -> &LsmOptions {
        &self.options
    }

    pub fn memtable_size(&self) -> usize {
        self.memtable.size()
    }

    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    pub fn sstable_count(&self) -> usize {
        self.storage.sstable_count()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FlatError::Closed);
        }
        Ok(())
    }

    /// Log, apply, and flush if the memtable filled up. Caller holds
    /// `write_lock`.
    ///
    /// The write is committed once it is logged and applied; a failed flush
    /// after that is logged and retried on the next full memtable.
    fn write(&self, operation: Operation) -> Result<()> {
        self.check_open()?;
        self.wal.lock().append(operation.clone())?;

        let size = match operation {
            Operation::Put { key, value } => self.memtable.put(key, value),
            Operation::Delete { key } => self.memtable.delete(key),
            Operation::Batch { pairs } => self.memtable.apply_batch(pairs),
        };

        if size >= self.options.memtable_size_limit {
            if let Err(e) = self.flush_internal() {
                tracing::warn!(error = %e, memtable_size = size, "memtable flush failed");
            }
        }
        Ok(())
    }

    /// Caller holds `write_lock`
    fn flush_internal(&self) -> Result<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        self.storage.flush(&self.memtable)?;
        self.memtable.clear();
        self.wal.lock().truncate()?;

        if self.storage.sstable_count() > self.options.max_sstables {
            self.storage.compact()?;
        }
        Ok(())
    }

    /// Visible records in `[lower, upper)`, tombstones resolved
    ///
    /// With a `limit`, stops once that many live records are found. Each
    /// source is read at most `limit` records at a time, so the lock is held
    /// for a bounded copy however large the range is.
    fn snapshot(
        &self,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let _guard = self.write_lock.lock();
        self.check_open()?;

        let mut live = Vec::new();
        let mut from = lower.map(<[u8]>::to_vec);
        loop {
            if let (Some(from), Some(upper)) = (from.as_deref(), upper) {
                if from >= upper {
                    break;
                }
            }

            let recent = self.memtable.range(from.as_deref(), upper, limit);
            let mut complete_to = match limit {
                Some(limit) if recent.len() >= limit => recent.last().map(|(k, _)| k.clone()),
                _ => None,
            };

            let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();
            for (key, entry) in recent {
                merged.insert(key, entry.into_value());
            }
            let tables_to = self
                .storage
                .collect_range(from.as_deref(), upper, limit, &mut merged)?;
            complete_to = match (complete_to, tables_to) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };

            // Past `complete_to` a cut-short source may hide newer versions
            let mut next = None;
            if let Some(mut bound) = complete_to {
                bound.push(0);
                merged.retain(|key, _| key < &bound);
                next = Some(bound);
            }
            live.extend(
                merged
                    .into_iter()
                    .filter_map(|(key, value)| value.map(|v| (key, v))),
            );

            match (next, limit) {
                (Some(next), Some(limit)) if live.len() < limit => from = Some(next),
                _ => break,
            }
        }

        if let Some(limit) = limit {
            live.truncate(limit);
        }
        Ok(live)
    }
}

impl Backend for LsmBackend {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.write(Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })
        .map_err(FlatError::into_write)
    }

    fn bulk_put(&self, pairs: &[KeyValue]) -> Result<()> {
        if pairs.is_empty() {
            return self.check_open();
        }
        let pairs = pairs
            .iter()
            .map(|kv| (kv.key.clone(), kv.value.clone()))
            .collect();

        let _guard = self.write_lock.lock();
        self.write(Operation::Batch { pairs })
            .map_err(FlatError::into_write)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_open()?;

        if let Some(entry) = self.memtable.get(key) {
            return Ok(match entry {
                MemTableEntry::Value(value) => Some(value),
                MemTableEntry::Tombstone => None,
            });
        }

        self.storage.get(key).map_err(FlatError::into_read)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.write(Operation::Delete { key: key.to_vec() })
            .map_err(FlatError::into_write)
    }

    fn cursor(&self) -> Result<Box<dyn Cursor + '_>> {
        let entries = self.snapshot(None, None, None).map_err(FlatError::into_read)?;
        Ok(Box::new(SnapshotCursor::new(entries)))
    }

    /// Materializes only what the traversal can reach: the prefix range,
    /// starting at the offset when ascending, and no more than `limit`
    /// records when ascending
    fn scan(&self, options: ScanOptions<'_>) {
        let mut lower = options.prefix.clone();
        let upper = lower.as_deref().and_then(scan::prefix_successor);
        let mut limit = None;

        if !options.reverse {
            if let Some(offset) = &options.offset {
                if lower.as_ref().map_or(true, |prefix| offset > prefix) {
                    lower = Some(offset.clone());
                }
            }
            // One extra in case the offset itself is skipped
            limit = options.limit.map(|limit| limit.saturating_add(1));
        }

        scan::run(options, || {
            let entries = self
                .snapshot(lower.as_deref(), upper.as_deref(), limit)
                .map_err(FlatError::into_read)?;
            Ok(Box::new(SnapshotCursor::new(entries)) as Box<dyn Cursor>)
        });
    }

    /// Flush the memtable, sync the WAL and release the directory lock
    fn close(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.flush_internal()?;
        self.wal.lock().sync()?;
        if let Err(e) = FileExt::unlock(&self.lock_file) {
            tracing::warn!(error = %e, "failed to release directory lock");
        }

        tracing::info!(dir = %self.data_dir.display(), "lsm backend closed");
        Ok(())
    }
}

/// Factory registered as `lsm`; `name` is the data directory
pub struct LsmFactory;

impl BackendFactory for LsmFactory {
    fn name(&self) -> &'static str {
        "lsm"
    }

    fn open(&self, name: &str, options: &BackendOptions) -> Result<Box<dyn Backend>> {
        let options = LsmOptions::from_options(options).map_err(|e| e.into_open(name))?;
        let backend = LsmBackend::open(Path::new(name), options).map_err(|e| e.into_open(name))?;
        Ok(Box::new(backend))
    }
}
