//! Tests for the Backend contract
//!
//! These tests verify:
//! - Point get/put/delete on every built-in backend
//! - Atomic bulk put, including against a concurrent scan
//! - Registry lookup and unknown drivers
//! - Closed backends reject operations

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use flatkv::backend::scan::SnapshotCursor;
use flatkv::backend::{Cursor, LsmBackend, LsmOptions, MemoryBackend};
use flatkv::config::WalSyncStrategy;
use flatkv::{Backend, BackendOptions, FlatError, KeyValue, Registry, Result, ScanOptions};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_lsm() -> (TempDir, LsmBackend) {
    let temp_dir = TempDir::new().unwrap();
    let options = LsmOptions {
        sync: WalSyncStrategy::EveryWrite,
        ..LsmOptions::default()
    };
    let backend = LsmBackend::open(temp_dir.path(), options).unwrap();
    (temp_dir, backend)
}

fn collect_all(backend: &dyn Backend) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut seen = Vec::new();
    backend.scan(ScanOptions::new().filter(|k, v| {
        seen.push((k, v));
        true
    }));
    seen
}

fn check_point_operations(backend: &dyn Backend) {
    assert_eq!(backend.get(b"missing").unwrap(), None);

    backend.put(b"k", b"v1").unwrap();
    assert_eq!(backend.get(b"k").unwrap(), Some(b"v1".to_vec()));

    backend.put(b"k", b"v2").unwrap();
    assert_eq!(backend.get(b"k").unwrap(), Some(b"v2".to_vec()));

    backend.delete(b"k").unwrap();
    assert_eq!(backend.get(b"k").unwrap(), None);

    // Deleting a missing key is not an error
    backend.delete(b"k").unwrap();
    backend.delete(b"never-there").unwrap();
}

/// Race whole-batch overwrites against full scans; every scan must see
/// exactly one batch
fn check_bulk_put_atomic(backend: Arc<dyn Backend>) {
    const BATCH: usize = 50;
    const ROUNDS: usize = 200;

    let writer = {
        let backend = Arc::clone(&backend);
        thread::spawn(move || {
            for round in 0..ROUNDS {
                let pairs: Vec<KeyValue> = (0..BATCH)
                    .map(|i| KeyValue::new(format!("k{:03}", i), format!("{}", round)))
                    .collect();
                backend.bulk_put(&pairs).unwrap();
            }
        })
    };

    for _ in 0..ROUNDS {
        let rows = collect_all(backend.as_ref());
        // Either nothing has been written yet or one whole batch is visible
        assert!(rows.is_empty() || rows.len() == BATCH);
        if let Some((_, first)) = rows.first() {
            assert!(rows.iter().all(|(_, v)| v == first), "scan saw a mixed batch");
        }
    }

    writer.join().unwrap();
    let rows = collect_all(backend.as_ref());
    assert_eq!(rows.len(), BATCH);
    assert!(rows.iter().all(|(_, v)| v == format!("{}", ROUNDS - 1).as_bytes()));
}

/// Wraps a memory backend and counts how many cursors were opened
struct CountingBackend {
    inner: MemoryBackend,
    cursors_opened: AtomicUsize,
}

impl CountingBackend {
    fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            cursors_opened: AtomicUsize::new(0),
        }
    }
}

impl Backend for CountingBackend {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.put(key, value)
    }

    fn bulk_put(&self, pairs: &[KeyValue]) -> Result<()> {
        self.inner.bulk_put(pairs)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner.delete(key)
    }

    fn cursor(&self) -> Result<Box<dyn Cursor + '_>> {
        self.cursors_opened.fetch_add(1, Ordering::SeqCst);
        self.inner.cursor()
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

/// A backend whose cursor always fails to open
struct BrokenCursorBackend;

impl Backend for BrokenCursorBackend {
    fn put(&self, _key: &[u8], _value: &[u8]) -> Result<()> {
        Ok(())
    }

    fn bulk_put(&self, _pairs: &[KeyValue]) -> Result<()> {
        Ok(())
    }

    fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn delete(&self, _key: &[u8]) -> Result<()> {
        Ok(())
    }

    fn cursor(&self) -> Result<Box<dyn Cursor + '_>> {
        Err(FlatError::Read("disk on fire".to_string()))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Point Operation Tests
// =============================================================================

#[test]
fn test_memory_point_operations() {
    let backend = MemoryBackend::new();
    check_point_operations(&backend);
    assert!(backend.is_empty());
}

#[test]
fn test_lsm_point_operations() {
    let (_temp, backend) = setup_lsm();
    check_point_operations(&backend);
}

#[test]
fn test_binary_keys_and_values() {
    let backend = MemoryBackend::new();
    let key = vec![0u8, 0xFF, b'\r', b'\n'];
    let value = vec![0xDE, 0xAD, 0x00, 0xBE, 0xEF];

    backend.put(&key, &value).unwrap();
    assert_eq!(backend.get(&key).unwrap(), Some(value));
}

#[test]
fn test_empty_value_is_distinct_from_missing() {
    let (_temp, backend) = setup_lsm();
    backend.put(b"empty", b"").unwrap();
    assert_eq!(backend.get(b"empty").unwrap(), Some(Vec::new()));
}

// =============================================================================
// Bulk Put Tests
// =============================================================================

#[test]
fn test_bulk_put_all_visible() {
    let (_temp, backend) = setup_lsm();
    let pairs = vec![
        KeyValue::new(b"a".to_vec(), b"1".to_vec()),
        KeyValue::new(b"b".to_vec(), b"2".to_vec()),
        KeyValue::new(b"c".to_vec(), b"3".to_vec()),
    ];
    backend.bulk_put(&pairs).unwrap();

    assert_eq!(backend.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(backend.get(b"b").unwrap(), Some(b"2".to_vec()));
    assert_eq!(backend.get(b"c").unwrap(), Some(b"3".to_vec()));
}

#[test]
fn test_bulk_put_empty_batch() {
    let backend = MemoryBackend::new();
    backend.bulk_put(&[]).unwrap();
    assert!(backend.is_empty());
}

#[test]
fn test_bulk_put_never_observed_partially_memory() {
    check_bulk_put_atomic(Arc::new(MemoryBackend::new()));
}

#[test]
fn test_bulk_put_never_observed_partially_lsm() {
    let temp_dir = TempDir::new().unwrap();
    // Small limits so batches land across flushes and compactions
    let options = LsmOptions {
        sync: WalSyncStrategy::EveryNEntries { count: 1000 },
        memtable_size_limit: 4096,
        max_sstables: 2,
    };
    let backend = Arc::new(LsmBackend::open(temp_dir.path(), options).unwrap());
    check_bulk_put_atomic(backend.clone());

    assert!(backend.sstable_count() >= 1);
    assert!(backend.sstable_count() <= 2);
}

// =============================================================================
// Scan Delegation Tests
// =============================================================================

#[test]
fn test_scan_without_filter_opens_no_cursor() {
    let backend = CountingBackend::new();
    backend.put(b"a", b"1").unwrap();

    backend.scan(ScanOptions::new().prefix("a"));
    assert_eq!(backend.cursors_opened.load(Ordering::SeqCst), 0);

    backend.scan(ScanOptions::new().filter(|_, _| true));
    assert_eq!(backend.cursors_opened.load(Ordering::SeqCst), 1);
}

#[test]
fn test_scan_cursor_error_delivers_nothing() {
    let mut called = false;
    BrokenCursorBackend.scan(ScanOptions::new().filter(|_, _| {
        called = true;
        true
    }));
    assert!(!called);
}

#[test]
fn test_snapshot_cursor_positions() {
    let mut cursor = SnapshotCursor::new(vec![
        (b"b".to_vec(), b"2".to_vec()),
        (b"d".to_vec(), b"4".to_vec()),
    ]);
    assert!(!cursor.valid());

    cursor.seek(b"c");
    assert_eq!(cursor.key(), b"d");

    cursor.seek_for_prev(b"c");
    assert_eq!(cursor.key(), b"b");

    cursor.prev();
    assert!(!cursor.valid());

    cursor.seek_to_last();
    assert_eq!(cursor.value(), b"4");
    cursor.next();
    assert!(!cursor.valid());
}

#[test]
fn test_memory_scan_is_a_snapshot() {
    let backend = MemoryBackend::new();
    backend.put(b"a", b"1").unwrap();
    backend.put(b"b", b"2").unwrap();

    let mut seen = Vec::new();
    backend.scan(ScanOptions::new().filter(|k, _| {
        // Writes made mid-scan are not visible to it
        backend.put(b"c", b"3").unwrap();
        seen.push(k);
        true
    }));

    assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec()]);
    assert_eq!(backend.get(b"c").unwrap(), Some(b"3".to_vec()));
}

// =============================================================================
// Registry Tests
// =============================================================================

#[test]
fn test_registry_builtin_drivers() {
    let registry = Registry::builtin();
    assert!(registry.contains("memory"));
    assert!(registry.contains("lsm"));
    assert_eq!(registry.names(), vec!["lsm", "memory"]);
}

#[test]
fn test_registry_unknown_backend() {
    let registry = Registry::builtin();
    let result = registry.open("rocks", "whatever", &BackendOptions::new());
    assert!(matches!(result, Err(FlatError::UnknownBackend(name)) if name == "rocks"));
}

#[test]
fn test_registry_opens_independent_instances() {
    let registry = Registry::builtin();
    let options = BackendOptions::new();

    let first = registry.open("memory", "one", &options).unwrap();
    let second = registry.open("memory", "two", &options).unwrap();

    first.put(b"k", b"v").unwrap();
    assert_eq!(second.get(b"k").unwrap(), None);
}

#[test]
fn test_registry_opens_lsm_with_options() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("db");
    let options = BackendOptions::from_pairs(["sync=always", "max_sstables=2"]).unwrap();

    let backend = Registry::builtin()
        .open("lsm", &dir.to_string_lossy(), &options)
        .unwrap();
    backend.put(b"k", b"v").unwrap();
    backend.close().unwrap();

    assert!(dir.join("wal.log").exists());
}

#[test]
fn test_registry_rejects_bad_lsm_options() {
    let temp_dir = TempDir::new().unwrap();
    let options = BackendOptions::from_pairs(["sync=sometimes"]).unwrap();

    let result = Registry::builtin().open("lsm", &temp_dir.path().to_string_lossy(), &options);
    assert!(result.is_err());
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_memory_closed_rejects_operations() {
    let backend = MemoryBackend::new();
    backend.put(b"k", b"v").unwrap();
    backend.close().unwrap();

    assert!(matches!(backend.get(b"k"), Err(FlatError::Closed)));
    assert!(matches!(backend.put(b"k", b"v"), Err(FlatError::Closed)));
    assert!(backend.cursor().is_err());
}

#[test]
fn test_lsm_closed_rejects_operations() {
    let (_temp, backend) = setup_lsm();
    backend.put(b"k", b"v").unwrap();
    backend.close().unwrap();

    assert!(matches!(backend.get(b"k"), Err(FlatError::Closed)));
    assert!(backend.put(b"k", b"v").is_err());
    assert!(backend.delete(b"k").is_err());

    // Closing twice is harmless
    backend.close().unwrap();
}
