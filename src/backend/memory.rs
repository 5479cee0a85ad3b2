//! In-memory backend
//!
//! An ordered map behind a copy-on-write `Arc`. Cursors hold a clone of the
//! `Arc`, so a scan sees the map exactly as it was when it started, and
//! writers only pay for a deep copy while a scan is outstanding.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{FlatError, Result};

use super::{Backend, BackendFactory, BackendOptions, Cursor, KeyValue};

type Tree = BTreeMap<Vec<u8>, Vec<u8>>;

/// Volatile backend, mainly for tests and ephemeral servers
pub struct MemoryBackend {
    data: RwLock<Arc<Tree>>,
    closed: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Arc::new(Tree::new())),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FlatError::Closed);
        }
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_open()?;
        let mut data = self.data.write();
        Arc::make_mut(&mut *data).insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn bulk_put(&self, pairs: &[KeyValue]) -> Result<()> {
        self.check_open()?;
        let mut data = self.data.write();
        let tree = Arc::make_mut(&mut *data);
        for pair in pairs {
            tree.insert(pair.key.clone(), pair.value.clone());
        }
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        Ok(self.data.read().get(key).cloned())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.check_open()?;
        let mut data = self.data.write();
        if data.contains_key(key) {
            Arc::make_mut(&mut *data).remove(key);
        }
        Ok(())
    }

    fn cursor(&self) -> Result<Box<dyn Cursor + '_>> {
        self.check_open()?;
        let snapshot = Arc::clone(&self.data.read());
        Ok(Box::new(TreeCursor::new(snapshot)))
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        *self.data.write() = Arc::new(Tree::new());
        Ok(())
    }
}

/// Factory registered as `memory`. Ignores both name and options.
pub struct MemoryFactory;

impl BackendFactory for MemoryFactory {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn open(&self, _name: &str, _options: &BackendOptions) -> Result<Box<dyn Backend>> {
        Ok(Box::new(MemoryBackend::new()))
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// Cursor over a frozen tree; each step is a range query from the current key
struct TreeCursor {
    tree: Arc<Tree>,
    current: Option<Vec<u8>>,
}

impl TreeCursor {
    fn new(tree: Arc<Tree>) -> Self {
        Self {
            tree,
            current: None,
        }
    }

    fn first_in(&self, range: (Bound<&[u8]>, Bound<&[u8]>)) -> Option<Vec<u8>> {
        self.tree.range::<[u8], _>(range).next().map(|(k, _)| k.clone())
    }

    fn last_in(&self, range: (Bound<&[u8]>, Bound<&[u8]>)) -> Option<Vec<u8>> {
        self.tree.range::<[u8], _>(range).next_back().map(|(k, _)| k.clone())
    }
}

impl Cursor for TreeCursor {
    fn seek(&mut self, key: &[u8]) {
        self.current = self.first_in((Bound::Included(key), Bound::Unbounded));
    }

    fn seek_for_prev(&mut self, key: &[u8]) {
        self.current = self.last_in((Bound::Unbounded, Bound::Included(key)));
    }

    fn seek_to_first(&mut self) {
        self.current = self.tree.keys().next().cloned();
    }

    fn seek_to_last(&mut self) {
        self.current = self.tree.keys().next_back().cloned();
    }

    fn next(&mut self) {
        let next = match self.current.as_deref() {
            Some(cur) => self.first_in((Bound::Excluded(cur), Bound::Unbounded)),
            None => None,
        };
        self.current = next;
    }

    fn prev(&mut self) {
        let prev = match self.current.as_deref() {
            Some(cur) => self.last_in((Bound::Unbounded, Bound::Excluded(cur))),
            None => None,
        };
        self.current = prev;
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> &[u8] {
        self.current.as_deref().unwrap_or(&[])
    }

    fn value(&self) -> &[u8] {
        self.current
            .as_deref()
            .and_then(|k| self.tree.get(k))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
