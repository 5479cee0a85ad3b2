//! Backend Module
//!
//! The capability contract every physical storage engine satisfies.
//!
//! ## Responsibilities
//! - Point get/put/delete over an ordered, byte-keyed keyspace
//! - Atomic bulk put
//! - A snapshot cursor, from which the shared scan engine drives traversals
//! - Resource release on close
//!
//! ## Layering
//! ```text
//!   Store (TTL, incr)  ──▶  dyn Backend  ──▶  memory | lsm
//!                               │
//!                               └── scan() ──▶ scan::run(cursor)
//! ```
//!
//! Backends only supply cursor primitives; the traversal rules (prefix
//! bound, offset seek, direction, early stop) live in [`scan`] and are
//! the same for every engine.

mod memory;
mod options;
mod registry;

pub mod lsm;
pub mod scan;

pub use lsm::{LsmBackend, LsmFactory, LsmOptions};
pub use memory::{MemoryBackend, MemoryFactory};
pub use options::BackendOptions;
pub use registry::Registry;
pub use scan::{Cursor, ScanOptions};

use crate::error::Result;

/// A raw key/value pair as stored by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KeyValue {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One open storage engine instance.
///
/// Implementations must be safe to share across connection threads. Keys
/// are ordered lexicographically by bytes, and `cursor()` must expose that
/// order over a consistent snapshot.
pub trait Backend: Send + Sync {
    /// Upsert one record.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Upsert a batch. Either every pair becomes visible or none does.
    fn bulk_put(&self, pairs: &[KeyValue]) -> Result<()>;

    /// Point lookup. A missing key is `Ok(None)`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Remove a record. Removing a missing key succeeds.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Open a cursor over a snapshot of the keyspace.
    fn cursor(&self) -> Result<Box<dyn Cursor + '_>>;

    /// Traverse records as described by `options`.
    ///
    /// Results are delivered only through the filter. Errors end the
    /// traversal and are logged.
    fn scan(&self, options: ScanOptions<'_>) {
        scan::run(options, || self.cursor());
    }

    /// Release all resources. Later operations fail with `Closed`.
    fn close(&self) -> Result<()>;
}

/// Constructs backends of one kind; registered by name in a [`Registry`].
pub trait BackendFactory: Send + Sync {
    /// Driver name used for registry lookup.
    fn name(&self) -> &'static str;

    /// Open a new, independent backend.
    ///
    /// `name` identifies the physical resource (a directory for `lsm`).
    fn open(&self, name: &str, options: &BackendOptions) -> Result<Box<dyn Backend>>;
}
