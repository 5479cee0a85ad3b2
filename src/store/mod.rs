//! Logical Entry Store
//!
//! Adds per-key expiry and atomic numeric increment on top of any
//! [`Backend`].
//!
//! ## Responsibilities
//! - Encode a relative TTL as an absolute expiry next to the payload
//! - Hide expired records on every read path and purge them lazily
//! - Serialize read-modify-write on a key (`incr`) against other writers
//!
//! Increment results are stored as the shortest decimal text that parses
//! back to the same `f64`, so repeated increments never drift and `GET`
//! returns a readable number.

mod entry;
mod locks;
mod sweeper;

use std::sync::Arc;
use std::time::Duration;

pub use entry::Entry;
pub use sweeper::Sweeper;

use entry::{now_millis, Record};
use locks::{KeyLocks, DEFAULT_STRIPES};

use crate::backend::{Backend, KeyValue, ScanOptions};
use crate::error::{FlatError, Result};

/// Keys examined per scan while purging expired records
pub const PURGE_PAGE: usize = 256;

/// Remaining lifetime of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// No such key, or it already expired
    Missing,
    /// Live with no expiry
    Persistent,
    /// Live, expiring after the given duration
    Expires(Duration),
}

/// Entry store shared by all connections
pub struct Store {
    backend: Arc<dyn Backend>,
    locks: KeyLocks,
}

impl Store {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            locks: KeyLocks::new(DEFAULT_STRIPES),
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Write one entry; the entry must carry a value
    pub fn put(&self, entry: &Entry) -> Result<()> {
        let record = Self::record_for(entry, now_millis())?;
        let _guard = self.locks.lock(&entry.key);
        self.backend.put(&entry.key, &record.encode()?)
    }

    /// Write several entries with a single atomic bulk put
    pub fn put_many(&self, entries: &[Entry]) -> Result<()> {
        let now = now_millis();
        let pairs = entries
            .iter()
            .map(|entry| -> Result<KeyValue> {
                let record = Self::record_for(entry, now)?;
                Ok(KeyValue::new(entry.key.clone(), record.encode()?))
            })
            .collect::<Result<Vec<_>>>()?;

        let _guards = self.locks.lock_many(entries.iter().map(|e| e.key.as_slice()));
        self.backend.bulk_put(&pairs)
    }

    /// Current value, or `None` when absent or expired
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let now = now_millis();
        match self.read(key)? {
            Some(record) if record.is_expired(now) => {
                self.purge(key);
                Ok(None)
            }
            Some(record) => Ok(Some(record.value)),
            None => Ok(None),
        }
    }

    /// Delete every entry's key independently
    ///
    /// Each key is attempted even when an earlier one fails; the first
    /// failure is returned afterwards.
    pub fn batch(&self, entries: &[Entry]) -> Result<()> {
        let mut first_error = None;
        for entry in entries {
            let _guard = self.locks.lock(&entry.key);
            if let Err(e) = self.backend.delete(&entry.key) {
                tracing::warn!(key = %String::from_utf8_lossy(&entry.key), error = %e, "delete failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Add `delta` to the number stored at `key`, creating it from 0
    ///
    /// The result is written with `ttl` (no expiry when `None`) and returned.
    pub fn incr(&self, key: &[u8], delta: f64, ttl: Option<Duration>) -> Result<f64> {
        if !delta.is_finite() {
            return Err(FlatError::Argument("increment is not a finite number".into()));
        }

        let _guard = self.locks.lock(key);
        let now = now_millis();

        let current = match self.read(key)? {
            Some(record) if !record.is_expired(now) => parse_number(&record.value)?,
            _ => 0.0,
        };

        let next = current + delta;
        if !next.is_finite() {
            return Err(FlatError::Argument(
                "increment would produce NaN or Infinity".into(),
            ));
        }

        let record = Record::new(format_number(next).into_bytes(), ttl, now);
        self.backend.put(key, &record.encode()?)?;
        Ok(next)
    }

    /// Remaining lifetime of `key`
    pub fn ttl(&self, key: &[u8]) -> Result<KeyTtl> {
        let now = now_millis();
        Ok(match self.read(key)? {
            None => KeyTtl::Missing,
            Some(record) if record.is_expired(now) => {
                self.purge(key);
                KeyTtl::Missing
            }
            Some(record) => match record.remaining(now) {
                Some(remaining) => KeyTtl::Expires(remaining),
                None => KeyTtl::Persistent,
            },
        })
    }

    /// Live keys starting with `prefix`, ascending
    pub fn keys(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        let now = now_millis();
        let mut keys = Vec::new();
        self.backend.scan(ScanOptions::new().prefix(prefix).filter(|key, value| {
            match Record::decode(&key, &value) {
                Ok(record) if !record.is_expired(now) => keys.push(key),
                Ok(_) => {}
                Err(e) => tracing::debug!(error = %e, "skipping record"),
            }
            true
        }));
        keys
    }

    /// Remove every expired record, returning how many were purged
    ///
    /// Walks the keyspace in pages of [`PURGE_PAGE`] keys, each its own
    /// scan, so writers are never held off for a whole-keyspace copy.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = now_millis();
        let mut purged = 0;
        let mut resume: Option<Vec<u8>> = None;

        loop {
            let mut expired = Vec::new();
            let mut last = None;
            let mut seen = 0;

            let mut options = ScanOptions::new().limit(PURGE_PAGE);
            if let Some(key) = resume.take() {
                options = options.offset(key).include_offset(false);
            }
            self.backend.scan(options.filter(|key, value| {
                seen += 1;
                if Record::decode(&key, &value).is_ok_and(|r| r.is_expired(now)) {
                    expired.push(key.clone());
                }
                last = Some(key);
                true
            }));

            for key in expired {
                if self.purge_locked(&key)? {
                    purged += 1;
                }
            }

            match last {
                Some(key) if seen >= PURGE_PAGE => resume = Some(key),
                _ => return Ok(purged),
            }
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn record_for(entry: &Entry, now: u64) -> Result<Record> {
        let value = entry.value.clone().ok_or_else(|| {
            FlatError::Argument(format!(
                "entry for key '{}' has no value",
                String::from_utf8_lossy(&entry.key)
            ))
        })?;
        Ok(Record::new(value, entry.ttl, now))
    }

    fn read(&self, key: &[u8]) -> Result<Option<Record>> {
        match self.backend.get(key)? {
            Some(bytes) => Ok(Some(Record::decode(key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Best-effort lazy purge; failures are logged and swallowed
    fn purge(&self, key: &[u8]) {
        if let Err(e) = self.purge_locked(key) {
            tracing::warn!(key = %String::from_utf8_lossy(key), error = %e, "failed to purge expired key");
        }
    }

    /// Delete `key` if it is still expired once its lock is held; a writer
    /// may have replaced it in the meantime
    fn purge_locked(&self, key: &[u8]) -> Result<bool> {
        let _guard = self.locks.lock(key);
        match self.read(key)? {
            Some(record) if record.is_expired(now_millis()) => {
                self.backend.delete(key)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

fn parse_number(bytes: &[u8]) -> Result<f64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .ok_or_else(|| FlatError::Type("value is not a valid float".into()))
}

/// Shortest text that parses back to exactly `value`
fn format_number(value: f64) -> String {
    value.to_string()
}
