//! Logical entries and their stored encoding

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{FlatError, Result};

/// A user-visible key/value/TTL triple
///
/// `value` is `None` for entries that only name a key to remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
    pub ttl: Option<Duration>,
}

impl Entry {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            ttl: None,
        }
    }

    /// An entry carrying only a key, as passed to `Store::batch`
    pub fn key_only(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: None,
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }
}

/// What the backend actually stores for an entry: the payload plus an
/// absolute expiry in unix milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Record {
    pub expires_at: Option<u64>,
    pub value: Vec<u8>,
}

impl Record {
    pub fn new(value: Vec<u8>, ttl: Option<Duration>, now: u64) -> Self {
        let expires_at = ttl.map(|ttl| {
            let millis = ttl.as_nanos().div_ceil(1_000_000);
            now.saturating_add(u64::try_from(millis).unwrap_or(u64::MAX))
        });
        Self { expires_at, value }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(key: &[u8], bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| {
            FlatError::Read(format!(
                "undecodable record for key '{}': {}",
                String::from_utf8_lossy(key),
                e
            ))
        })
    }

    /// Expired once the expiry instant is at or before `now`
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn remaining(&self, now: u64) -> Option<Duration> {
        self.expires_at
            .map(|at| Duration::from_millis(at.saturating_sub(now)))
    }
}

/// Current wall-clock time in unix milliseconds
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary() {
        let record = Record::new(b"v".to_vec(), Some(Duration::from_millis(100)), 1_000);
        assert_eq!(record.expires_at, Some(1_100));
        assert!(!record.is_expired(1_099));
        assert!(record.is_expired(1_100));
        assert_eq!(record.remaining(1_060), Some(Duration::from_millis(40)));
    }

    #[test]
    fn test_sub_millisecond_ttl_rounds_up() {
        let record = Record::new(Vec::new(), Some(Duration::from_nanos(1)), 5);
        assert_eq!(record.expires_at, Some(6));
    }

    #[test]
    fn test_persistent_record() {
        let record = Record::new(b"v".to_vec(), None, 1_000);
        assert!(!record.is_expired(u64::MAX));
        assert_eq!(record.remaining(0), None);

        let decoded = Record::decode(b"k", &record.encode().unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_garbage_is_read_error() {
        let err = Record::decode(b"k", &[1]).unwrap_err();
        assert!(matches!(err, FlatError::Read(_)));
    }
}
