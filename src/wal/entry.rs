//! WAL Entry definitions
//!
//! Defines the structure and byte layout of individual WAL log entries.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{FlatError, Result};

/// Header size: LSN (8) + CRC (4) + payload length (4)
pub const HEADER_SIZE: usize = 16;

/// Upper bound on one payload; anything larger is treated as corruption
pub const MAX_ENTRY_SIZE: usize = 1024 * 1024 * 1024;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operation to replay
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },

    /// Put several pairs; replayed all together or not at all
    Batch { pairs: Vec<(Vec<u8>, Vec<u8>)> },
}

impl WalEntry {
    /// Create an entry stamped with the current time
    pub fn new(lsn: u64, operation: Operation) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            lsn,
            operation,
            timestamp,
        }
    }

    fn payload(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&(&self.operation, self.timestamp))?)
    }

    fn checksum(lsn: u64, payload: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&lsn.to_le_bytes());
        hasher.update(payload);
        hasher.finalize()
    }

    /// CRC32 over the LSN and encoded payload
    pub fn compute_crc(&self) -> Result<u32> {
        Ok(Self::checksum(self.lsn, &self.payload()?))
    }

    /// Total encoded size including the header
    pub fn serialized_size(&self) -> Result<usize> {
        let payload = bincode::serialized_size(&(&self.operation, self.timestamp))?;
        Ok(HEADER_SIZE + payload as usize)
    }

    /// Encode as `[lsn][crc][len][payload]`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = self.payload()?;
        if payload.len() > MAX_ENTRY_SIZE {
            return Err(FlatError::Serialization(format!(
                "WAL entry of {} bytes exceeds limit of {}",
                payload.len(),
                MAX_ENTRY_SIZE
            )));
        }

        let crc = Self::checksum(self.lsn, &payload);
        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        bytes.extend_from_slice(&self.lsn.to_le_bytes());
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decode one entry, verifying length and checksum
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let (lsn, crc, len) = Self::parse_header(bytes)?;

        let payload = bytes.get(HEADER_SIZE..HEADER_SIZE + len).ok_or_else(|| {
            FlatError::WalCorruption(format!(
                "entry {} truncated: expected {} payload bytes, got {}",
                lsn,
                len,
                bytes.len() - HEADER_SIZE
            ))
        })?;

        let actual = Self::checksum(lsn, payload);
        if actual != crc {
            return Err(FlatError::WalCorruption(format!(
                "checksum mismatch for entry {}: stored {:08x}, computed {:08x}",
                lsn, crc, actual
            )));
        }

        let (operation, timestamp): (Operation, u64) = bincode::deserialize(payload)
            .map_err(|e| FlatError::WalCorruption(format!("entry {} undecodable: {}", lsn, e)))?;

        Ok(Self {
            lsn,
            operation,
            timestamp,
        })
    }

    /// Split a header into `(lsn, crc, payload_len)`
    pub(crate) fn parse_header(bytes: &[u8]) -> Result<(u64, u32, usize)> {
        if bytes.len() < HEADER_SIZE {
            return Err(FlatError::WalCorruption(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut lsn = [0u8; 8];
        let mut crc = [0u8; 4];
        let mut len = [0u8; 4];
        lsn.copy_from_slice(&bytes[0..8]);
        crc.copy_from_slice(&bytes[8..12]);
        len.copy_from_slice(&bytes[12..16]);

        let len = u32::from_le_bytes(len) as usize;
        if len > MAX_ENTRY_SIZE {
            return Err(FlatError::WalCorruption(format!(
                "payload length {} exceeds limit",
                len
            )));
        }
        Ok((u64::from_le_bytes(lsn), u32::from_le_bytes(crc), len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_entry_decodes() {
        let entry = WalEntry::new(
            7,
            Operation::Batch {
                pairs: vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())],
            },
        );
        let bytes = entry.serialize().unwrap();
        assert_eq!(bytes.len(), entry.serialized_size().unwrap());
        assert_eq!(WalEntry::deserialize(&bytes).unwrap(), entry);
    }

    #[test]
    fn test_flipped_payload_bit_is_detected() {
        let entry = WalEntry::new(1, Operation::Delete { key: b"key".to_vec() });
        let mut bytes = entry.serialize().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        let err = WalEntry::deserialize(&bytes).unwrap_err();
        assert!(matches!(err, FlatError::WalCorruption(_)));
    }

    #[test]
    fn test_flipped_lsn_is_detected() {
        let entry = WalEntry::new(1, Operation::Delete { key: b"key".to_vec() });
        let mut bytes = entry.serialize().unwrap();
        bytes[0] = 2;
        assert!(WalEntry::deserialize(&bytes).is_err());
    }

    #[test]
    fn test_truncated_entry() {
        let entry = WalEntry::new(1, Operation::Delete { key: b"key".to_vec() });
        let bytes = entry.serialize().unwrap();
        assert!(WalEntry::deserialize(&bytes[..HEADER_SIZE + 2]).is_err());
        assert!(WalEntry::deserialize(&bytes[..10]).is_err());
        assert!(WalEntry::deserialize(&[]).is_err());
    }
}
