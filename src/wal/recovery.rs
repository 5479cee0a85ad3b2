//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::{FlatError, Result};

use super::{WalEntry, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries found (replay stops at the first)
    pub entries_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether bytes after the last valid entry were (or would be) dropped
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries
    /// 2. Stop at the first corrupted or partial entry, or the first entry
    ///    whose LSN does not exceed its predecessor's
    /// 3. Truncate the file after the last valid entry
    /// 4. Return all valid entries in order
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let (entries, result, valid_len) = Self::read_valid(path)?;

        if result.was_truncated {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_len)?;
            file.sync_all()?;
            tracing::warn!(
                path = %path.display(),
                valid_len,
                "truncated damaged WAL tail"
            );
        }

        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let (_, result, _) = Self::read_valid(path)?;
        Ok(result)
    }

    fn read_valid(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult, u64)> {
        let mut reader = WalReader::open(path)?;
        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();
        let mut valid_len = 0;

        loop {
            match reader.next_entry() {
                Ok(Some(entry)) if entry.lsn <= result.last_lsn => {
                    tracing::warn!(
                        path = %path.display(),
                        offset = valid_len,
                        lsn = entry.lsn,
                        last_lsn = result.last_lsn,
                        "WAL replay stopped at out-of-order LSN"
                    );
                    result.entries_corrupted += 1;
                    result.was_truncated = true;
                    break;
                }
                Ok(Some(entry)) => {
                    result.entries_recovered += 1;
                    result.last_lsn = entry.lsn;
                    entries.push(entry);
                    valid_len = reader.position();
                }
                Ok(None) => break,
                Err(FlatError::WalCorruption(reason)) => {
                    tracing::warn!(
                        path = %path.display(),
                        offset = valid_len,
                        %reason,
                        "WAL replay stopped"
                    );
                    if !reader.hit_torn_tail() {
                        result.entries_corrupted += 1;
                    }
                    result.was_truncated = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok((entries, result, valid_len))
    }
}
