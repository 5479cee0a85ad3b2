//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{FlatError, Result};

use super::{Operation, WalEntry};

/// Writes entries to the WAL file
///
/// Each entry goes to the OS in a single write before `append` returns;
/// `fsync` frequency follows the sync strategy. A failed append is cut back
/// off the file, so an entry reported as failed is never replayed.
pub struct WalWriter {
    path: PathBuf,
    file: File,

    /// File length up to the end of the last complete entry
    len: u64,

    /// LSN assigned to the next append
    next_lsn: u64,

    sync_strategy: WalSyncStrategy,

    /// Appends since the last fsync
    unsynced: usize,

    /// Set when a failed append could not be rolled back
    poisoned: bool,
}

impl WalWriter {
    /// Create a fresh WAL file, replacing any previous contents
    ///
    /// Callers recover the old log before opening a writer over it.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        Self::open_at(path, sync_strategy, 1)
    }

    /// Like [`open`](Self::open), numbering entries from `next_lsn` so LSNs
    /// keep increasing across restarts
    pub fn open_at(path: &Path, sync_strategy: WalSyncStrategy, next_lsn: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.sync_all()?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len: 0,
            next_lsn: next_lsn.max(1),
            sync_strategy,
            unsynced: 0,
            poisoned: false,
        })
    }

    /// Append an operation, returning its LSN
    ///
    /// On error the file is restored to its previous length. The LSN stays
    /// consumed either way.
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        self.check_usable()?;

        let lsn = self.next_lsn;
        let bytes = WalEntry::new(lsn, operation).serialize()?;
        self.next_lsn += 1;

        if let Err(e) = self.file.write_all(&bytes) {
            self.rollback();
            return Err(e.into());
        }

        let due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced + 1 >= count.max(1),
        };
        if due {
            if let Err(e) = self.file.sync_data() {
                self.rollback();
                return Err(e.into());
            }
            self.unsynced = 0;
        } else {
            self.unsynced += 1;
        }

        self.len += bytes.len() as u64;
        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.check_usable()?;
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Drop every entry; called once the logged data is durable elsewhere.
    /// LSNs keep increasing across truncations.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.sync_all()?;
        self.len = 0;
        self.unsynced = 0;
        self.poisoned = false;
        Ok(())
    }

    /// Get the LSN the next append will receive
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(FlatError::Write(format!(
                "WAL {} holds a partial entry that could not be removed",
                self.path.display()
            )));
        }
        Ok(())
    }

    /// Cut the file back to the end of the last complete entry
    fn rollback(&mut self) {
        let len = self.len;
        let restored = self
            .file
            .set_len(len)
            .and_then(|_| self.file.seek(SeekFrom::Start(len)).map(|_| ()));

        match restored {
            Ok(()) => tracing::warn!(path = %self.path.display(), len, "rolled back failed WAL append"),
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "WAL rollback failed; refusing further appends"
                );
                self.poisoned = true;
            }
        }
    }
}
