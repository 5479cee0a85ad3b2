//! Write-Ahead Log
//!
//! Every mutation of the `lsm` backend is appended here before it touches
//! the memtable. A write batch is one log record, so it replays whole or
//! not at all.
//!
//! ## Lifecycle
//! - `WalWriter` appends records, fsyncing per the configured strategy
//! - After a memtable flush the log is truncated; sequence numbers keep
//!   counting from where they were
//! - On open, `WalRecovery` replays every intact record and cuts the file
//!   back to the last one
//!
//! ## Record Layout
//! ```text
//!   0        8        12       16
//!   ├────────┼────────┼────────┼──────────────────────────────┐
//!   │ lsn    │ crc32  │ len    │ bincode (Operation, millis)  │
//!   │ u64 le │ u32 le │ u32 le │ len bytes                    │
//!   └────────┴────────┴────────┴──────────────────────────────┘
//! ```
//!
//! The checksum covers the LSN bytes and the payload. A record cut short
//! by a crash is a torn tail; a full-length record failing its checksum is
//! corruption. Either ends replay.

mod entry;
mod reader;
mod recovery;
mod writer;

pub use entry::{Operation, WalEntry, HEADER_SIZE, MAX_ENTRY_SIZE};
pub use reader::{WalIterator, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;
