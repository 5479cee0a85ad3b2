//! # flatkv
//!
//! A Redis-protocol key-value server over pluggable ordered storage
//! backends, with:
//! - A small backend contract (get/put/bulk-put/delete/cursor/close)
//! - One scan engine shared by every backend
//! - Per-key TTLs and atomic numeric increments in the entry store
//! - A persistent LSM backend (WAL + memtable + SSTables) and an
//!   in-memory one
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                             │
//! │              (one thread per connection)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ RESP
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   Command Table                             │
//! │          (SET GET DEL INCR MSET EXISTS TTL KEYS ...)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Store                                   │
//! │        (expiry encoding, lazy purge, striped key locks)     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ dyn Backend
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌──────────────────────────┐
//!   │   memory    │          │ lsm: WAL → MemTable →    │
//!   │ (COW BTree) │          │      SSTables            │
//!   └─────────────┘          └──────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod backend;
pub mod memtable;
pub mod storage;
pub mod store;
pub mod wal;

pub mod client;
pub mod command;
pub mod network;
pub mod protocol;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use backend::{Backend, BackendFactory, BackendOptions, KeyValue, Registry, ScanOptions};
pub use command::CommandTable;
pub use config::Config;
pub use error::{FlatError, Result};
pub use store::{Entry, KeyTtl, Store};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of flatkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
