//! Error types for flatkv
//!
//! One error enum shared by every layer. Backends surface `Open`, `Read`
//! and `Write`; the entry store adds `Type`; the command layer adds
//! `Argument`. An absent key is never an error.

use thiserror::Error;

/// Result type alias using FlatError
pub type Result<T> = std::result::Result<T, FlatError>;

/// Unified error type for flatkv operations
#[derive(Debug, Error)]
pub enum FlatError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Backend Errors
    // -------------------------------------------------------------------------
    #[error("failed to open backend '{name}': {reason}")]
    Open { name: String, reason: String },

    #[error("read failed: {0}")]
    Read(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    #[error("backend is closed")]
    Closed,

    // -------------------------------------------------------------------------
    // WAL / Storage Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Entry / Command Errors
    // -------------------------------------------------------------------------
    #[error("{0}")]
    Type(String),

    #[error("{0}")]
    Argument(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl FlatError {
    /// Reclassify a raw I/O failure as a backend read failure.
    pub fn into_read(self) -> Self {
        match self {
            FlatError::Io(e) => FlatError::Read(e.to_string()),
            other => other,
        }
    }

    /// Reclassify a raw I/O failure as a backend write failure.
    pub fn into_write(self) -> Self {
        match self {
            FlatError::Io(e) => FlatError::Write(e.to_string()),
            other => other,
        }
    }

    /// Wrap any failure that happened while acquiring a backend.
    pub fn into_open(self, name: &str) -> Self {
        match self {
            e @ FlatError::Open { .. } => e,
            other => FlatError::Open {
                name: name.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<bincode::Error> for FlatError {
    fn from(err: bincode::Error) -> Self {
        FlatError::Serialization(err.to_string())
    }
}
