//! Configuration for flatkv
//!
//! Centralized server configuration with sensible defaults. Backend-specific
//! settings travel opaquely in [`BackendOptions`] and are interpreted only by
//! the backend that receives them.

use std::path::PathBuf;
use std::time::Duration;

use crate::backend::BackendOptions;

/// Main configuration for a flatkv server
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Location handed to the backend as its `name` (a directory for `lsm`)
    pub data_dir: PathBuf,

    /// Registered backend driver to open (`lsm`, `memory`)
    pub backend: String,

    /// Opaque driver options, passed through untouched
    pub backend_options: BackendOptions,

    // -------------------------------------------------------------------------
    // Expiry Configuration
    // -------------------------------------------------------------------------
    /// Interval of the background expiry sweep; `None` disables it.
    /// Expired keys are still hidden and purged lazily on read.
    pub sweep_interval: Option<Duration>,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,
}

/// WAL sync strategy used by the `lsm` backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for WalSyncStrategy {
    fn default() -> Self {
        WalSyncStrategy::EveryNEntries { count: 100 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./flatkv_data"),
            backend: "lsm".to_string(),
            backend_options: BackendOptions::new(),
            sweep_interval: None,
            listen_addr: "127.0.0.1:6380".to_string(),
            max_connections: 1024,
            read_timeout_ms: 0,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory handed to the backend
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Select the backend driver by registry name
    pub fn backend(mut self, name: impl Into<String>) -> Self {
        self.config.backend = name.into();
        self
    }

    /// Replace all backend options
    pub fn backend_options(mut self, options: BackendOptions) -> Self {
        self.config.backend_options = options;
        self
    }

    /// Set a single backend option
    pub fn backend_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.backend_options.set(key, value);
        self
    }

    /// Enable the background expiry sweep
    pub fn sweep_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
