//! Engine configuration.
//!
//! [`StoreConfig`] is the in-process configuration consumed by the engine
//! components. [`ConfigFile`] maps it to and from the INI file read by the
//! command-line driver.

mod file;

use std::path::PathBuf;
use std::time::Duration;

pub use file::{ConfigError, ConfigFile, ConfigResult};

/// Default staging retention window.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Default interval between staging sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default bound on concurrent per-file operations.
pub const DEFAULT_MAX_CONCURRENT_IO: usize = 16;

/// Default storage root: `<data dir>/packsync`, or `./packsync-data` when
/// the platform has no data directory.
pub fn default_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("packsync"))
        .unwrap_or_else(|| PathBuf::from("packsync-data"))
}

/// Configuration for the storage and update engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Storage root holding every location directory.
    pub root: PathBuf,

    /// How long a staged update stays redeemable.
    pub retention: Duration,

    /// Interval between background staging sweeps.
    pub sweep_interval: Duration,

    /// Maximum number of concurrent file reads, hashes or copies per batch.
    pub max_concurrent_io: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            retention: DEFAULT_RETENTION,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_concurrent_io: DEFAULT_MAX_CONCURRENT_IO,
        }
    }
}

impl StoreConfig {
    /// Create a configuration with the given storage root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Set the storage root.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Set the staging retention window.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the concurrent I/O bound. Zero is treated as one.
    pub fn with_max_concurrent_io(mut self, max: usize) -> Self {
        self.max_concurrent_io = max.max(1);
        self
    }
}
