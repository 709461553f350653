//! INI configuration file.
//!
//! ```ini
//! [storage]
//! root = /srv/packsync
//! max_concurrent_io = 16
//!
//! [staging]
//! retention_secs = 3600
//! sweep_interval_secs = 60
//!
//! [logging]
//! filter = info
//! directory = /var/log/packsync
//! ```
//!
//! Missing keys fall back to their defaults.

use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use super::StoreConfig;
use crate::logging::LoggingConfig;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or saving the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read or parsed.
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    /// The file could not be written.
    #[error("failed to write config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A key holds a value of the wrong shape.
    #[error("invalid value '{value}' for {section}.{key}: {reason}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },

    /// No platform configuration directory is available.
    #[error("cannot determine configuration directory")]
    NoConfigDir,
}

const STORAGE: &str = "storage";
const STAGING: &str = "staging";
const LOGGING: &str = "logging";

/// Default configuration file path: `<config dir>/packsync/config.ini`.
pub fn config_file_path() -> ConfigResult<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("packsync").join("config.ini"))
        .ok_or(ConfigError::NoConfigDir)
}

/// Contents of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    /// Engine settings.
    pub store: StoreConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// Default configuration file path.
    pub fn default_path() -> ConfigResult<PathBuf> {
        config_file_path()
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    /// Parse from INI text.
    pub fn parse(text: &str) -> ConfigResult<Self> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Read {
            path: PathBuf::from("<string>"),
            source: ini::Error::Parse(e),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> ConfigResult<Self> {
        let mut config = Self::default();
        let get = |section: &str, key: &str| ini.section(Some(section)).and_then(|s| s.get(key));

        if let Some(root) = get(STORAGE, "root").filter(|v| !v.trim().is_empty()) {
            config.store.root = PathBuf::from(root.trim());
        }
        if let Some(value) = get(STORAGE, "max_concurrent_io") {
            let max: usize = parse_value(STORAGE, "max_concurrent_io", value)?;
            if max == 0 {
                return Err(invalid(STORAGE, "max_concurrent_io", value, "must be at least 1"));
            }
            config.store.max_concurrent_io = max;
        }
        if let Some(value) = get(STAGING, "retention_secs") {
            config.store.retention = Duration::from_secs(parse_value(STAGING, "retention_secs", value)?);
        }
        if let Some(value) = get(STAGING, "sweep_interval_secs") {
            let secs: u64 = parse_value(STAGING, "sweep_interval_secs", value)?;
            if secs == 0 {
                return Err(invalid(STAGING, "sweep_interval_secs", value, "must be at least 1"));
            }
            config.store.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(filter) = get(LOGGING, "filter").filter(|v| !v.trim().is_empty()) {
            config.logging.filter = filter.trim().to_string();
        }
        if let Some(dir) = get(LOGGING, "directory").filter(|v| !v.trim().is_empty()) {
            config.logging.directory = Some(PathBuf::from(dir.trim()));
        }

        Ok(config)
    }

    /// Render as an INI document.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some(STORAGE))
            .set("root", self.store.root.to_string_lossy())
            .set("max_concurrent_io", self.store.max_concurrent_io.to_string());
        ini.with_section(Some(STAGING))
            .set("retention_secs", self.store.retention.as_secs().to_string())
            .set("sweep_interval_secs", self.store.sweep_interval.as_secs().to_string());

        let mut logging = ini.with_section(Some(LOGGING));
        logging.set("filter", self.logging.filter.as_str());
        if let Some(dir) = &self.logging.directory {
            logging.set("directory", dir.to_string_lossy());
        }
        ini
    }

    /// Write to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        self.to_ini().write_to_file(path).map_err(write_err)
    }
}

fn parse_value<T>(section: &'static str, key: &'static str, value: &str) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(section, key, value, &e.to_string()))
}

fn invalid(section: &'static str, key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section,
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
