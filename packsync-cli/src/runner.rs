//! Shared command setup: configuration, logging and the async runtime.

use std::future::Future;
use std::path::{Path, PathBuf};

use packsync::config::{ConfigFile, StoreConfig};
use packsync::logging::{init_logging, LoggingGuard};
use packsync::store::ContentStore;
use packsync::update::UpdateService;
use tokio::runtime::Runtime;
use tracing::info;

use crate::error::CliError;

/// Global options every command accepts.
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Explicit configuration file.
    pub config: Option<PathBuf>,
    /// Storage root override.
    pub root: Option<PathBuf>,
}

/// Loaded configuration plus the runtime commands execute on.
pub struct CliRunner {
    config: ConfigFile,
    config_path: PathBuf,
    runtime: Runtime,
    _logging: LoggingGuard,
}

impl CliRunner {
    /// Load configuration, apply overrides and install logging.
    pub fn new(args: &GlobalArgs) -> Result<Self, CliError> {
        let config_path = match &args.config {
            Some(path) => path.clone(),
            None => ConfigFile::default_path()?,
        };
        let mut config = ConfigFile::load(&config_path)?;
        if let Some(root) = &args.root {
            config.store.root = root.clone();
        }

        let logging = init_logging(&config.logging);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(CliError::Runtime)?;

        Ok(Self {
            config,
            config_path,
            runtime,
            _logging: logging,
        })
    }

    /// The effective configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Engine settings.
    pub fn store_config(&self) -> &StoreConfig {
        &self.config.store
    }

    /// Path the configuration was loaded from.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Log the command being run and the effective storage root.
    pub fn log_startup(&self, command: &str) {
        info!(
            command,
            version = packsync::VERSION,
            root = %self.config.store.root.display(),
            config = %self.config_path.display(),
            "Starting packsync"
        );
    }

    /// Content store over the configured root.
    pub fn store(&self) -> ContentStore {
        ContentStore::from_config(&self.config.store)
    }

    /// Update service over the configured root, opening the handle registry.
    pub fn update_service(&self) -> Result<UpdateService, CliError> {
        Ok(UpdateService::from_config(&self.config.store)?)
    }

    /// Run a future to completion on the command runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

/// Read an input file.
pub fn read_input(path: &Path) -> Result<Vec<u8>, CliError> {
    std::fs::read(path).map_err(|e| CliError::file(path, e))
}

/// Write an output file, creating parent directories.
pub fn write_output(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CliError::file(parent, e))?;
    }
    std::fs::write(path, bytes).map_err(|e| CliError::file(path, e))
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_root_override_wins_over_config_file() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.ini");
        std::fs::write(&config_path, "[storage]\nroot = /from/config\n").unwrap();

        let runner = CliRunner::new(&GlobalArgs {
            config: Some(config_path.clone()),
            root: Some(temp.path().join("override")),
        })
        .unwrap();

        assert_eq!(runner.store_config().root, temp.path().join("override"));
        assert_eq!(runner.config_path(), config_path.as_path());
    }

    #[test]
    fn test_write_output_creates_parents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out/nested/update.zip");

        write_output(&path, b"zip").unwrap();
        assert_eq!(read_input(&path).unwrap(), b"zip");
    }

    #[test]
    fn test_missing_input_names_path() {
        let temp = TempDir::new().unwrap();
        let err = read_input(&temp.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("absent.json"));
    }
}
