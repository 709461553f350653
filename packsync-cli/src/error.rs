//! CLI error type.

use std::io;
use std::path::PathBuf;

use packsync::config::ConfigError;
use packsync::StoreError;
use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid arguments or environment.
    #[error("{0}")]
    Config(String),

    /// The configuration file could not be loaded or saved.
    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    /// An engine operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Reading an input or writing an output file failed.
    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The async runtime could not be started.
    #[error("failed to start runtime: {0}")]
    Runtime(#[source] io::Error),

    /// Output could not be serialized.
    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    /// Wrap an I/O error on `path`.
    pub fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CliError::File {
            path: path.into(),
            source,
        }
    }
}
