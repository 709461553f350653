//! Packsync CLI - Command-line interface
//!
//! Drives the packsync storage and update engine against a local storage
//! root: ingest archives and files, inspect manifests, run update checks and
//! sweep expired staging areas.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::common::LocationArg;
use commands::fetch::{FetchArchiveArgs, FetchFileArgs};
use commands::ingest::{IngestArchiveArgs, IngestFileArgs};
use commands::manifest::ManifestArgs;
use commands::sweep::SweepArgs;
use commands::update::{CheckArgs, DownloadArgs};
use error::CliError;
use runner::{CliRunner, GlobalArgs};

#[derive(Debug, Parser)]
#[command(name = "packsync", version, about = "Content-addressed package storage and incremental updates")]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Storage root, overriding the configuration file
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write the configuration file and create the storage layout
    Init,

    /// Print the manifest of a stored resource
    Manifest {
        /// Resource directory name
        resource_id: String,

        /// Storage location of the resource
        #[arg(long, value_enum, default_value = "packages")]
        location: LocationArg,

        /// Print a directory tree instead of JSON
        #[arg(long)]
        tree: bool,
    },

    /// Extract a ZIP archive into a resource directory
    IngestArchive {
        /// Archive to ingest
        archive: PathBuf,

        /// Target storage location
        #[arg(long, value_enum, default_value = "packages")]
        location: LocationArg,

        /// Declared archive name (defaults to the file name)
        #[arg(long)]
        name: Option<String>,

        /// Require and validate a package descriptor
        #[arg(long)]
        package: bool,
    },

    /// Store a single file, deduplicated by content
    IngestFile {
        /// File to ingest
        file: PathBuf,

        /// Target storage location
        #[arg(long, value_enum, default_value = "player-assets")]
        location: LocationArg,

        /// Keep the original file name instead of generating one
        #[arg(long)]
        preserve_name: bool,
    },

    /// Copy a stored file out of the storage root
    FetchFile {
        /// Stored file name
        name: String,

        /// Storage location of the file
        #[arg(long, value_enum, default_value = "player-assets")]
        location: LocationArg,

        /// Output path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a ZIP archive of a stored resource
    FetchArchive {
        /// Resource directory name
        resource_id: String,

        /// Storage location of the resource
        #[arg(long, value_enum, default_value = "packages")]
        location: LocationArg,

        /// Output path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Compare a client manifest with a package and stage the update
    Check {
        /// Package resource id
        resource_id: String,

        /// Client manifest JSON file
        #[arg(long)]
        client_manifest: PathBuf,
    },

    /// Redeem a download handle for its update archive
    DownloadUpdate {
        /// Handle returned by `check`
        handle: String,

        /// Output path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Reclaim expired staging directories
    Sweep {
        /// Keep sweeping on the configured interval until Ctrl+C
        #[arg(long)]
        watch: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let global = GlobalArgs {
        config: cli.config,
        root: cli.root,
    };
    let runner = CliRunner::new(&global)?;

    match cli.command {
        Commands::Init => commands::init::run(&runner),
        Commands::Manifest {
            resource_id,
            location,
            tree,
        } => commands::manifest::run(
            &runner,
            ManifestArgs {
                resource_id,
                location,
                tree,
            },
        ),
        Commands::IngestArchive {
            archive,
            location,
            name,
            package,
        } => commands::ingest::run_archive(
            &runner,
            IngestArchiveArgs {
                archive,
                location,
                name,
                package,
            },
        ),
        Commands::IngestFile {
            file,
            location,
            preserve_name,
        } => commands::ingest::run_file(
            &runner,
            IngestFileArgs {
                file,
                location,
                preserve_name,
            },
        ),
        Commands::FetchFile {
            name,
            location,
            output,
        } => commands::fetch::run_file(
            &runner,
            FetchFileArgs {
                name,
                location,
                output,
            },
        ),
        Commands::FetchArchive {
            resource_id,
            location,
            output,
        } => commands::fetch::run_archive(
            &runner,
            FetchArchiveArgs {
                resource_id,
                location,
                output,
            },
        ),
        Commands::Check {
            resource_id,
            client_manifest,
        } => commands::update::run_check(
            &runner,
            CheckArgs {
                resource_id,
                client_manifest,
            },
        ),
        Commands::DownloadUpdate { handle, output } => {
            commands::update::run_download(&runner, DownloadArgs { handle, output })
        }
        Commands::Sweep { watch } => commands::sweep::run(&runner, SweepArgs { watch }),
    }
}
