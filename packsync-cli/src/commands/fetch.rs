//! Fetch commands - read stored files and archives.

use std::path::PathBuf;

use super::common::{format_size, LocationArg};
use crate::error::CliError;
use crate::runner::{write_output, CliRunner};

/// Arguments for the fetch-file command.
pub struct FetchFileArgs {
    pub name: String,
    pub location: LocationArg,
    pub output: PathBuf,
}

/// Run the fetch-file command.
pub fn run_file(runner: &CliRunner, args: FetchFileArgs) -> Result<(), CliError> {
    runner.log_startup("fetch-file");
    let store = runner.store();

    let bytes = runner.block_on(store.fetch_file(&args.name, args.location.into()))?;
    write_output(&args.output, &bytes)?;
    println!("Wrote {} to {}", format_size(bytes.len() as u64), args.output.display());
    Ok(())
}

/// Arguments for the fetch-archive command.
pub struct FetchArchiveArgs {
    pub resource_id: String,
    pub location: LocationArg,
    pub output: PathBuf,
}

/// Run the fetch-archive command.
pub fn run_archive(runner: &CliRunner, args: FetchArchiveArgs) -> Result<(), CliError> {
    runner.log_startup("fetch-archive");
    let store = runner.store();

    let bytes = runner.block_on(store.fetch_archive(&args.resource_id, args.location.into()))?;
    write_output(&args.output, &bytes)?;
    println!(
        "Wrote {} archive of {} to {}",
        format_size(bytes.len() as u64),
        args.resource_id,
        args.output.display()
    );
    Ok(())
}
