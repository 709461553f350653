//! Update commands - check a client manifest and redeem download handles.

use std::path::PathBuf;

use packsync::update::UpdateCheck;

use super::common::format_size;
use crate::error::CliError;
use crate::runner::{print_json, read_input, write_output, CliRunner};

/// Arguments for the check command.
pub struct CheckArgs {
    pub resource_id: String,
    pub client_manifest: PathBuf,
}

/// Run the check command. Prints the update check as JSON.
pub fn run_check(runner: &CliRunner, args: CheckArgs) -> Result<(), CliError> {
    runner.log_startup("check");
    let check = check(runner, &args)?;
    print_json(&check)
}

fn check(runner: &CliRunner, args: &CheckArgs) -> Result<UpdateCheck, CliError> {
    let service = runner.update_service()?;
    let body = read_input(&args.client_manifest)?;
    Ok(runner.block_on(service.check_for_updates_json(&args.resource_id, &body))?)
}

/// Arguments for the download-update command.
pub struct DownloadArgs {
    pub handle: String,
    pub output: PathBuf,
}

/// Run the download-update command.
pub fn run_download(runner: &CliRunner, args: DownloadArgs) -> Result<(), CliError> {
    runner.log_startup("download-update");
    let service = runner.update_service()?;

    let bytes = runner.block_on(service.download_update(&args.handle))?;
    write_output(&args.output, &bytes)?;
    println!(
        "Wrote {} update archive to {}",
        format_size(bytes.len() as u64),
        args.output.display()
    );
    Ok(())
}
