//! Sweep command - reclaim expired staging directories.

use std::sync::Arc;

use packsync::staging::{StagingSweeper, UpdateStager};
use tokio_util::sync::CancellationToken;

use crate::error::CliError;
use crate::runner::{print_json, CliRunner};

/// Arguments for the sweep command.
pub struct SweepArgs {
    pub watch: bool,
}

/// Run the sweep command.
///
/// Without `--watch` this performs a single pass. With it, sweeps repeat on
/// the configured interval until Ctrl+C.
pub fn run(runner: &CliRunner, args: SweepArgs) -> Result<(), CliError> {
    runner.log_startup("sweep");
    let config = runner.store_config();
    let stager = Arc::new(UpdateStager::new(config)?);

    if !args.watch {
        let report = runner.block_on(stager.sweep())?;
        return print_json(&report);
    }

    let shutdown = CancellationToken::new();
    let handler_token = shutdown.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, stopping sweeper...");
        handler_token.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    println!(
        "Sweeping {} every {}s (retention {}s)",
        config.root.display(),
        config.sweep_interval.as_secs(),
        config.retention.as_secs()
    );
    println!("Press Ctrl+C to stop");
    println!();

    let sweeper = StagingSweeper::new(stager, config.sweep_interval);
    let report = runner.block_on(sweeper.run(shutdown));
    print_json(&report)
}
