//! Init command - write the configuration file and create the storage layout.

use packsync::storage::StorageLocation;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the init command.
pub fn run(runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("init");
    let config = runner.config();

    // Keep whatever is already configured, fill in the rest with defaults
    config.save(runner.config_path())?;

    let root = &config.store.root;
    for location in StorageLocation::ALL {
        let dir = root.join(location.dir_name());
        std::fs::create_dir_all(&dir).map_err(|e| CliError::file(&dir, e))?;
    }

    println!("Configuration file: {}", runner.config_path().display());
    println!("Storage root:       {}", root.display());
    println!();
    println!("Edit the configuration file to customize packsync settings.");
    println!("CLI arguments override config file values when specified.");
    Ok(())
}
