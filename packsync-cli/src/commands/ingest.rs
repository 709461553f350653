//! Ingest commands - store uploaded archives and files.

use std::path::PathBuf;

use packsync::store::UploadedFile;

use super::common::LocationArg;
use crate::error::CliError;
use crate::runner::{read_input, CliRunner};

/// Arguments for the ingest-archive command.
pub struct IngestArchiveArgs {
    pub archive: PathBuf,
    pub location: LocationArg,
    pub name: Option<String>,
    pub package: bool,
}

/// Run the ingest-archive command.
pub fn run_archive(runner: &CliRunner, args: IngestArchiveArgs) -> Result<(), CliError> {
    runner.log_startup("ingest-archive");
    let store = runner.store();

    let declared_name = match args.name {
        Some(name) => name,
        None => args
            .archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                CliError::Config(format!(
                    "Cannot derive a resource name from {}. Use --name.",
                    args.archive.display()
                ))
            })?,
    };
    let bytes = read_input(&args.archive)?;

    if args.package {
        let package = runner.block_on(store.ingest_package(
            args.location.into(),
            bytes.into(),
            &declared_name,
        ))?;
        println!(
            "Ingested package '{}' {} as {}",
            package.descriptor.name, package.descriptor.version, package.resource_id
        );
    } else {
        let resource_id =
            runner.block_on(store.ingest_archive(args.location.into(), bytes.into(), &declared_name))?;
        println!("Ingested archive as {}", resource_id);
    }
    Ok(())
}

/// Arguments for the ingest-file command.
pub struct IngestFileArgs {
    pub file: PathBuf,
    pub location: LocationArg,
    pub preserve_name: bool,
}

/// Run the ingest-file command. Prints the stored name.
pub fn run_file(runner: &CliRunner, args: IngestFileArgs) -> Result<(), CliError> {
    runner.log_startup("ingest-file");
    let store = runner.store();

    let name = runner.block_on(async {
        let file = UploadedFile::from_path(&args.file).await?;
        store
            .ingest_file(file, args.location.into(), args.preserve_name)
            .await
    })?;
    println!("{}", name);
    Ok(())
}
