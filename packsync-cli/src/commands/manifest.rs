//! Manifest command - print the manifest of a stored resource.

use packsync::manifest::ManifestTree;

use super::common::{format_size, LocationArg};
use crate::error::CliError;
use crate::runner::{print_json, CliRunner};

/// Arguments for the manifest command.
pub struct ManifestArgs {
    pub resource_id: String,
    pub location: LocationArg,
    pub tree: bool,
}

/// Run the manifest command.
pub fn run(runner: &CliRunner, args: ManifestArgs) -> Result<(), CliError> {
    runner.log_startup("manifest");
    let store = runner.store();

    let manifest = runner.block_on(
        store
            .manifest_builder()
            .build_resource(args.location.into(), &args.resource_id),
    )?;

    if args.tree {
        let tree = manifest.tree();
        println!(
            "{} ({} files, {})",
            manifest.name,
            tree.file_count(),
            format_size(tree.total_size())
        );
        print_tree(&tree, 1);
        Ok(())
    } else {
        print_json(&manifest)
    }
}

fn print_tree(tree: &ManifestTree, depth: usize) {
    let indent = "  ".repeat(depth);
    for (name, dir) in &tree.dirs {
        println!("{}{}/ ({} files)", indent, name, dir.file_count());
        print_tree(dir, depth + 1);
    }
    for file in &tree.files {
        println!("{}{}  {}", indent, file.name, format_size(file.size));
    }
}
