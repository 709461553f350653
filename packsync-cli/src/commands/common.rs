//! Common types and utilities shared across CLI commands.

use clap::ValueEnum;
use packsync::storage::StorageLocation;

/// Storage location selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum LocationArg {
    /// Versioned bundles tracked by manifests
    Packages,
    /// Opaque runtime archives
    Binaries,
    /// Deduplicated per-player uploads
    PlayerAssets,
}

impl From<LocationArg> for StorageLocation {
    fn from(arg: LocationArg) -> Self {
        match arg {
            LocationArg::Packages => StorageLocation::Packages,
            LocationArg::Binaries => StorageLocation::Binaries,
            LocationArg::PlayerAssets => StorageLocation::PlayerAssets,
        }
    }
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
