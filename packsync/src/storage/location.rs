//! Top-level storage areas.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A named top-level area under the storage root.
///
/// Each variant maps to one directory directly below the root, e.g.
/// `<root>/packages/<resource>/...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageLocation {
    /// Content and software bundles tracked by manifests.
    Packages,
    /// Prebuilt runtime archives served as opaque files.
    Binaries,
    /// Small per-player uploads (skins, capes), deduplicated by content.
    PlayerAssets,
    /// Staging directories for pending update downloads.
    Temp,
}

impl StorageLocation {
    /// All locations, in directory-listing order.
    pub const ALL: [StorageLocation; 4] = [
        StorageLocation::Packages,
        StorageLocation::Binaries,
        StorageLocation::PlayerAssets,
        StorageLocation::Temp,
    ];

    /// Directory name of this location below the storage root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            StorageLocation::Packages => "packages",
            StorageLocation::Binaries => "binaries",
            StorageLocation::PlayerAssets => "player-assets",
            StorageLocation::Temp => "temp",
        }
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for StorageLocation {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StorageLocation::ALL
            .into_iter()
            .find(|loc| loc.dir_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| StoreError::InvalidInput(format!("unknown storage location '{}'", s)))
    }
}
