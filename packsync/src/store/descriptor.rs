//! Package descriptor shipped inside package archives.
//!
//! The descriptor is a small JSON document stored at
//! [`DESCRIPTOR_ENTRY`](super::archive::DESCRIPTOR_ENTRY):
//!
//! ```json
//! {
//!   "formatVersion": 1,
//!   "name": "Example Pack",
//!   "version": "1.4.0",
//!   "thumbnail": "thumbnail.png",
//!   "screenshots": ["screenshots/1.png"]
//! }
//! ```
//!
//! Image paths are archive-relative and must name entries of the same
//! archive.

use std::collections::HashSet;

use semver::Version;
use serde::{Deserialize, Serialize};

use super::archive::normalize_entry_name;
use crate::error::{StoreError, StoreResult};

/// Descriptor format understood by this version.
pub const DESCRIPTOR_FORMAT_VERSION: u32 = 1;

/// Metadata describing a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDescriptor {
    /// Descriptor format, currently always 1.
    pub format_version: u32,

    /// Human readable package name.
    pub name: String,

    /// Package version.
    pub version: Version,

    /// Archive entry of the thumbnail image.
    pub thumbnail: String,

    /// Archive entries of screenshot images.
    #[serde(default)]
    pub screenshots: Vec<String>,
}

impl PackageDescriptor {
    /// Create a descriptor in the current format with no screenshots.
    pub fn new(name: impl Into<String>, version: Version, thumbnail: impl Into<String>) -> Self {
        Self {
            format_version: DESCRIPTOR_FORMAT_VERSION,
            name: name.into(),
            version,
            thumbnail: thumbnail.into(),
            screenshots: Vec::new(),
        }
    }

    /// Add a screenshot entry.
    pub fn with_screenshot(mut self, entry: impl Into<String>) -> Self {
        self.screenshots.push(entry.into());
        self
    }

    /// Parse descriptor JSON. Field and version errors are reported as
    /// [`StoreError::Descriptor`].
    pub fn from_slice(bytes: &[u8]) -> StoreResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Descriptor(e.to_string()))
    }

    /// Serialize as indented JSON.
    pub fn to_json_pretty(&self) -> StoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the descriptor against the canonical entry names of its archive.
    pub fn validate(&self, entries: &HashSet<String>) -> StoreResult<()> {
        if self.format_version != DESCRIPTOR_FORMAT_VERSION {
            return Err(StoreError::Descriptor(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        if self.name.trim().is_empty() {
            return Err(StoreError::Descriptor("name is empty".to_string()));
        }

        require_entry("thumbnail", &self.thumbnail, entries)?;
        for screenshot in &self.screenshots {
            require_entry("screenshot", screenshot, entries)?;
        }
        Ok(())
    }
}

fn require_entry(field: &str, path: &str, entries: &HashSet<String>) -> StoreResult<()> {
    match normalize_entry_name(path) {
        Some(name) if entries.contains(&name) => Ok(()),
        Some(_) => Err(StoreError::Descriptor(format!(
            "{} '{}' is not present in the archive",
            field, path
        ))),
        None => Err(StoreError::Descriptor(format!(
            "{} '{}' is not a valid archive path",
            field, path
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn entries(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_defaults_screenshots() {
        let json = br#"{"formatVersion":1,"name":"Pack","version":"1.2.3","thumbnail":"thumb.png"}"#;
        let descriptor = PackageDescriptor::from_slice(json).unwrap();
        assert_eq!(descriptor.version, Version::new(1, 2, 3));
        assert!(descriptor.screenshots.is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_semver() {
        let json = br#"{"formatVersion":1,"name":"Pack","version":"v1","thumbnail":"t.png"}"#;
        let err = PackageDescriptor::from_slice(json).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(matches!(err, StoreError::Descriptor(_)));
    }

    #[test]
    fn test_parse_requires_thumbnail() {
        let json = br#"{"formatVersion":1,"name":"Pack","version":"1.0.0"}"#;
        assert!(PackageDescriptor::from_slice(json).is_err());
    }

    #[test]
    fn test_validate_accepts_present_images() {
        let descriptor = PackageDescriptor::new("Pack", Version::new(1, 0, 0), "images\\thumb.png")
            .with_screenshot("images/s1.png");
        descriptor
            .validate(&entries(&["images/thumb.png", "images/s1.png", "mods/a.jar"]))
            .unwrap();
    }

    #[test]
    fn test_validate_rejects_missing_thumbnail() {
        let descriptor = PackageDescriptor::new("Pack", Version::new(1, 0, 0), "thumb.png");
        let err = descriptor.validate(&entries(&["mods/a.jar"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_validate_rejects_missing_screenshot() {
        let descriptor = PackageDescriptor::new("Pack", Version::new(1, 0, 0), "thumb.png")
            .with_screenshot("s1.png");
        assert!(descriptor.validate(&entries(&["thumb.png"])).is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_format_and_traversal() {
        let mut descriptor = PackageDescriptor::new("Pack", Version::new(1, 0, 0), "thumb.png");
        descriptor.format_version = 2;
        assert!(descriptor.validate(&entries(&["thumb.png"])).is_err());

        let descriptor = PackageDescriptor::new("Pack", Version::new(1, 0, 0), "../thumb.png");
        assert!(descriptor.validate(&entries(&["thumb.png"])).is_err());
    }

    #[test]
    fn test_json_is_camel_case() {
        let descriptor = PackageDescriptor::new("Pack", Version::new(2, 0, 1), "t.png");
        let value: serde_json::Value =
            serde_json::from_str(&descriptor.to_json_pretty().unwrap()).unwrap();
        assert_eq!(value["formatVersion"], 1);
        assert_eq!(value["version"], "2.0.1");
    }
}
