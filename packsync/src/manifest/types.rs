//! Manifest data model and JSON wire shape.
//!
//! ```json
//! {
//!   "name": "pack",
//!   "files": [
//!     { "path": "mods\\a.jar", "size": 10, "hashes": { "sha-512": "..." } }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use super::digest::ContentDigest;
use crate::error::{StoreError, StoreResult};

/// Separator joining path segments in manifest `path` fields.
///
/// Fixed regardless of host platform so manifests produced on different
/// systems compare equal.
pub const MANIFEST_SEPARATOR: char = '\\';

/// Convert a root-relative filesystem path into manifest form.
pub fn manifest_path(relative: &Path) -> StoreResult<String> {
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => {
                let segment = segment.to_str().ok_or_else(|| {
                    StoreError::InvalidInput(format!(
                        "file name is not valid UTF-8: {}",
                        relative.display()
                    ))
                })?;
                segments.push(segment);
            }
            Component::CurDir => {}
            _ => {
                return Err(StoreError::InvalidInput(format!(
                    "path is not root-relative: {}",
                    relative.display()
                )))
            }
        }
    }
    let separator = MANIFEST_SEPARATOR.to_string();
    Ok(segments.join(separator.as_str()))
}

/// Per-file digests keyed by algorithm name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHashes {
    #[serde(rename = "sha-512")]
    pub sha512: ContentDigest,
}

/// One regular file under a tracked tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Root-relative path joined with [`MANIFEST_SEPARATOR`].
    pub path: String,

    /// Size in bytes.
    pub size: u64,

    /// Content digests.
    pub hashes: FileHashes,
}

impl FileRecord {
    /// Create a record.
    pub fn new(path: impl Into<String>, size: u64, digest: ContentDigest) -> Self {
        Self {
            path: path.into(),
            size,
            hashes: FileHashes { sha512: digest },
        }
    }

    /// The SHA-512 digest.
    pub fn digest(&self) -> &ContentDigest {
        &self.hashes.sha512
    }
}

/// Snapshot of a tracked directory tree.
///
/// File order carries no meaning; compare manifests by path membership and
/// per-path digest only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Logical identifier of the tree.
    pub name: String,

    /// One record per regular file.
    #[serde(default)]
    pub files: Vec<FileRecord>,
}

impl Manifest {
    /// Create an empty manifest.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
        }
    }

    /// Create a manifest from existing records.
    pub fn with_files(name: impl Into<String>, files: Vec<FileRecord>) -> Self {
        Self {
            name: name.into(),
            files,
        }
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True when no files are recorded.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sum of all file sizes.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Look up a record by manifest path.
    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Path -> digest lookup table.
    pub fn digests(&self) -> HashMap<&str, &ContentDigest> {
        self.files
            .iter()
            .map(|f| (f.path.as_str(), f.digest()))
            .collect()
    }

    /// Sort files by path. Useful for stable output; never required for
    /// comparisons.
    pub fn sort(&mut self) {
        self.files.sort_by(|a, b| a.path.cmp(&b.path));
    }

    /// Parse a manifest from JSON text.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a manifest from a JSON byte buffer.
    pub fn from_slice(bytes: &[u8]) -> StoreResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize as indented JSON.
    pub fn to_json_pretty(&self) -> StoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Hierarchical view derived from the flat file list.
    pub fn tree(&self) -> ManifestTree {
        let mut root = ManifestTree::default();
        for record in &self.files {
            let mut segments: Vec<&str> = record
                .path
                .split(MANIFEST_SEPARATOR)
                .filter(|s| !s.is_empty())
                .collect();
            let Some(file_name) = segments.pop() else {
                continue;
            };

            let node = segments.into_iter().fold(&mut root, |node, dir| {
                node.dirs.entry(dir.to_string()).or_default()
            });
            node.files.push(TreeFile {
                name: file_name.to_string(),
                path: record.path.clone(),
                size: record.size,
                digest: record.digest().clone(),
            });
        }
        root.sort_files();
        root
    }
}

/// A file leaf in a [`ManifestTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeFile {
    /// Final path segment.
    pub name: String,
    /// Full manifest path.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// SHA-512 digest.
    pub digest: ContentDigest,
}

/// Directory node of the hierarchical manifest projection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestTree {
    /// Files directly inside this directory, sorted by name.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<TreeFile>,

    /// Sub-directories by name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub dirs: BTreeMap<String, ManifestTree>,
}

impl ManifestTree {
    /// Sub-directory by name.
    pub fn dir(&self, name: &str) -> Option<&ManifestTree> {
        self.dirs.get(name)
    }

    /// Total number of files in this subtree.
    pub fn file_count(&self) -> usize {
        self.files.len() + self.dirs.values().map(|d| d.file_count()).sum::<usize>()
    }

    /// Total size of all files in this subtree.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum::<u64>()
            + self.dirs.values().map(|d| d.total_size()).sum::<u64>()
    }

    fn sort_files(&mut self) {
        self.files.sort_by(|a, b| a.name.cmp(&b.name));
        for dir in self.dirs.values_mut() {
            dir.sort_files();
        }
    }
}
