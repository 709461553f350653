//! Directory walking and manifest construction.
//!
//! A build is split into two phases:
//!
//! 1. **Walk** - a single blocking traversal produces a flat list of
//!    `(manifest path, absolute path)` pairs for every regular file.
//! 2. **Hash** - each file is hashed on the blocking pool, with at most
//!    `max_concurrent_io` reads in flight.
//!
//! The flat list is the primary representation; nested views are derived
//! from it afterwards (see [`Manifest::tree`]).

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};
use walkdir::WalkDir;

use super::digest::ContentDigest;
use super::types::{manifest_path, FileRecord, Manifest, MANIFEST_SEPARATOR};
use crate::batch::run_batch;
use crate::error::{blocking, StoreError, StoreResult};
use crate::storage::{PathResolver, StorageLocation};

/// A regular file discovered by a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    /// Root-relative path in manifest form.
    pub manifest_path: String,
    /// Root-relative filesystem path.
    pub relative: PathBuf,
    /// Absolute path on disk.
    pub absolute: PathBuf,
}

/// Enumerate every regular file below `root`.
///
/// Directories are descended into but not returned; symlinks are not
/// followed. A missing root yields an empty list. Files whose names contain
/// the manifest separator are skipped with a warning.
pub fn walk_files(root: &Path) -> StoreResult<Vec<WalkedFile>> {
    match std::fs::metadata(root) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(StoreError::InvalidInput(format!(
                "not a directory: {}",
                root.display()
            )))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io("read", root, e)),
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            StoreError::io("walk", path, io::Error::from(e))
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let absolute = entry.into_path();
        let relative = absolute
            .strip_prefix(root)
            .map_err(|_| {
                StoreError::InvalidInput(format!(
                    "{} is outside {}",
                    absolute.display(),
                    root.display()
                ))
            })?
            .to_path_buf();

        if has_separator_in_name(&relative) {
            warn!(path = %relative.display(), "Skipping file whose name contains a backslash");
            continue;
        }

        files.push(WalkedFile {
            manifest_path: manifest_path(&relative)?,
            relative,
            absolute,
        });
    }

    Ok(files)
}

fn has_separator_in_name(relative: &Path) -> bool {
    relative
        .components()
        .any(|c| c.as_os_str().to_str().is_some_and(|s| s.contains(MANIFEST_SEPARATOR)))
}

/// Builds manifests from directories on disk.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    resolver: PathResolver,
    max_concurrent_io: usize,
}

impl ManifestBuilder {
    /// Create a builder.
    ///
    /// # Arguments
    ///
    /// * `resolver` - Path resolver for resource lookups
    /// * `max_concurrent_io` - Maximum number of files hashed at once
    pub fn new(resolver: PathResolver, max_concurrent_io: usize) -> Self {
        Self {
            resolver,
            max_concurrent_io: max_concurrent_io.max(1),
        }
    }

    /// Build the manifest of `root`, labelled `name`.
    ///
    /// A missing root produces an empty manifest; unreadable entries fail
    /// with an I/O error. File order in the result is unspecified.
    pub async fn build(&self, root: &Path, name: &str) -> StoreResult<Manifest> {
        let walk_root = root.to_path_buf();
        let files = blocking(move || walk_files(&walk_root))
            .await
            .inspect_err(|e| error!(root = %root.display(), error = %e, "Failed to walk directory"))?;

        let records = run_batch(files, self.max_concurrent_io, |file| async move {
            let absolute = file.absolute.clone();
            let (digest, size) = blocking(move || ContentDigest::of_file(&absolute)).await?;
            Ok(FileRecord::new(file.manifest_path, size, digest))
        })
        .await
        .inspect_err(|e| error!(root = %root.display(), error = %e, "Failed to hash directory"))?;

        debug!(root = %root.display(), files = records.len(), "Built manifest");
        Ok(Manifest::with_files(name, records))
    }

    /// Build the manifest of a stored resource.
    pub async fn build_resource(&self, location: StorageLocation, resource_id: &str) -> StoreResult<Manifest> {
        let dir = self.resolver.resource_dir(location, resource_id)?;
        self.build(&dir, resource_id).await
    }

    /// The resolver used for resource lookups.
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, contents: &[u8]) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn builder(root: &Path) -> ManifestBuilder {
        ManifestBuilder::new(PathResolver::new(root), 4)
    }

    #[tokio::test]
    async fn test_build_records_nested_files_with_backslash_paths() {
        let temp = TempDir::new().unwrap();
        let tree = temp.path().join("pack");
        write(&tree, "mods/a.jar", b"aaaa");
        write(&tree, "mods/deep/b.jar", b"bb");
        write(&tree, "options.txt", b"o");

        let manifest = builder(temp.path()).build(&tree, "pack").await.unwrap();

        assert_eq!(manifest.name, "pack");
        let paths: HashSet<_> = manifest.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            HashSet::from(["mods\\a.jar", "mods\\deep\\b.jar", "options.txt"])
        );
        let a = manifest.get("mods\\a.jar").unwrap();
        assert_eq!(a.size, 4);
        assert_eq!(a.digest(), &ContentDigest::of_bytes(b"aaaa"));
    }

    #[tokio::test]
    async fn test_build_skips_directories() {
        let temp = TempDir::new().unwrap();
        let tree = temp.path().join("pack");
        fs::create_dir_all(tree.join("empty/nested")).unwrap();
        write(&tree, "file.bin", b"x");

        let manifest = builder(temp.path()).build(&tree, "pack").await.unwrap();
        assert_eq!(manifest.len(), 1);
    }

    #[tokio::test]
    async fn test_build_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        let manifest = builder(temp.path())
            .build(&temp.path().join("does-not-exist"), "X")
            .await
            .unwrap();

        assert_eq!(manifest, Manifest::new("X"));
    }

    #[tokio::test]
    async fn test_build_root_is_file() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "plain.txt", b"x");

        let err = builder(temp.path())
            .build(&temp.path().join("plain.txt"), "plain")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_identical_content_has_identical_digest() {
        let temp = TempDir::new().unwrap();
        let tree = temp.path().join("pack");
        write(&tree, "one.cfg", b"same");
        write(&tree, "sub/two.cfg", b"same");

        let manifest = builder(temp.path()).build(&tree, "pack").await.unwrap();
        assert_eq!(
            manifest.get("one.cfg").unwrap().digest(),
            manifest.get("sub\\two.cfg").unwrap().digest()
        );
    }

    #[tokio::test]
    async fn test_build_resource_resolves_location() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("packages").join("pack"), "a.jar", b"a");

        let manifest = builder(temp.path())
            .build_resource(StorageLocation::Packages, "pack")
            .await
            .unwrap();
        assert_eq!(manifest.name, "pack");
        assert!(manifest.get("a.jar").is_some());
    }

    #[tokio::test]
    async fn test_build_resource_rejects_nested_id() {
        let temp = TempDir::new().unwrap();
        let err = builder(temp.path())
            .build_resource(StorageLocation::Packages, "pack/mods")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_build_skips_symlinks() {
        let temp = TempDir::new().unwrap();
        let tree = temp.path().join("pack");
        write(&tree, "real.txt", b"r");
        std::os::unix::fs::symlink(tree.join("real.txt"), tree.join("link.txt")).unwrap();

        let manifest = builder(temp.path()).build(&tree, "pack").await.unwrap();
        assert_eq!(manifest.len(), 1);
        assert!(manifest.get("real.txt").is_some());
    }

    #[test]
    fn test_walk_files_relative_paths() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a/b/c.txt", b"c");

        let files = walk_files(temp.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].manifest_path, "a\\b\\c.txt");
        assert_eq!(files[0].relative, PathBuf::from("a").join("b").join("c.txt"));
        assert_eq!(files[0].absolute, temp.path().join("a/b/c.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_files_skips_names_with_backslash() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "mods/a.jar", b"a");
        write(temp.path(), "mods/odd\\name.jar", b"b");
        write(temp.path(), "config/mod:settings.toml", b"c");

        let mut paths: Vec<_> = walk_files(temp.path())
            .unwrap()
            .into_iter()
            .map(|f| f.manifest_path)
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["config\\mod:settings.toml", "mods\\a.jar"]);
    }
}
