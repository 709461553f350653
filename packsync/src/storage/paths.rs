//! Resolution of logical storage names to on-disk paths.

use std::io;
use std::path::{Path, PathBuf};

use tracing::error;
use uuid::Uuid;

use super::location::StorageLocation;
use crate::error::{StoreError, StoreResult};

/// Maps (location, relative name) pairs onto the storage root.
///
/// The resolver never touches files itself except for creating the parent
/// directory chain of a resolved path.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Create a resolver rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a storage location. Does not create it.
    pub fn location_dir(&self, location: StorageLocation) -> PathBuf {
        self.root.join(location.dir_name())
    }

    /// Directory of a resource inside a location. Does not create it.
    ///
    /// The resource id must be a single, non-special path segment.
    pub fn resource_dir(&self, location: StorageLocation, resource_id: &str) -> StoreResult<PathBuf> {
        let segment = single_segment(resource_id)?;
        Ok(self.location_dir(location).join(segment))
    }

    /// Resolve a relative name and make sure its parent directory exists.
    pub async fn resolve(&self, relative_name: &str, location: StorageLocation) -> StoreResult<PathBuf> {
        let resolved = self.join(relative_name, location)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| log_create_failure(parent, e))?;
        }
        Ok(resolved)
    }

    /// Blocking variant of [`resolve`](Self::resolve) for use inside worker tasks.
    pub fn resolve_blocking(&self, relative_name: &str, location: StorageLocation) -> StoreResult<PathBuf> {
        let resolved = self.join(relative_name, location)?;
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent).map_err(|e| log_create_failure(parent, e))?;
        }
        Ok(resolved)
    }

    /// Generate a globally unique file name keeping the original extension.
    ///
    /// Extensionless names are refused.
    pub fn generate_name(&self, original_name: &str) -> StoreResult<String> {
        let ext = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                StoreError::InvalidInput(format!(
                    "file extension cannot be determined for '{}'",
                    original_name
                ))
            })?;
        Ok(format!("{}.{}", Uuid::new_v4(), ext))
    }

    fn join(&self, relative_name: &str, location: StorageLocation) -> StoreResult<PathBuf> {
        Ok(self.location_dir(location).join(relative_path(relative_name)?))
    }
}

fn log_create_failure(dir: &Path, e: io::Error) -> StoreError {
    error!(path = %dir.display(), error = %e, "Failed to create directory");
    StoreError::io("create directory", dir, e)
}

/// Split a stored or manifest path into safe relative segments.
///
/// Accepts both `/` and `\` as separators. Empty and `.` segments are
/// dropped; `..`, absolute paths and (on Windows) drive prefixes and
/// stream names are rejected so a resolved path can never leave its base
/// directory.
pub fn relative_segments(name: &str) -> StoreResult<Vec<&str>> {
    let invalid = |reason: &str| StoreError::InvalidInput(format!("path '{}' {}", name, reason));

    if name.starts_with('/') || name.starts_with('\\') {
        return Err(invalid("is absolute"));
    }

    let mut segments = Vec::new();
    for segment in name.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return Err(invalid("escapes its base directory")),
            s if s.contains('\0') || (cfg!(windows) && s.contains(':')) => {
                return Err(invalid("contains a reserved character"))
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(invalid("is empty"));
    }
    Ok(segments)
}

/// Convert a stored or manifest path into a relative [`PathBuf`].
pub fn relative_path(name: &str) -> StoreResult<PathBuf> {
    Ok(relative_segments(name)?.into_iter().collect())
}

/// Validate that `name` is exactly one path segment.
pub fn single_segment(name: &str) -> StoreResult<&str> {
    match relative_segments(name)?.as_slice() {
        [segment] if *segment == name => Ok(*segment),
        _ => Err(StoreError::InvalidInput(format!(
            "'{}' must be a plain name without separators",
            name
        ))),
    }
}
