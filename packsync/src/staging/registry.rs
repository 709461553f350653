//! Expiring handle registry.
//!
//! Maps opaque handles to staged updates. The registry is shared between
//! request paths and the background sweeper, and is optionally mirrored to a
//! JSON file so registrations survive restarts and are visible to separate
//! processes sharing the same storage root.
//!
//! The file is the source of truth. Every mutation takes an exclusive
//! advisory lock on `<file>.lock`, re-reads the file, applies the change and
//! rewrites it. Lookups answer from the in-memory copy as of the last
//! [`HandleRegistry::reload`] or mutation.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fs4::FileExt;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::error::{StoreError, StoreResult};
use crate::storage::StorageLocation;

/// Name of the persisted registry file inside the temp location.
pub const REGISTRY_FILE: &str = ".handles.json";

/// The stored resource an update was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Storage location of the resource.
    pub location: StorageLocation,
    /// Resource id within the location.
    pub id: String,
}

impl ResourceRef {
    /// Create a reference.
    pub fn new(location: StorageLocation, id: impl Into<String>) -> Self {
        Self {
            location,
            id: id.into(),
        }
    }

    /// A resource in the packages location.
    pub fn package(id: impl Into<String>) -> Self {
        Self::new(StorageLocation::Packages, id)
    }
}

/// A registered staging directory with its deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedUpdate {
    /// Opaque token handed to the client.
    pub handle: String,

    /// Directory holding the staged files.
    pub staging_path: PathBuf,

    /// Resource the staged files were copied from.
    pub source: ResourceRef,

    /// Registration time.
    pub created_at: DateTime<Utc>,

    /// Time after which the handle is no longer redeemable.
    pub expires_at: DateTime<Utc>,

    /// Number of files copied into the staging directory.
    #[serde(default)]
    pub file_count: usize,
}

impl StagedUpdate {
    /// True once `now` has reached the deadline.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Concurrent handle -> staged update map.
#[derive(Debug)]
pub struct HandleRegistry {
    entries: DashMap<String, StagedUpdate>,
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

/// Held while a mutation reads, changes and rewrites the backing file.
struct WriteGuard<'a> {
    _local: MutexGuard<'a, ()>,
    _file: Option<File>,
}

impl HandleRegistry {
    /// Create a registry that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            entries: DashMap::new(),
            path: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Open a registry backed by `path`, loading existing registrations.
    ///
    /// A missing file starts an empty registry; an unreadable or corrupt
    /// file is an error.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let registry = Self {
            entries: DashMap::new(),
            path: Some(path.into()),
            write_lock: Mutex::new(()),
        };
        registry.reload()?;

        if let Some(path) = &registry.path {
            debug!(path = %path.display(), handles = registry.len(), "Opened staging registry");
        }
        Ok(registry)
    }

    /// Backing file, if persistent.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Replace the in-memory copy with the registrations on disk.
    ///
    /// No-op for in-memory registries.
    pub fn reload(&self) -> StoreResult<()> {
        let _local = self.write_lock.lock();
        self.load()
    }

    /// Reload without taking the write lock. Callers hold it.
    fn load(&self) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut on_disk: HashMap<String, StagedUpdate> = read_records(path)?
            .into_iter()
            .map(|record| (record.handle.clone(), record))
            .collect();

        self.entries.retain(|handle, _| on_disk.contains_key(handle));
        for (handle, record) in on_disk.drain() {
            self.entries.insert(handle, record);
        }
        trace!(path = %path.display(), handles = self.entries.len(), "Reloaded staging registry");
        Ok(())
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add or replace a registration and persist.
    pub fn insert(&self, update: StagedUpdate) -> StoreResult<()> {
        let _guard = self.lock()?;
        self.load()?;
        self.entries.insert(update.handle.clone(), update);
        self.persist()
    }

    /// Look up a registration.
    pub fn get(&self, handle: &str) -> Option<StagedUpdate> {
        self.entries.get(handle).map(|entry| entry.value().clone())
    }

    /// True if `handle` is registered.
    pub fn contains(&self, handle: &str) -> bool {
        self.entries.contains_key(handle)
    }

    /// Remove a registration and persist. Removing an unknown handle is a
    /// no-op that returns `None`.
    pub fn remove(&self, handle: &str) -> StoreResult<Option<StagedUpdate>> {
        let _guard = self.lock()?;
        self.load()?;
        let removed = self.entries.remove(handle).map(|(_, update)| update);
        if removed.is_some() {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Registrations whose deadline has passed at `now`.
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<StagedUpdate> {
        self.entries
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Snapshot of every registration, oldest first.
    pub fn snapshot(&self) -> Vec<StagedUpdate> {
        let mut all: Vec<_> = self.entries.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.handle.cmp(&b.handle)));
        all
    }

    /// Serialize writers: in-process first, then across processes.
    fn lock(&self) -> StoreResult<WriteGuard<'_>> {
        let local = self.write_lock.lock();
        let file = match &self.path {
            Some(path) => Some(lock_file(path)?),
            None => None,
        };
        Ok(WriteGuard {
            _local: local,
            _file: file,
        })
    }

    /// Rewrite the backing file atomically (temp file + rename). Callers
    /// hold the write guard.
    fn persist(&self) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let records = self.snapshot();

        let temp_path = path.with_extension("json.tmp");
        let file = File::create(&temp_path).map_err(|e| StoreError::io("create", &temp_path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &records)?;
        writer.flush().map_err(|e| StoreError::io("write", &temp_path, e))?;
        drop(writer);

        std::fs::rename(&temp_path, path).map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to persist staging registry");
            StoreError::io("rename", &temp_path, e)
        })
    }
}

fn read_records(path: &Path) -> StoreResult<Vec<StagedUpdate>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes).inspect_err(|e| {
            error!(path = %path.display(), error = %e, "Corrupt staging registry");
        })?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(StoreError::io("read", path, e)),
    }
}

/// Open `<registry>.lock` and block until it is held exclusively. The lock
/// is released when the returned file is closed.
fn lock_file(path: &Path) -> StoreResult<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::io("create directory", parent, e))?;
    }
    let lock_path = path.with_extension("json.lock");
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| StoreError::io("open", &lock_path, e))?;
    file.lock_exclusive()
        .map_err(|e| StoreError::io("lock", &lock_path, e))?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn update(handle: &str, created_at: DateTime<Utc>) -> StagedUpdate {
        StagedUpdate {
            handle: handle.to_string(),
            staging_path: PathBuf::from("/store/temp").join(handle),
            source: ResourceRef::package("pack"),
            created_at,
            expires_at: created_at + Duration::hours(1),
            file_count: 1,
        }
    }

    #[test]
    fn test_insert_get_remove() {
        let registry = HandleRegistry::in_memory();
        let now = Utc::now();
        registry.insert(update("h1", now)).unwrap();

        assert!(registry.contains("h1"));
        assert_eq!(registry.get("h1").unwrap().source.id, "pack");
        assert!(registry.remove("h1").unwrap().is_some());
        assert!(registry.remove("h1").unwrap().is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_expired_respects_deadline() {
        let registry = HandleRegistry::in_memory();
        let start = Utc::now();
        registry.insert(update("old", start - Duration::hours(2))).unwrap();
        registry.insert(update("new", start)).unwrap();

        let expired: Vec<_> = registry.expired(start).into_iter().map(|u| u.handle).collect();
        assert_eq!(expired, vec!["old"]);

        // Deadline itself counts as expired
        assert_eq!(registry.expired(start + Duration::hours(1)).len(), 2);
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("temp").join(REGISTRY_FILE);
        let now = Utc::now();

        {
            let registry = HandleRegistry::open(&path).unwrap();
            registry.insert(update("a", now)).unwrap();
            registry.insert(update("b", now)).unwrap();
            registry.remove("a").unwrap();
        }

        let reopened = HandleRegistry::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get("b").unwrap(), update("b", now));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_writers_sharing_a_file_keep_each_others_handles() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("temp").join(REGISTRY_FILE);
        let now = Utc::now();

        let stager_a = HandleRegistry::open(&path).unwrap();
        stager_a.insert(update("old", now - Duration::hours(2))).unwrap();

        // Opened before "fresh" exists anywhere
        let sweeper = HandleRegistry::open(&path).unwrap();

        let stager_b = HandleRegistry::open(&path).unwrap();
        stager_b.insert(update("fresh", now)).unwrap();

        assert_eq!(sweeper.remove("old").unwrap(), Some(update("old", now - Duration::hours(2))));
        assert!(sweeper.contains("fresh"));

        let reopened = HandleRegistry::open(&path).unwrap();
        assert_eq!(reopened.get("fresh").unwrap(), update("fresh", now));
        assert!(!reopened.contains("old"));
        assert!(!stager_a.contains("fresh"));
        stager_a.reload().unwrap();
        assert!(stager_a.contains("fresh"));
        assert!(!stager_a.contains("old"));
    }

    #[test]
    fn test_concurrent_inserts_from_separate_registries() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(REGISTRY_FILE);
        let now = Utc::now();

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let path = &path;
                scope.spawn(move || {
                    let registry = HandleRegistry::open(path).unwrap();
                    for i in 0..5 {
                        registry.insert(update(&format!("w{}-{}", worker, i), now)).unwrap();
                    }
                });
            }
        });

        assert_eq!(HandleRegistry::open(&path).unwrap().len(), 20);
    }

    #[test]
    fn test_corrupt_file_is_invalid_input() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(REGISTRY_FILE);
        std::fs::write(&path, b"[{ nope").unwrap();

        let err = HandleRegistry::open(&path).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_json_field_names() {
        let value = serde_json::to_value(update("h", Utc::now())).unwrap();
        assert!(value.get("stagingPath").is_some());
        assert!(value.get("expiresAt").is_some());
        assert_eq!(value["source"]["location"], "packages");
    }
}
