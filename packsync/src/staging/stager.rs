//! Staging of update subsets.
//!
//! A staged update is a temporary copy of the files a client must download,
//! laid out at their resource-relative paths under `<root>/temp/<handle>`.
//! The handle stays redeemable for the retention window; afterwards the
//! directory and its registration are reclaimed together.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::registry::{HandleRegistry, ResourceRef, StagedUpdate, REGISTRY_FILE};
use crate::batch::run_batch;
use crate::config::StoreConfig;
use crate::error::{blocking, StoreError, StoreResult};
use crate::manifest::{walk_files, WalkedFile, MANIFEST_SEPARATOR};
use crate::storage::{relative_segments, PathResolver, StorageLocation};
use crate::store::ContentStore;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Expired registrations reclaimed.
    pub expired: usize,
    /// Unregistered staging directories removed.
    pub orphans: usize,
    /// Reclaims that failed and will be retried on the next sweep.
    pub failed: usize,
}

impl SweepReport {
    /// Number of staging areas removed.
    pub fn reclaimed(&self) -> usize {
        self.expired + self.orphans
    }

    /// Accumulate another report.
    pub fn merge(&mut self, other: SweepReport) {
        self.expired += other.expired;
        self.orphans += other.orphans;
        self.failed += other.failed;
    }
}

/// Creates, resolves and reclaims staged updates.
#[derive(Debug)]
pub struct UpdateStager {
    resolver: PathResolver,
    registry: Arc<HandleRegistry>,
    clock: Arc<dyn Clock>,
    retention: Duration,
    max_concurrent_io: usize,
}

impl UpdateStager {
    /// Create a stager from configuration, with the registry persisted at
    /// `<root>/temp/.handles.json` and wall-clock deadlines.
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let resolver = PathResolver::new(&config.root);
        let registry = HandleRegistry::open(resolver.location_dir(StorageLocation::Temp).join(REGISTRY_FILE))?;
        Ok(Self::with_parts(
            resolver,
            registry,
            Arc::new(SystemClock),
            config.retention,
            config.max_concurrent_io,
        ))
    }

    /// Create a stager from explicit parts.
    pub fn with_parts(
        resolver: PathResolver,
        registry: HandleRegistry,
        clock: Arc<dyn Clock>,
        retention: Duration,
        max_concurrent_io: usize,
    ) -> Self {
        Self {
            resolver,
            registry: Arc::new(registry),
            clock,
            retention,
            max_concurrent_io: max_concurrent_io.max(1),
        }
    }

    /// The handle registry.
    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// The retention window.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Pick up registrations made by other processes sharing the root.
    async fn reload_registry(&self) -> StoreResult<()> {
        let registry = Arc::clone(&self.registry);
        blocking(move || registry.reload()).await
    }

    /// Copy `files` from `source` into a fresh staging directory and
    /// register a handle for it.
    ///
    /// Paths are in manifest form relative to the resource root. Unsafe
    /// paths and files that no longer exist are skipped with a warning.
    pub async fn stage(&self, files: &[String], source: ResourceRef) -> StoreResult<StagedUpdate> {
        if files.is_empty() {
            return Err(StoreError::InvalidInput("nothing to stage".to_string()));
        }

        let source_dir = self.resolver.resource_dir(source.location, &source.id)?;
        let handle = Uuid::new_v4().to_string();
        let staging_path = self.resolver.resource_dir(StorageLocation::Temp, &handle)?;

        tokio::fs::create_dir_all(&staging_path).await.map_err(|e| {
            error!(path = %staging_path.display(), error = %e, "Failed to create staging directory");
            StoreError::io("create directory", &staging_path, e)
        })?;

        let copied = match self.copy_all(files, &source_dir, &staging_path).await {
            Ok(copied) => copied,
            Err(e) => {
                error!(handle = %handle, resource = %source.id, error = %e, "Staging failed");
                remove_dir_tolerant(&staging_path).await.ok();
                return Err(e);
            }
        };

        let created_at = self.clock.now();
        let update = StagedUpdate {
            handle: handle.clone(),
            staging_path,
            source,
            created_at,
            expires_at: deadline(created_at, self.retention),
            file_count: copied,
        };

        let registry = Arc::clone(&self.registry);
        let record = update.clone();
        blocking(move || registry.insert(record)).await?;

        info!(
            handle = %handle,
            resource = %update.source.id,
            files = copied,
            requested = files.len(),
            expires_at = %update.expires_at,
            "Staged update"
        );
        Ok(update)
    }

    async fn copy_all(&self, files: &[String], source_dir: &Path, staging_path: &Path) -> StoreResult<usize> {
        let walk_root = source_dir.to_path_buf();
        let mut on_disk: HashMap<String, WalkedFile> = blocking(move || walk_files(&walk_root))
            .await?
            .into_iter()
            .map(|file| (file.manifest_path.clone(), file))
            .collect();

        let separator = MANIFEST_SEPARATOR.to_string();
        let mut seen = HashSet::new();
        let mut jobs: Vec<(String, PathBuf, PathBuf)> = Vec::with_capacity(files.len());
        for path in files {
            let key = match relative_segments(path) {
                Ok(segments) => segments.join(separator.as_str()),
                Err(e) => {
                    warn!(path = %path, error = %e, "Skipping unsafe staging path");
                    continue;
                }
            };
            if !seen.insert(key.clone()) {
                continue;
            }
            match on_disk.remove(&key) {
                Some(file) => jobs.push((path.clone(), file.absolute, staging_path.join(&file.relative))),
                None => warn!(path = %path, "Skipping missing staging source"),
            }
        }

        let results = run_batch(jobs, self.max_concurrent_io, |(path, from, to)| async move {
            blocking(move || copy_file(&path, &from, &to)).await
        })
        .await?;

        Ok(results.into_iter().filter(|copied| *copied).count())
    }

    /// Look up a live handle.
    ///
    /// Unknown handles are `NotFound`. A handle past its deadline is
    /// reclaimed on the spot and also reported as `NotFound`.
    pub async fn resolve(&self, handle: &str) -> StoreResult<StagedUpdate> {
        self.reload_registry().await?;
        let update = self
            .registry
            .get(handle)
            .ok_or_else(|| StoreError::NotFound(format!("update handle '{}'", handle)))?;

        if update.is_expired(self.clock.now()) {
            debug!(handle = %handle, "Handle expired on lookup");
            self.reclaim(handle).await?;
            return Err(StoreError::NotFound(format!("update handle '{}' has expired", handle)));
        }
        Ok(update)
    }

    /// Build the update archive for a live handle.
    ///
    /// A handle can be redeemed any number of times before it expires.
    pub async fn redeem(&self, handle: &str, store: &ContentStore) -> StoreResult<Bytes> {
        let update = self.resolve(handle).await?;
        let staging_name = update
            .staging_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&update.handle)
            .to_string();
        store
            .fetch_update_archive(&update.source.id, update.source.location, &staging_name)
            .await
    }

    /// Delete a handle's staging directory and registration.
    ///
    /// Either being already gone is not an error. Returns whether anything
    /// was removed.
    pub async fn reclaim(&self, handle: &str) -> StoreResult<bool> {
        let staging_path = match self.registry.get(handle) {
            Some(update) => update.staging_path,
            None => self.resolver.resource_dir(StorageLocation::Temp, handle)?,
        };

        let removed_dir = remove_dir_tolerant(&staging_path).await?;

        let registry = Arc::clone(&self.registry);
        let key = handle.to_string();
        let removed_entry = blocking(move || registry.remove(&key)).await?.is_some();

        if removed_dir || removed_entry {
            debug!(handle = %handle, "Reclaimed staged update");
        }
        Ok(removed_dir || removed_entry)
    }

    /// Reclaim every expired handle and every orphaned staging directory
    /// older than the retention window.
    ///
    /// Registration deadlines are checked against the stager's [`Clock`].
    /// Orphan age compares the directory mtime with wall-clock time.
    ///
    /// Individual failures are logged and counted, never returned.
    pub async fn sweep(&self) -> StoreResult<SweepReport> {
        self.reload_registry().await?;
        let now = self.clock.now();
        let wall_now = Utc::now();
        let mut report = SweepReport::default();

        for update in self.registry.expired(now) {
            match self.reclaim(&update.handle).await {
                Ok(_) => report.expired += 1,
                Err(e) => {
                    warn!(handle = %update.handle, error = %e, "Failed to reclaim expired update");
                    report.failed += 1;
                }
            }
        }

        let temp_dir = self.resolver.location_dir(StorageLocation::Temp);
        let dirs = blocking(move || list_dirs(&temp_dir)).await?;
        for (name, path, modified) in dirs {
            if self.registry.contains(&name) {
                continue;
            }
            if deadline(modified, self.retention) > wall_now {
                continue;
            }
            match remove_dir_tolerant(&path).await {
                Ok(_) => {
                    debug!(path = %path.display(), "Removed orphaned staging directory");
                    report.orphans += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove orphaned staging directory");
                    report.failed += 1;
                }
            }
        }

        if report.reclaimed() > 0 || report.failed > 0 {
            info!(
                expired = report.expired,
                orphans = report.orphans,
                failed = report.failed,
                "Staging sweep complete"
            );
        }
        Ok(report)
    }
}

fn deadline(from: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(retention)
        .ok()
        .and_then(|d| from.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Copy one staged file. Returns false when the source is missing or not a
/// regular file.
fn copy_file(path: &str, from: &Path, to: &Path) -> StoreResult<bool> {
    match std::fs::metadata(from) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => {
            warn!(path = %path, "Skipping staging path that is not a regular file");
            return Ok(false);
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path, "Skipping missing staging source");
            return Ok(false);
        }
        Err(e) => return Err(StoreError::io("stat", from, e)),
    }

    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::io("create directory", parent, e))?;
    }
    std::fs::copy(from, to).map_err(|e| StoreError::io("copy", from, e))?;
    debug!(path = %path, "Staged file");
    Ok(true)
}

async fn remove_dir_tolerant(path: &Path) -> StoreResult<bool> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io("remove", path, e)),
    }
}

/// Sub-directories of the temp location with their modification times.
fn list_dirs(dir: &Path) -> StoreResult<Vec<(String, PathBuf, DateTime<Utc>)>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io("list", dir, e)),
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io("list", dir, e))?;
        let meta = entry.metadata().map_err(|e| StoreError::io("stat", entry.path(), e))?;
        if !meta.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let modified = meta.modified().unwrap_or_else(|_| SystemTime::now());
        dirs.push((name, entry.path(), DateTime::<Utc>::from(modified)));
    }
    Ok(dirs)
}
