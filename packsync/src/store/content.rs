//! Content store: ingestion and serving of stored resources.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, error, info};

use super::archive::{
    entry_name, write_archive, ArchiveReader, ArchiveSource, DESCRIPTOR_ENTRY, MAX_DESCRIPTOR_SIZE,
};
use super::descriptor::PackageDescriptor;
use super::naming::resource_id_from_archive_name;
use crate::batch::run_batch;
use crate::config::StoreConfig;
use crate::error::{blocking, StoreError, StoreResult};
use crate::manifest::{walk_files, ContentDigest, Manifest, ManifestBuilder};
use crate::storage::{single_segment, PathResolver, StorageLocation};

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name the client supplied.
    pub original_name: String,
    /// File contents.
    pub bytes: Bytes,
}

impl UploadedFile {
    /// Create an upload from an in-memory buffer.
    pub fn new(original_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            original_name: original_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read an upload from a local file, named after its final path segment.
    pub async fn from_path(path: &Path) -> StoreResult<Self> {
        let original_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::InvalidInput(format!("no file name in {}", path.display())))?
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| StoreError::io("read", path, e))?;
        Ok(Self::new(original_name, bytes))
    }
}

/// Result of a descriptor-validated package ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedPackage {
    /// Directory name the package was extracted to.
    pub resource_id: String,
    /// Validated descriptor.
    pub descriptor: PackageDescriptor,
}

/// Archive ingestion, deduplicating file ingestion and resource serving.
///
/// All filesystem work runs on the blocking pool; per-file work is bounded
/// by `max_concurrent_io`.
#[derive(Debug, Clone)]
pub struct ContentStore {
    resolver: PathResolver,
    builder: ManifestBuilder,
    max_concurrent_io: usize,
}

impl ContentStore {
    /// Create a store over `resolver`.
    pub fn new(resolver: PathResolver, max_concurrent_io: usize) -> Self {
        let max_concurrent_io = max_concurrent_io.max(1);
        Self {
            builder: ManifestBuilder::new(resolver.clone(), max_concurrent_io),
            resolver,
            max_concurrent_io,
        }
    }

    /// Create a store from configuration.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(PathResolver::new(&config.root), config.max_concurrent_io)
    }

    /// The path resolver.
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// The manifest builder sharing this store's resolver.
    pub fn manifest_builder(&self) -> &ManifestBuilder {
        &self.builder
    }

    /// Extract an uploaded ZIP into `<location>/<resource id>`.
    ///
    /// The resource id is `declared_name` without a trailing `.zip`.
    /// Every entry name is validated before anything is written. Existing
    /// files are overwritten; nothing is rolled back on failure.
    pub async fn ingest_archive(
        &self,
        location: StorageLocation,
        archive: Bytes,
        declared_name: &str,
    ) -> StoreResult<String> {
        if archive.is_empty() {
            return Err(StoreError::InvalidInput("archive is empty".to_string()));
        }
        let resource_id = resource_id_from_archive_name(declared_name)?;
        let dest = self.resolver.resource_dir(location, &resource_id)?;

        let reader = blocking(move || ArchiveReader::open(archive)).await?;
        let written = self.extract_into(reader, dest, &resource_id).await?;

        info!(resource = %resource_id, %location, files = written, "Ingested archive");
        Ok(resource_id)
    }

    /// Ingest a package archive after validating its descriptor.
    ///
    /// The archive must carry a descriptor whose thumbnail and screenshots
    /// name entries of the same archive. The descriptor itself is extracted
    /// with the rest of the tree.
    pub async fn ingest_package(
        &self,
        location: StorageLocation,
        archive: Bytes,
        declared_name: &str,
    ) -> StoreResult<IngestedPackage> {
        if archive.is_empty() {
            return Err(StoreError::InvalidInput("archive is empty".to_string()));
        }
        let resource_id = resource_id_from_archive_name(declared_name)?;
        let dest = self.resolver.resource_dir(location, &resource_id)?;

        let (reader, descriptor) = blocking(move || {
            let mut reader = ArchiveReader::open(archive)?;
            let raw = reader.read(DESCRIPTOR_ENTRY, MAX_DESCRIPTOR_SIZE)?.ok_or_else(|| {
                StoreError::Descriptor(format!("archive has no {} entry", DESCRIPTOR_ENTRY))
            })?;
            let descriptor = PackageDescriptor::from_slice(&raw)?;
            descriptor.validate(&reader.file_names()?)?;
            Ok((reader, descriptor))
        })
        .await
        .inspect_err(|e| error!(resource = %resource_id, error = %e, "Rejected package"))?;

        let written = self.extract_into(reader, dest, &resource_id).await?;

        info!(
            resource = %resource_id,
            %location,
            files = written,
            name = %descriptor.name,
            version = %descriptor.version,
            "Ingested package"
        );
        Ok(IngestedPackage {
            resource_id,
            descriptor,
        })
    }

    async fn extract_into(&self, mut reader: ArchiveReader, dest: PathBuf, resource_id: &str) -> StoreResult<usize> {
        blocking(move || {
            // Validate before creating anything
            reader.files()?;
            std::fs::create_dir_all(&dest).map_err(|e| StoreError::io("create directory", &dest, e))?;
            reader.extract(&dest)
        })
        .await
        .inspect_err(|e| error!(resource = %resource_id, error = %e, "Failed to extract archive"))
    }

    /// Store a single file, reusing an identical existing file if present.
    ///
    /// With `preserve_original_name` the file keeps its client name;
    /// otherwise a UUID name with the original extension is generated.
    /// Before writing, every regular file in the location directory is
    /// compared by size and then SHA-512; on a match the existing name is
    /// returned and nothing is written.
    pub async fn ingest_file(
        &self,
        file: UploadedFile,
        location: StorageLocation,
        preserve_original_name: bool,
    ) -> StoreResult<String> {
        let name = if preserve_original_name {
            single_segment(&file.original_name)?.to_string()
        } else {
            self.resolver.generate_name(&file.original_name)?
        };

        let bytes = file.bytes.clone();
        let digest = blocking(move || Ok(ContentDigest::of_bytes(&bytes))).await?;
        let size = file.bytes.len() as u64;

        let dir = self.resolver.location_dir(location);
        if let Some(existing) = self.find_duplicate(&dir, size, &digest).await? {
            debug!(%location, name = %existing, "Reusing identical stored file");
            return Ok(existing);
        }

        let path = self.resolver.resolve(&name, location).await?;
        tokio::fs::write(&path, &file.bytes).await.map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to write file");
            StoreError::io("write", &path, e)
        })?;

        info!(%location, name = %name, size, "Stored file");
        Ok(name)
    }

    /// Name of a regular file directly inside `dir` with identical content.
    async fn find_duplicate(&self, dir: &Path, size: u64, digest: &ContentDigest) -> StoreResult<Option<String>> {
        let scan_dir = dir.to_path_buf();
        let candidates = blocking(move || list_same_size(&scan_dir, size)).await?;
        if candidates.is_empty() {
            return Ok(None);
        }

        let mut matches = run_batch(candidates, self.max_concurrent_io, |(name, path)| async move {
            let (candidate, _) = blocking(move || ContentDigest::of_file(&path)).await?;
            Ok((name, candidate))
        })
        .await?
        .into_iter()
        .filter(|(_, candidate)| candidate == digest)
        .map(|(name, _)| name)
        .collect::<Vec<_>>();

        matches.sort();
        Ok(matches.into_iter().next())
    }

    /// Raw bytes of a stored file.
    pub async fn fetch_file(&self, name: &str, location: StorageLocation) -> StoreResult<Bytes> {
        let path = self.resolver.location_dir(location).join(single_segment(name)?);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(format!(
                "file '{}' in {}",
                name, location
            ))),
            Err(e) => Err(StoreError::io("read", &path, e)),
        }
    }

    /// ZIP of a whole resource plus its embedded manifest.
    pub async fn fetch_archive(&self, resource_id: &str, location: StorageLocation) -> StoreResult<Bytes> {
        let dir = self.existing_dir(location, resource_id).await?;
        let manifest = self.builder.build(&dir, resource_id).await?;

        let sources = blocking(move || walk_files(&dir))
            .await?
            .into_iter()
            .map(|f| ArchiveSource {
                entry: entry_name(&f.manifest_path),
                path: f.absolute,
            })
            .collect();

        self.write(sources, manifest, resource_id).await
    }

    /// ZIP of a staged subset, embedding the manifest of the full resource.
    ///
    /// File bytes come from `<root>/temp/<staging_name>`.
    pub async fn fetch_update_archive(
        &self,
        resource_id: &str,
        location: StorageLocation,
        staging_name: &str,
    ) -> StoreResult<Bytes> {
        let staging_dir = self.existing_dir(StorageLocation::Temp, staging_name).await?;
        let resource_dir = self.existing_dir(location, resource_id).await?;
        let manifest = self.builder.build(&resource_dir, resource_id).await?;

        let sources = blocking(move || walk_files(&staging_dir))
            .await?
            .into_iter()
            .map(|f| ArchiveSource {
                entry: entry_name(&f.manifest_path),
                path: f.absolute,
            })
            .collect();

        self.write(sources, manifest, resource_id).await
    }

    async fn existing_dir(&self, location: StorageLocation, id: &str) -> StoreResult<PathBuf> {
        let dir = self.resolver.resource_dir(location, id)?;
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(StoreError::NotFound(format!("'{}' in {} is not a directory", id, location))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(format!("'{}' in {}", id, location)))
            }
            Err(e) => Err(StoreError::io("stat", &dir, e)),
        }
    }

    async fn write(&self, sources: Vec<ArchiveSource>, manifest: Manifest, resource_id: &str) -> StoreResult<Bytes> {
        let count = sources.len();
        let bytes = blocking(move || write_archive(&sources, &manifest))
            .await
            .inspect_err(|e| error!(resource = %resource_id, error = %e, "Failed to build archive"))?;
        debug!(resource = %resource_id, files = count, size = bytes.len(), "Built archive");
        Ok(bytes)
    }
}

/// Regular files directly inside `dir` whose length is `size`.
fn list_same_size(dir: &Path, size: u64) -> StoreResult<Vec<(String, PathBuf)>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io("list", dir, e)),
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io("list", dir, e))?;
        let file_type = entry.file_type().map_err(|e| StoreError::io("stat", entry.path(), e))?;
        if !file_type.is_file() {
            continue;
        }
        let len = entry
            .metadata()
            .map_err(|e| StoreError::io("stat", entry.path(), e))?
            .len();
        if len != size {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            candidates.push((name.to_string(), entry.path()));
        }
    }
    Ok(candidates)
}
