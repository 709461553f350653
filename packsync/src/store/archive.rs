//! ZIP codec for resource archives.
//!
//! Entry names inside archives always use `/`; names read from uploaded
//! archives may use either `/` or `\`. Every archive produced here carries
//! the manifest of the full resource tree under [`MANIFEST_ENTRY`].

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{StoreError, StoreResult};
use crate::manifest::{Manifest, MANIFEST_SEPARATOR};
use crate::storage::relative_segments;

/// Reserved entry holding the manifest JSON.
pub const MANIFEST_ENTRY: &str = "packsync-manifest.json";

/// Reserved entry holding the package descriptor JSON.
pub const DESCRIPTOR_ENTRY: &str = "packsync-descriptor.json";

/// Largest descriptor entry accepted from an uploaded archive.
pub const MAX_DESCRIPTOR_SIZE: u64 = 64 * 1024;

/// Convert a manifest path to a ZIP entry name.
pub fn entry_name(manifest_path: &str) -> String {
    manifest_path.replace(MANIFEST_SEPARATOR, "/")
}

/// Canonical `/`-joined form of an entry name, or `None` if it is unsafe.
pub fn normalize_entry_name(name: &str) -> Option<String> {
    relative_segments(name).ok().map(|segments| segments.join("/"))
}

/// A file to be written into an archive.
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    /// Entry name (`/` separated).
    pub entry: String,
    /// File on disk supplying the bytes.
    pub path: PathBuf,
}

/// Write `sources` plus the embedded manifest into an in-memory ZIP.
///
/// Blocking; call from a worker thread.
pub fn write_archive(sources: &[ArchiveSource], manifest: &Manifest) -> StoreResult<Bytes> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for source in sources {
        let mut file = File::open(&source.path).map_err(|e| StoreError::io("open", &source.path, e))?;
        let len = file.metadata().map(|m| m.len()).unwrap_or(0);

        zip.start_file(source.entry.as_str(), options.large_file(len > u32::MAX as u64))
            .map_err(|e| StoreError::archive(format!("adding {}", source.entry), e))?;
        io::copy(&mut file, &mut zip).map_err(|e| StoreError::io("archive", &source.path, e))?;
    }

    let manifest_json = manifest.to_json_pretty()?;
    zip.start_file(MANIFEST_ENTRY, options)
        .map_err(|e| StoreError::archive("adding manifest", e))?;
    zip.write_all(manifest_json.as_bytes())
        .map_err(|e| StoreError::archive("writing manifest", e.into()))?;

    let cursor = zip
        .finish()
        .map_err(|e| StoreError::archive("finalizing archive", e))?;

    debug!(entries = sources.len() + 1, "Wrote archive");
    Ok(Bytes::from(cursor.into_inner()))
}

/// One validated file entry of an uploaded archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedFile {
    /// Index inside the archive.
    pub index: usize,
    /// Canonical `/`-joined name.
    pub name: String,
    /// Relative destination path.
    pub relative: PathBuf,
}

/// Read side of the codec over an uploaded buffer.
pub struct ArchiveReader {
    archive: ZipArchive<Cursor<Bytes>>,
}

impl ArchiveReader {
    /// Open an archive. A buffer that is not a ZIP fails with an archive error.
    pub fn open(bytes: Bytes) -> StoreResult<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| StoreError::archive("opening archive", e))?;
        Ok(Self { archive })
    }

    /// Number of raw entries, directories included.
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    /// True when the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// Validate every entry name and list the file entries.
    ///
    /// Any entry that would land outside the destination fails the whole
    /// listing. Directory entries and the reserved manifest are omitted.
    pub fn files(&mut self) -> StoreResult<Vec<ArchivedFile>> {
        let mut files = Vec::new();
        for index in 0..self.archive.len() {
            let entry = self
                .archive
                .by_index_raw(index)
                .map_err(|e| StoreError::archive(format!("reading entry {}", index), e))?;

            let raw_name = entry.name().to_string();
            let is_dir = entry.is_dir();
            drop(entry);

            let segments = relative_segments(&raw_name).map_err(|_| {
                StoreError::InvalidInput(format!("archive entry '{}' escapes its destination", raw_name))
            })?;
            if is_dir {
                continue;
            }

            let name = segments.join("/");
            if name == MANIFEST_ENTRY {
                continue;
            }
            files.push(ArchivedFile {
                index,
                relative: segments.iter().collect(),
                name,
            });
        }
        Ok(files)
    }

    /// Canonical names of every file entry.
    pub fn file_names(&mut self) -> StoreResult<HashSet<String>> {
        Ok(self.files()?.into_iter().map(|f| f.name).collect())
    }

    /// Read one entry fully, by canonical name. `None` if absent.
    ///
    /// At most `limit` bytes are read; a larger entry is `InvalidInput`
    /// whatever size its header declares.
    pub fn read(&mut self, name: &str, limit: u64) -> StoreResult<Option<Vec<u8>>> {
        let Some(file) = self.files()?.into_iter().find(|f| f.name == name) else {
            return Ok(None);
        };
        let entry = self
            .archive
            .by_index(file.index)
            .map_err(|e| StoreError::archive(format!("reading {}", name), e))?;

        let mut buffer = Vec::with_capacity(entry.size().min(limit) as usize);
        entry
            .take(limit.saturating_add(1))
            .read_to_end(&mut buffer)
            .map_err(|e| StoreError::archive(format!("reading {}", name), e.into()))?;
        if buffer.len() as u64 > limit {
            return Err(StoreError::InvalidInput(format!(
                "entry '{}' exceeds {} bytes",
                name, limit
            )));
        }
        Ok(Some(buffer))
    }

    /// Extract every file entry below `dest`, returning the count written.
    ///
    /// All names are validated before the first byte is written.
    pub fn extract(&mut self, dest: &Path) -> StoreResult<usize> {
        let files = self.files()?;

        for file in &files {
            let out_path = dest.join(&file.relative);
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).map_err(|e| StoreError::io("create directory", parent, e))?;
            }

            let mut entry = self
                .archive
                .by_index(file.index)
                .map_err(|e| StoreError::archive(format!("reading {}", file.name), e))?;
            let mut out = File::create(&out_path).map_err(|e| StoreError::io("create", &out_path, e))?;
            io::copy(&mut entry, &mut out).map_err(|e| StoreError::io("extract", &out_path, e))?;

            debug!(entry = %file.name, path = %out_path.display(), "Extracted entry");
        }

        Ok(files.len())
    }
}
