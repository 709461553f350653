//! Content storage.
//!
//! This module handles:
//! - Extracting uploaded ZIP archives into resource directories
//! - Validating package descriptors before extraction
//! - Deduplicated single-file ingestion
//! - Serving raw files, resource archives and staged update archives

mod archive;
mod content;
mod descriptor;
mod naming;

pub use archive::{
    entry_name, normalize_entry_name, write_archive, ArchiveReader, ArchiveSource, ArchivedFile,
    DESCRIPTOR_ENTRY, MANIFEST_ENTRY, MAX_DESCRIPTOR_SIZE,
};
pub use content::{ContentStore, IngestedPackage, UploadedFile};
pub use descriptor::{PackageDescriptor, DESCRIPTOR_FORMAT_VERSION};
pub use naming::{is_valid_resource_id, resource_id_from_archive_name, validate_resource_id, ARCHIVE_SUFFIX};
