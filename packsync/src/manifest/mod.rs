//! Directory manifests.
//!
//! A [`Manifest`] is a flat list of every regular file below a tracked root,
//! each with its size and SHA-512 digest. Manifests are built on demand by
//! [`ManifestBuilder`] and never persisted; they travel as JSON between
//! client and server and inside download archives.
//!
//! # Example
//!
//! ```ignore
//! use packsync::manifest::ManifestBuilder;
//! use packsync::storage::{PathResolver, StorageLocation};
//!
//! let builder = ManifestBuilder::new(PathResolver::new("/srv/packsync"), 16);
//! let manifest = builder.build_resource(StorageLocation::Packages, "pack").await?;
//! println!("{} files, {} bytes", manifest.len(), manifest.total_size());
//! ```

mod builder;
mod digest;
mod types;

pub use builder::{walk_files, ManifestBuilder, WalkedFile};
pub use digest::{ContentDigest, DIGEST_ALGORITHM};
pub use types::{
    manifest_path, FileHashes, FileRecord, Manifest, ManifestTree, TreeFile, MANIFEST_SEPARATOR,
};
