//! Packsync - content-addressed package storage and incremental updates
//!
//! This library lets a server distribute versioned file bundles to many
//! clients, each of which downloads only the files that changed since its
//! last synchronisation.
//!
//! # Overview
//!
//! ```text
//! client manifest ──► DiffEngine ◄── ManifestBuilder ◄── packages/<id>/
//!                         │
//!                         ▼ toDownload
//!                   UpdateStager ──► temp/<handle>/  (expires after retention)
//!                         │
//!                         ▼ redeem(handle)
//!                   ContentStore ──► ZIP of staged files + full manifest
//! ```
//!
//! - [`storage`] - storage root layout and path resolution
//! - [`manifest`] - directory walking, SHA-512 digests, manifest model
//! - [`diff`] - manifest comparison
//! - [`store`] - archive and file ingestion, file and archive serving
//! - [`staging`] - staged updates, expiring registry, sweeper
//! - [`update`] - check-for-updates and download flows
//!
//! # Example
//!
//! ```ignore
//! use packsync::{config::StoreConfig, update::UpdateService};
//!
//! let service = UpdateService::from_config(&StoreConfig::new("/srv/packsync"))?;
//! let check = service.check_for_updates_json("pack", client_body).await?;
//! if let Some(handle) = &check.download_link {
//!     let archive = service.download_update(handle).await?;
//! }
//! ```

mod batch;

pub mod config;
pub mod diff;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod staging;
pub mod storage;
pub mod store;
pub mod update;

pub use error::{ErrorKind, StoreError, StoreResult};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
