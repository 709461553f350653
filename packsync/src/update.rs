//! Update check and download flows.
//!
//! [`UpdateService`] wires the manifest builder, diff engine, stager and
//! content store into the two client-facing operations:
//!
//! 1. **Check** - diff the client manifest against the package on disk and,
//!    when anything must be downloaded, stage those files under a new handle.
//! 2. **Download** - redeem a handle for a ZIP of the staged files plus the
//!    manifest of the full package.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::StoreConfig;
use crate::diff::DiffEngine;
use crate::error::{StoreError, StoreResult};
use crate::manifest::Manifest;
use crate::staging::{ResourceRef, UpdateStager};
use crate::storage::StorageLocation;
use crate::store::ContentStore;

/// Result of an update check.
///
/// `download_link` and `server_manifest` are `None` when the client is
/// already up to date apart from deletions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheck {
    /// Server paths the client must fetch.
    pub to_download: Vec<String>,
    /// Client paths the client should remove.
    pub to_delete: Vec<String>,
    /// Handle to redeem for the update archive.
    pub download_link: Option<String>,
    /// Manifest of the full server package.
    pub server_manifest: Option<Manifest>,
}

impl UpdateCheck {
    /// True when the client needs neither downloads nor deletions.
    pub fn is_up_to_date(&self) -> bool {
        self.to_download.is_empty() && self.to_delete.is_empty()
    }
}

/// Facade over the engine components for package updates.
#[derive(Debug, Clone)]
pub struct UpdateService {
    store: ContentStore,
    stager: Arc<UpdateStager>,
}

impl UpdateService {
    /// Create a service from its parts.
    pub fn new(store: ContentStore, stager: Arc<UpdateStager>) -> Self {
        Self { store, stager }
    }

    /// Create a service from configuration, opening the persisted registry.
    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        Ok(Self::new(
            ContentStore::from_config(config),
            Arc::new(UpdateStager::new(config)?),
        ))
    }

    /// The content store.
    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// The stager, shareable with a [`StagingSweeper`](crate::staging::StagingSweeper).
    pub fn stager(&self) -> &Arc<UpdateStager> {
        &self.stager
    }

    /// Compare a client manifest against `packages/<resource_id>`.
    ///
    /// `NotFound` if the package directory does not exist; any other failure
    /// to stat it is an I/O error.
    pub async fn check_for_updates(&self, resource_id: &str, client: &Manifest) -> StoreResult<UpdateCheck> {
        let dir = self
            .store
            .resolver()
            .resource_dir(StorageLocation::Packages, resource_id)?;
        match tokio::fs::try_exists(&dir).await {
            Ok(true) => {}
            Ok(false) => return Err(StoreError::NotFound(format!("package '{}'", resource_id))),
            Err(e) => return Err(StoreError::io("stat", &dir, e)),
        }

        let server = self.store.manifest_builder().build(&dir, resource_id).await?;
        let diff = DiffEngine::diff(client, &server);

        let (download_link, server_manifest) = if diff.to_download.is_empty() {
            (None, None)
        } else {
            let staged = self
                .stager
                .stage(&diff.to_download, ResourceRef::package(resource_id))
                .await?;
            (Some(staged.handle), Some(server))
        };

        info!(
            resource = %resource_id,
            to_download = diff.to_download.len(),
            to_delete = diff.to_delete.len(),
            staged = download_link.is_some(),
            "Checked for updates"
        );

        Ok(UpdateCheck {
            to_download: diff.to_download,
            to_delete: diff.to_delete,
            download_link,
            server_manifest,
        })
    }

    /// Parse a client manifest body, then [`check_for_updates`](Self::check_for_updates).
    pub async fn check_for_updates_json(&self, resource_id: &str, body: &[u8]) -> StoreResult<UpdateCheck> {
        let client = Manifest::from_slice(body)?;
        self.check_for_updates(resource_id, &client).await
    }

    /// Redeem a handle for its update archive.
    pub async fn download_update(&self, handle: &str) -> StoreResult<Bytes> {
        self.stager.redeem(handle, &self.store).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::staging::{HandleRegistry, ManualClock};
    use crate::storage::PathResolver;
    use std::time::Duration;
    use tempfile::TempDir;

    fn service(temp: &TempDir) -> (UpdateService, ManualClock) {
        let clock = ManualClock::starting_now();
        let stager = UpdateStager::with_parts(
            PathResolver::new(temp.path()),
            HandleRegistry::in_memory(),
            Arc::new(clock.clone()),
            Duration::from_secs(3600),
            4,
        );
        let store = ContentStore::new(PathResolver::new(temp.path()), 4);
        (UpdateService::new(store, Arc::new(stager)), clock)
    }

    fn write(root: &std::path::Path, relative: &str, contents: &[u8]) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn test_up_to_date_client_gets_no_link() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("packages/pack"), "a.txt", b"a");
        let (service, _) = service(&temp);

        let server = service
            .store()
            .manifest_builder()
            .build_resource(StorageLocation::Packages, "pack")
            .await
            .unwrap();
        let check = service.check_for_updates("pack", &server).await.unwrap();

        assert!(check.is_up_to_date());
        assert!(check.download_link.is_none());
        assert!(check.server_manifest.is_none());
        assert!(service.stager().registry().is_empty());
    }

    #[tokio::test]
    async fn test_deletions_only_do_not_stage() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("packages/pack"), "a.txt", b"a");
        let (service, _) = service(&temp);

        let mut client = service
            .store()
            .manifest_builder()
            .build_resource(StorageLocation::Packages, "pack")
            .await
            .unwrap();
        client.files.push(crate::manifest::FileRecord::new(
            "stale.txt",
            1,
            crate::manifest::ContentDigest::new("X"),
        ));

        let check = service.check_for_updates("pack", &client).await.unwrap();
        assert_eq!(check.to_delete, vec!["stale.txt"]);
        assert!(check.download_link.is_none());
    }

    #[tokio::test]
    async fn test_missing_package_is_not_found() {
        let temp = TempDir::new().unwrap();
        let (service, _) = service(&temp);
        let err = service
            .check_for_updates("ghost", &Manifest::new("ghost"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_package_location_is_io_failure() {
        let temp = TempDir::new().unwrap();
        // A file where the packages directory should be
        std::fs::write(temp.path().join("packages"), b"not a directory").unwrap();
        let (service, _) = service(&temp);

        let err = service
            .check_for_updates("pack", &Manifest::new("pack"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }

    #[tokio::test]
    async fn test_malformed_client_body() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("packages/pack"), "a.txt", b"a");
        let (service, _) = service(&temp);

        let err = service.check_for_updates_json("pack", b"{ nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_download_after_expiry_is_not_found() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("packages/pack"), "a.txt", b"a");
        let (service, clock) = service(&temp);

        let check = service
            .check_for_updates("pack", &Manifest::new("pack"))
            .await
            .unwrap();
        let handle = check.download_link.unwrap();
        assert!(!service.download_update(&handle).await.unwrap().is_empty());

        clock.advance(Duration::from_secs(3600));
        let err = service.download_update(&handle).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_payload_uses_nulls() {
        let check = UpdateCheck {
            to_download: vec![],
            to_delete: vec!["x".into()],
            download_link: None,
            server_manifest: None,
        };
        let json = serde_json::to_value(&check).unwrap();
        assert!(json["downloadLink"].is_null());
        assert!(json["serverManifest"].is_null());
        assert_eq!(json["toDelete"][0], "x");
    }
}
