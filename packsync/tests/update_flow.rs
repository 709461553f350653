//! Integration tests for the storage and update engine.
//!
//! These tests drive the public API end to end:
//! - Upload archive → manifest → diff → stage → download archive
//! - Archive round-trip through ingest and fetch
//! - Deduplicated file ingestion
//! - Staging expiry with a persisted registry
//!
//! Run with: `cargo test --test update_flow`

use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rand::RngCore;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use packsync::config::StoreConfig;
use packsync::diff::DiffEngine;
use packsync::manifest::{ContentDigest, FileRecord, Manifest, ManifestBuilder};
use packsync::staging::{HandleRegistry, ManualClock, ResourceRef, UpdateStager, REGISTRY_FILE};
use packsync::storage::{PathResolver, StorageLocation};
use packsync::store::{ContentStore, UploadedFile, MANIFEST_ENTRY};
use packsync::update::UpdateService;
use packsync::ErrorKind;

// ============================================================================
// Helper Functions
// ============================================================================

fn write(root: &Path, relative: &str, contents: &[u8]) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn zip_of(entries: &[(&str, Vec<u8>)]) -> Bytes {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    Bytes::from(zip.finish().unwrap().into_inner())
}

/// Entry name -> bytes for every entry of an archive.
fn unzip(bytes: Bytes) -> BTreeMap<String, Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut out = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        out.insert(entry.name().to_string(), data);
    }
    out
}

fn pairs(manifest: &Manifest) -> HashSet<(String, ContentDigest)> {
    manifest
        .files
        .iter()
        .map(|f| (f.path.clone(), f.digest().clone()))
        .collect()
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::rng().fill_bytes(&mut data);
    data
}

fn service_with_clock(root: &Path) -> (UpdateService, ManualClock) {
    let clock = ManualClock::starting_now();
    let stager = UpdateStager::with_parts(
        PathResolver::new(root),
        HandleRegistry::in_memory(),
        Arc::new(clock.clone()),
        Duration::from_secs(3600),
        8,
    );
    let store = ContentStore::new(PathResolver::new(root), 8);
    (UpdateService::new(store, Arc::new(stager)), clock)
}

// ============================================================================
// End-to-end update flow
// ============================================================================

#[tokio::test]
async fn test_client_missing_one_file_downloads_only_that_file() {
    let temp = TempDir::new().unwrap();
    let (service, _) = service_with_clock(temp.path());

    service
        .store()
        .ingest_archive(
            StorageLocation::Packages,
            zip_of(&[("mods/a.jar", b"jar-a".to_vec()), ("mods/b.jar", b"jar-b".to_vec())]),
            "pack.zip",
        )
        .await
        .unwrap();

    let client = Manifest::with_files(
        "pack",
        vec![FileRecord::new("mods\\a.jar", 5, ContentDigest::of_bytes(b"jar-a"))],
    );
    let body = serde_json::to_vec(&client).unwrap();
    let check = service.check_for_updates_json("pack", &body).await.unwrap();

    assert_eq!(check.to_download, vec!["mods\\b.jar"]);
    assert!(check.to_delete.is_empty());
    let server_manifest = check.server_manifest.as_ref().unwrap();
    assert_eq!(server_manifest.len(), 2);

    let handle = check.download_link.clone().unwrap();
    let entries = unzip(service.download_update(&handle).await.unwrap());

    let names: HashSet<_> = entries.keys().cloned().collect();
    assert_eq!(
        names,
        HashSet::from(["mods/b.jar".to_string(), MANIFEST_ENTRY.to_string()])
    );
    assert_eq!(entries["mods/b.jar"], b"jar-b");

    let embedded = Manifest::from_slice(&entries[MANIFEST_ENTRY]).unwrap();
    assert_eq!(embedded.name, "pack");
    assert_eq!(pairs(&embedded), pairs(server_manifest));
    assert!(embedded.get("mods\\a.jar").is_some());
    assert!(embedded.get("mods\\b.jar").is_some());
}

#[tokio::test]
async fn test_applying_update_brings_client_in_sync() {
    let temp = TempDir::new().unwrap();
    let (service, _) = service_with_clock(temp.path());

    let server_dir = temp.path().join("packages/pack");
    write(&server_dir, "mods/keep.jar", b"keep");
    write(&server_dir, "mods/changed.jar", b"new");
    write(&server_dir, "config/added.toml", b"added");

    let client_dir = temp.path().join("client");
    write(&client_dir, "mods/keep.jar", b"keep");
    write(&client_dir, "mods/changed.jar", b"old");
    write(&client_dir, "mods/removed.jar", b"gone");

    let builder = ManifestBuilder::new(PathResolver::new(temp.path()), 4);
    let client = builder.build(&client_dir, "pack").await.unwrap();
    let check = service.check_for_updates("pack", &client).await.unwrap();

    let mut to_download = check.to_download.clone();
    to_download.sort();
    assert_eq!(to_download, vec!["config\\added.toml", "mods\\changed.jar"]);
    assert_eq!(check.to_delete, vec!["mods\\removed.jar"]);

    // Apply the update the way a client would
    let archive = service
        .download_update(check.download_link.as_deref().unwrap())
        .await
        .unwrap();
    for (name, data) in unzip(archive) {
        if name != MANIFEST_ENTRY {
            write(&client_dir, &name, &data);
        }
    }
    for path in &check.to_delete {
        std::fs::remove_file(client_dir.join(path.replace('\\', "/"))).unwrap();
    }

    let synced = builder.build(&client_dir, "pack").await.unwrap();
    let server = builder.build(&server_dir, "pack").await.unwrap();
    assert!(DiffEngine::diff(&synced, &server).is_empty());
}

// ============================================================================
// Archive round-trip
// ============================================================================

#[tokio::test]
async fn test_archive_round_trip_preserves_manifest() {
    let temp = TempDir::new().unwrap();
    let store = ContentStore::new(PathResolver::new(temp.path()), 8);

    let source = temp.path().join("packages/original");
    for i in 0..12 {
        let dir = if i % 3 == 0 { "deep/nested" } else { "flat" };
        write(&source, &format!("{}/file-{}.bin", dir, i), &random_bytes(1024 + i * 37));
    }
    write(&source, "empty.txt", b"");

    let original = store
        .manifest_builder()
        .build_resource(StorageLocation::Packages, "original")
        .await
        .unwrap();
    let archive = store
        .fetch_archive("original", StorageLocation::Packages)
        .await
        .unwrap();

    let id = store
        .ingest_archive(StorageLocation::Packages, archive, "copy.zip")
        .await
        .unwrap();
    assert_eq!(id, "copy");

    let copy = store
        .manifest_builder()
        .build_resource(StorageLocation::Packages, "copy")
        .await
        .unwrap();
    assert_eq!(pairs(&original), pairs(&copy));
    assert!(!temp.path().join("packages/copy").join(MANIFEST_ENTRY).exists());
}

// ============================================================================
// Deduplicated ingestion
// ============================================================================

#[tokio::test]
async fn test_same_content_is_stored_once() {
    let temp = TempDir::new().unwrap();
    let store = ContentStore::new(PathResolver::new(temp.path()), 8);
    let content = random_bytes(4096);

    let mut names = HashSet::new();
    for original in ["skin.png", "copy.png", "again.png"] {
        let name = store
            .ingest_file(
                UploadedFile::new(original, content.clone()),
                StorageLocation::PlayerAssets,
                false,
            )
            .await
            .unwrap();
        names.insert(name);
    }

    assert_eq!(names.len(), 1);
    let stored = std::fs::read_dir(temp.path().join("player-assets")).unwrap().count();
    assert_eq!(stored, 1);

    let name = names.into_iter().next().unwrap();
    let fetched = store.fetch_file(&name, StorageLocation::PlayerAssets).await.unwrap();
    assert_eq!(fetched.as_ref(), content.as_slice());
}

// ============================================================================
// Staging expiry
// ============================================================================

#[tokio::test]
async fn test_handle_expires_after_retention() {
    let temp = TempDir::new().unwrap();
    write(&temp.path().join("packages/pack"), "a.txt", b"a");
    let (service, clock) = service_with_clock(temp.path());

    let check = service
        .check_for_updates("pack", &Manifest::new("pack"))
        .await
        .unwrap();
    let handle = check.download_link.unwrap();
    let staging = temp.path().join("temp").join(&handle);
    assert!(staging.is_dir());

    clock.advance(Duration::from_secs(3599));
    assert!(service.stager().resolve(&handle).await.is_ok());

    clock.advance(Duration::from_secs(1));
    let err = service.stager().resolve(&handle).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(!staging.exists());
}

#[tokio::test]
async fn test_registry_is_shared_through_storage_root() {
    let temp = TempDir::new().unwrap();
    write(&temp.path().join("packages/pack"), "mods/a.jar", b"a");
    let config = StoreConfig::new(temp.path()).with_retention(Duration::from_secs(600));

    let handle = {
        let service = UpdateService::from_config(&config).unwrap();
        let check = service
            .check_for_updates("pack", &Manifest::new("pack"))
            .await
            .unwrap();
        check.download_link.unwrap()
    };
    assert!(temp.path().join("temp").join(REGISTRY_FILE).is_file());

    // A second instance over the same root sees the registration
    let service = UpdateService::from_config(&config).unwrap();
    let staged = service.stager().resolve(&handle).await.unwrap();
    assert_eq!(staged.source, ResourceRef::package("pack"));

    let entries = unzip(service.download_update(&handle).await.unwrap());
    assert_eq!(entries["mods/a.jar"], b"a");

    assert!(service.stager().reclaim(&handle).await.unwrap());
    let reopened = UpdateStager::new(&config).unwrap();
    assert!(reopened.registry().is_empty());
}

#[tokio::test]
async fn test_missing_directory_yields_empty_manifest() {
    let temp = TempDir::new().unwrap();
    let builder = ManifestBuilder::new(PathResolver::new(temp.path()), 4);

    let manifest = builder
        .build(&temp.path().join("nowhere"), "X")
        .await
        .unwrap();
    assert_eq!(manifest.name, "X");
    assert!(manifest.files.is_empty());
}
