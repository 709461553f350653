//! Manifest comparison.
//!
//! The diff is a pure function of two manifests: it never touches disk and
//! never looks at manifest names.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::manifest::{ContentDigest, Manifest};

/// Paths a client must fetch or remove to match the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    /// Server paths missing on the client or with a different digest.
    pub to_download: Vec<String>,
    /// Client paths that no longer exist on the server.
    pub to_delete: Vec<String>,
}

impl DiffResult {
    /// True when the client is already in sync.
    pub fn is_empty(&self) -> bool {
        self.to_download.is_empty() && self.to_delete.is_empty()
    }
}

/// Stateless manifest comparator.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffEngine;

impl DiffEngine {
    /// Compare a client manifest against the server manifest.
    ///
    /// `to_download` follows the server's file order and `to_delete` the
    /// client's. Callers should treat both as sets.
    pub fn diff(client: &Manifest, server: &Manifest) -> DiffResult {
        let client_digests: HashMap<&str, &ContentDigest> = client.digests();
        let server_digests: HashMap<&str, &ContentDigest> = server.digests();

        let to_download = server
            .files
            .iter()
            .filter(|f| client_digests.get(f.path.as_str()) != Some(&f.digest()))
            .map(|f| f.path.clone())
            .collect();

        let to_delete = client
            .files
            .iter()
            .filter(|f| !server_digests.contains_key(f.path.as_str()))
            .map(|f| f.path.clone())
            .collect();

        DiffResult {
            to_download,
            to_delete,
        }
    }
}
