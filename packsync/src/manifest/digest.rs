//! SHA-512 content digests.
//!
//! Both peers must hash with the identical algorithm or every file in
//! every comparison shows up as changed, so the algorithm is fixed.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::error::{StoreError, StoreResult};

/// Key under which digests appear in the manifest `hashes` object.
pub const DIGEST_ALGORITHM: &str = "sha-512";

/// Buffer size for streaming file hashes (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Hex-encoded SHA-512 of a byte sequence.
///
/// Digests received from peers are kept verbatim; no format check is made
/// so that a malformed client digest simply compares unequal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Wrap an existing hex digest.
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Digest of an in-memory buffer.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha512::digest(bytes)))
    }

    /// Digest of everything readable from `reader`, plus the byte count.
    pub fn of_reader<R: Read>(mut reader: R) -> io::Result<(Self, u64)> {
        let mut hasher = Sha512::new();
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut total = 0u64;

        loop {
            let read = reader.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
            total += read as u64;
        }

        Ok((Self(format!("{:x}", hasher.finalize())), total))
    }

    /// Digest and size of a file on disk.
    pub fn of_file(path: &Path) -> StoreResult<(Self, u64)> {
        let file = File::open(path).map_err(|e| StoreError::io("open", path, e))?;
        Self::of_reader(file).map_err(|e| StoreError::io("hash", path, e))
    }

    /// The hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
