//! Resource naming rules.
//!
//! Resource ids name directories directly below a storage location, so they
//! are restricted to a conservative character set:
//! - first character alphanumeric
//! - remaining characters alphanumeric, `.`, `_` or `-`

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{StoreError, StoreResult};

/// Archive suffix stripped from declared upload names.
pub const ARCHIVE_SUFFIX: &str = ".zip";

fn resource_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap())
}

/// Check whether `id` is a valid resource id.
///
/// # Examples
///
/// ```
/// use packsync::store::is_valid_resource_id;
///
/// assert!(is_valid_resource_id("pack"));
/// assert!(is_valid_resource_id("Pack-1.20_forge"));
/// assert!(!is_valid_resource_id(".hidden"));
/// assert!(!is_valid_resource_id("a/b"));
/// ```
pub fn is_valid_resource_id(id: &str) -> bool {
    resource_id_pattern().is_match(id)
}

/// Validate a resource id, returning it unchanged.
pub fn validate_resource_id(id: &str) -> StoreResult<&str> {
    if is_valid_resource_id(id) {
        Ok(id)
    } else {
        Err(StoreError::InvalidInput(format!("invalid resource id '{}'", id)))
    }
}

/// Derive a resource id from the declared name of an uploaded archive.
///
/// A trailing `.zip` (any case) is removed.
///
/// # Examples
///
/// ```
/// use packsync::store::resource_id_from_archive_name;
///
/// assert_eq!(resource_id_from_archive_name("pack.zip").unwrap(), "pack");
/// assert_eq!(resource_id_from_archive_name("Pack.ZIP").unwrap(), "Pack");
/// assert_eq!(resource_id_from_archive_name("pack-1.2").unwrap(), "pack-1.2");
/// assert!(resource_id_from_archive_name(".zip").is_err());
/// ```
pub fn resource_id_from_archive_name(declared_name: &str) -> StoreResult<String> {
    let trimmed = declared_name.trim();
    let split = trimmed.len().saturating_sub(ARCHIVE_SUFFIX.len());
    let id = match trimmed.get(split..) {
        Some(suffix) if suffix.eq_ignore_ascii_case(ARCHIVE_SUFFIX) => &trimmed[..split],
        _ => trimmed,
    };
    validate_resource_id(id).map(str::to_string)
}
