//! Repository fingerprinting for environment cache keys.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::Result;

/// Number of hex characters kept from the SHA-256 digest.
const FINGERPRINT_LEN: usize = 16;

/// Stable fingerprint of a repository location.
///
/// Hashes the canonical absolute path, so `./repo` and `/abs/repo` map to
/// the same cache slot.
pub fn repository_fingerprint(repo: &Path) -> Result<String> {
    let canonical = std::fs::canonicalize(repo)?;
    Ok(fingerprint_str(&canonical.to_string_lossy()))
}

pub(crate) fn fingerprint_str(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let mut hash = hex::encode(hasher.finalize());
    hash.truncate(FINGERPRINT_LEN);
    hash
}
