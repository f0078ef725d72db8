//! Discovery version fingerprints.
//!
//! A version is a 64-bit xxHash over the canonical JSON serialization of the
//! fingerprinted tuple, rendered as 16 hex characters. Callers only compare
//! versions for equality, so the exact algorithm is not wire-visible, but it
//! is deterministic and stable across restarts. serde_json's default map
//! keeps keys ordered, which makes the serialization canonical.

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

use crate::errors::{HeadwaterError, Result};

/// Fingerprint any serializable value.
pub fn version_hash<T: Serialize + ?Sized>(parts: &T) -> Result<String> {
    let canonical = serde_json::to_vec(parts)
        .map_err(|e| HeadwaterError::serialization(e, "Failed to fingerprint version inputs"))?;
    Ok(format!("{:016x}", xxh64(&canonical, 0)))
}

/// Fingerprint rendered template bytes directly.
pub fn version_hash_bytes(content: &[u8]) -> String {
    format!("{:016x}", xxh64(content, 0))
}
