//! SHA-256 content hashing.
//!
//! The hex digest of a reference image's raw bytes doubles as its
//! filename stem in the asset store, which is what makes dedup work:
//! identical bytes always resolve to the same on-disk path.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hex digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    format!("{digest:x}")
}
