//! Deduplicated reference input storage.
//!
//! A reference image is stored under `references/<sha256>.png`, the hash
//! computed over its raw bytes. Because the hash is the filename stem,
//! dedup is a plain existence check: the same bytes always resolve to
//! the same path and are written at most once.

use darkroom_core::error::GenerateError;
use darkroom_core::hashing::sha256_hex;

use crate::store::{AssetStore, REFERENCES_DIR};

/// A stored reference input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReference {
    /// Path relative to the project root.
    pub path: String,
    /// SHA-256 hex digest of the raw bytes; also the filename stem.
    pub hash: String,
}

impl AssetStore {
    /// Store reference bytes, deduplicating by content hash.
    pub async fn store_reference(&self, bytes: &[u8]) -> Result<StoredReference, GenerateError> {
        let hash = sha256_hex(bytes);
        let relative = format!("{REFERENCES_DIR}/{hash}.png");
        let target = self.references_dir().join(format!("{hash}.png"));

        if target.exists() {
            tracing::debug!(%hash, "Reference already stored, skipping write");
        } else {
            tokio::fs::create_dir_all(self.references_dir()).await?;
            tokio::fs::write(&target, bytes).await?;
            tracing::debug!(%hash, bytes = bytes.len(), "Reference stored");
        }

        Ok(StoredReference {
            path: relative,
            hash,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
