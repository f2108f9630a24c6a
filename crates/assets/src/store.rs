//! Project-folder layout and the [`AssetStore`] handle.
//!
//! Layout per project root:
//!
//! ```text
//! generations/<ts>[-<n>].png    full-resolution outputs
//! generations/<ts>.meta         provenance sidecar, one per batch
//! .thumbnails/<ts>[-<n>].png    bounded-dimension previews
//! references/<sha256>.png       deduplicated reference inputs
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use darkroom_core::error::GenerateError;
use darkroom_core::naming::{output_filename, sidecar_filename};

use crate::provenance::Provenance;

/// Directory for full-resolution outputs and sidecars.
pub const GENERATIONS_DIR: &str = "generations";
/// Directory for thumbnails (hidden from casual browsing).
pub const THUMBNAILS_DIR: &str = ".thumbnails";
/// Directory for deduplicated reference inputs.
pub const REFERENCES_DIR: &str = "references";

/// Paths produced by persisting one completed batch.
#[derive(Debug, Clone)]
pub struct StoredBatch {
    /// Shared base name, also the sidecar key.
    pub base_name: String,
    /// Output paths relative to the project root, in index order.
    pub output_paths: Vec<String>,
    /// Thumbnail paths relative to the project root, in index order.
    /// May be shorter than `output_paths` when thumbnailing failed.
    pub thumbnail_paths: Vec<String>,
}

/// Handle to one project folder's assets.
pub struct AssetStore {
    root: PathBuf,
    /// Lazily-populated sidecar cache, keyed by batch base name.
    pub(crate) metadata: Mutex<HashMap<String, Provenance>>,
}

impl AssetStore {
    /// Open a store rooted at `root`. No directories are created until
    /// the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            metadata: Mutex::new(HashMap::new()),
        }
    }

    /// Project root this store writes under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a project-relative path.
    pub fn absolute(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub(crate) fn generations_dir(&self) -> PathBuf {
        self.root.join(GENERATIONS_DIR)
    }

    pub(crate) fn thumbnails_dir(&self) -> PathBuf {
        self.root.join(THUMBNAILS_DIR)
    }

    pub(crate) fn references_dir(&self) -> PathBuf {
        self.root.join(REFERENCES_DIR)
    }

    /// Pick a batch base name derived from `completed_at` that collides
    /// with nothing already on disk. Two batches finishing within the
    /// same second get consecutive timestamps.
    pub(crate) fn unique_base_name(&self, completed_at: DateTime<Utc>) -> String {
        let mut stamp = completed_at;
        loop {
            let base = darkroom_core::naming::batch_base_name(stamp);
            let taken = self.generations_dir().join(sidecar_filename(&base)).exists()
                || self
                    .generations_dir()
                    .join(output_filename(&base, 0, 1))
                    .exists();
            if !taken {
                return base;
            }
            stamp += Duration::seconds(1);
        }
    }

    /// Provenance for a batch, from cache or its sidecar on disk.
    pub async fn metadata_for(&self, base_name: &str) -> Option<Provenance> {
        if let Some(found) = self.metadata.lock().await.get(base_name) {
            return Some(found.clone());
        }

        let path = self.generations_dir().join(sidecar_filename(base_name));
        let bytes = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice::<Provenance>(&bytes) {
            Ok(provenance) => {
                self.metadata
                    .lock()
                    .await
                    .insert(base_name.to_string(), provenance.clone());
                Some(provenance)
            }
            Err(e) => {
                tracing::warn!(base_name, error = %e, "Unreadable provenance sidecar");
                None
            }
        }
    }
}

/// Recursive byte-size sum of `path`, skipping hidden entries.
///
/// Display-only: errors reading individual entries are skipped rather
/// than propagated, so one unreadable file cannot blank the figure.
pub async fn project_size(path: &Path) -> Result<u64, GenerateError> {
    let mut total = 0u64;
    let mut pending = vec![path.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if meta.is_dir() {
                pending.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }

    Ok(total)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
