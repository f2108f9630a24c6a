//! Orphaned sidecar reclamation.
//!
//! Invariant maintained here: a provenance sidecar exists iff at least
//! one sibling output sharing its base name still exists on disk.
//! Deleting outputs therefore checks each touched base name and removes
//! the sidecar (and its cache entry) once the last sibling is gone.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;

use darkroom_core::error::GenerateError;
use darkroom_core::naming::{base_name_of, sidecar_filename};

use crate::store::AssetStore;

impl AssetStore {
    /// Delete the named outputs and their thumbnails, then reclaim any
    /// sidecar left without siblings.
    ///
    /// `file_names` are bare names under `generations/` (e.g.
    /// `"20260314-092653-2.png"`). Missing files are ignored so the
    /// operation is idempotent.
    pub async fn delete_outputs(&self, file_names: &[String]) -> Result<(), GenerateError> {
        let mut touched_bases = BTreeSet::new();

        for name in file_names {
            remove_if_present(&self.generations_dir().join(name)).await?;
            remove_if_present(&self.thumbnails_dir().join(name)).await?;
            if let Some(base) = base_name_of(name) {
                touched_bases.insert(base.to_string());
            }
        }

        for base in touched_bases {
            if self.has_sibling_output(&base).await? {
                continue;
            }
            let sidecar = self.generations_dir().join(sidecar_filename(&base));
            remove_if_present(&sidecar).await?;
            self.metadata.lock().await.remove(&base);
            tracing::debug!(base_name = %base, "Reclaimed orphaned sidecar");
        }

        Ok(())
    }

    /// Whether any output file sharing `base` still exists.
    async fn has_sibling_output(&self, base: &str) -> Result<bool, GenerateError> {
        let mut entries = match tokio::fs::read_dir(self.generations_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if base_name_of(&name) == Some(base) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

async fn remove_if_present(path: &Path) -> Result<(), GenerateError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use darkroom_core::request::ModelOptions;
    use image::DynamicImage;

    use crate::provenance::Provenance;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            8,
            8,
            image::Rgba([1, 2, 3, 255]),
        ));
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn provenance() -> Provenance {
        Provenance {
            prompt: "p".into(),
            model: "m".into(),
            options: ModelOptions::Flux {
                aspect_ratio: "1:1".into(),
                seed: None,
            },
            reference_hashes: vec![],
            created_at: Utc::now(),
        }
    }

    fn file_name(path: &str) -> String {
        path.rsplit('/').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn deleting_sole_output_reclaims_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let store = AssetStore::new(dir.path());

        let batch = store.store_outputs(&[png_bytes()], &provenance()).await.unwrap();
        let sidecar = dir
            .path()
            .join("generations")
            .join(format!("{}.meta", batch.base_name));
        assert!(sidecar.exists());

        store
            .delete_outputs(&[file_name(&batch.output_paths[0])])
            .await
            .unwrap();

        assert!(!dir.path().join(&batch.output_paths[0]).exists());
        assert!(!dir.path().join(&batch.thumbnail_paths[0]).exists());
        assert!(!sidecar.exists());
        assert!(store.metadata_for(&batch.base_name).await.is_none());
    }

    #[tokio::test]
    async fn deleting_one_of_two_siblings_keeps_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let store = AssetStore::new(dir.path());

        let batch = store
            .store_outputs(&[png_bytes(), png_bytes()], &provenance())
            .await
            .unwrap();
        let sidecar = dir
            .path()
            .join("generations")
            .join(format!("{}.meta", batch.base_name));

        store
            .delete_outputs(&[file_name(&batch.output_paths[0])])
            .await
            .unwrap();

        assert!(!dir.path().join(&batch.output_paths[0]).exists());
        assert!(dir.path().join(&batch.output_paths[1]).exists());
        assert!(sidecar.exists());
        assert!(store.metadata_for(&batch.base_name).await.is_some());

        // Removing the last sibling reclaims it.
        store
            .delete_outputs(&[file_name(&batch.output_paths[1])])
            .await
            .unwrap();
        assert!(!sidecar.exists());
    }

    #[tokio::test]
    async fn deleting_missing_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = AssetStore::new(dir.path());

        store
            .delete_outputs(&["20990101-000000.png".to_string()])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn batch_delete_touching_both_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let store = AssetStore::new(dir.path());

        let batch = store
            .store_outputs(&[png_bytes(), png_bytes()], &provenance())
            .await
            .unwrap();

        let names: Vec<String> = batch.output_paths.iter().map(|p| file_name(p)).collect();
        store.delete_outputs(&names).await.unwrap();

        let sidecar = dir
            .path()
            .join("generations")
            .join(format!("{}.meta", batch.base_name));
        assert!(!sidecar.exists());
    }
}
