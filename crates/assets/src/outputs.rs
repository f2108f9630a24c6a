//! Output persistence: canonical PNG files, thumbnails, and the batch
//! provenance sidecar.
//!
//! All images of one batch share a timestamp base name; siblings get a
//! 1-based `-<n>` suffix. Sources in another encoding are re-encoded to
//! PNG. Thumbnail generation is best-effort: a thumbnail that cannot be
//! produced costs a preview, never the output itself.

use image::{DynamicImage, ImageFormat};

use darkroom_core::error::GenerateError;
use darkroom_core::naming::{output_filename, sidecar_filename};

use crate::provenance::Provenance;
use crate::store::{AssetStore, StoredBatch, GENERATIONS_DIR, THUMBNAILS_DIR};

/// Upper bound on either thumbnail dimension; aspect ratio is preserved.
pub const THUMBNAIL_MAX_DIM: u32 = 512;

impl AssetStore {
    /// Persist one completed batch.
    ///
    /// Writes each image (normalized to PNG) under `generations/`, a
    /// thumbnail under `.thumbnails/`, and one provenance sidecar for
    /// the whole batch. Returns relative paths in index order.
    pub async fn store_outputs(
        &self,
        images: &[Vec<u8>],
        provenance: &Provenance,
    ) -> Result<StoredBatch, GenerateError> {
        if images.is_empty() {
            return Err(GenerateError::NoOutput);
        }

        tokio::fs::create_dir_all(self.generations_dir()).await?;
        tokio::fs::create_dir_all(self.thumbnails_dir()).await?;

        let base_name = self.unique_base_name(provenance.created_at);
        let mut output_paths = Vec::with_capacity(images.len());
        let mut thumbnail_paths = Vec::new();

        for (index, bytes) in images.iter().enumerate() {
            let file_name = output_filename(&base_name, index, images.len());
            let (png_bytes, decoded) = normalize_to_png(bytes)?;

            tokio::fs::write(self.generations_dir().join(&file_name), &png_bytes).await?;
            output_paths.push(format!("{GENERATIONS_DIR}/{file_name}"));

            match decoded.map(|img| thumbnail_png(&img)) {
                Some(Ok(thumb)) => {
                    tokio::fs::write(self.thumbnails_dir().join(&file_name), &thumb).await?;
                    thumbnail_paths.push(format!("{THUMBNAILS_DIR}/{file_name}"));
                }
                Some(Err(e)) => {
                    tracing::warn!(%base_name, index, error = %e, "Thumbnail encode failed");
                }
                None => {
                    tracing::warn!(%base_name, index, "Output not decodable, no thumbnail");
                }
            }
        }

        let sidecar = serde_json::to_vec_pretty(provenance)
            .map_err(|e| GenerateError::GenerationFailed(format!("sidecar encode: {e}")))?;
        tokio::fs::write(
            self.generations_dir().join(sidecar_filename(&base_name)),
            sidecar,
        )
        .await?;
        self.metadata
            .lock()
            .await
            .insert(base_name.clone(), provenance.clone());

        tracing::info!(
            %base_name,
            outputs = output_paths.len(),
            thumbnails = thumbnail_paths.len(),
            "Batch persisted",
        );

        Ok(StoredBatch {
            base_name,
            output_paths,
            thumbnail_paths,
        })
    }
}

/// Normalize raw image bytes to PNG.
///
/// Already-PNG sources are written byte-for-byte even when they fail to
/// decode (the decode is then only needed for the thumbnail). Any other
/// encoding must decode so it can be re-encoded, or the output is lost.
fn normalize_to_png(bytes: &[u8]) -> Result<(Vec<u8>, Option<DynamicImage>), GenerateError> {
    let is_png = matches!(image::guess_format(bytes), Ok(ImageFormat::Png));
    let decoded = image::load_from_memory(bytes);

    match (is_png, decoded) {
        (true, Ok(img)) => Ok((bytes.to_vec(), Some(img))),
        (true, Err(_)) => Ok((bytes.to_vec(), None)),
        (false, Ok(img)) => {
            let png = encode_png(&img)?;
            Ok((png, Some(img)))
        }
        (false, Err(e)) => Err(GenerateError::Image(e.to_string())),
    }
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, GenerateError> {
    let mut buf = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| GenerateError::Image(e.to_string()))?;
    Ok(buf)
}

fn thumbnail_png(img: &DynamicImage) -> Result<Vec<u8>, GenerateError> {
    encode_png(&img.thumbnail(THUMBNAIL_MAX_DIM, THUMBNAIL_MAX_DIM))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
