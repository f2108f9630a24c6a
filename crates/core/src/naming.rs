//! Output naming convention engine.
//!
//! Every image in one batch shares a timestamp-derived base name; a
//! 1-based `-<n>` suffix distinguishes siblings when the batch produced
//! more than one output. The provenance sidecar is keyed by the bare
//! base name, so [`base_name_of`] must invert [`output_filename`] for
//! every name the store can produce.

use chrono::{DateTime, Utc};

/// Derive the shared base name for a batch from its completion time.
///
/// Convention: `YYYYMMDD-HHMMSS` in UTC.
pub fn batch_base_name(completed_at: DateTime<Utc>) -> String {
    completed_at.format("%Y%m%d-%H%M%S").to_string()
}

/// Filename for output `index` (0-based) of a batch of `total` images.
///
/// - `total <= 1` -> `{base}.png`
/// - `total > 1`  -> `{base}-{index + 1}.png`
pub fn output_filename(base: &str, index: usize, total: usize) -> String {
    if total > 1 {
        format!("{base}-{}.png", index + 1)
    } else {
        format!("{base}.png")
    }
}

/// Sidecar filename for a batch base name.
pub fn sidecar_filename(base: &str) -> String {
    format!("{base}.meta")
}

/// Recover the batch base name from an output filename.
///
/// Strips the `.png` extension and a trailing `-<n>` sibling suffix if
/// present. Returns `None` for names that do not follow the convention.
pub fn base_name_of(file_name: &str) -> Option<&str> {
    let stem = file_name.strip_suffix(".png")?;
    match stem.rsplit_once('-') {
        // A trailing all-digit segment of 1..=2 chars is a sibling index;
        // the timestamp's own `-HHMMSS` segment is 6 digits and survives.
        Some((head, tail))
            if !tail.is_empty() && tail.len() <= 2 && tail.bytes().all(|b| b.is_ascii_digit()) =>
        {
            Some(head)
        }
        _ => Some(stem),
    }
}
