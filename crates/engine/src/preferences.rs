//! Small per-project preference flags.
//!
//! `.preferences.json` remembers the last-used request settings so the
//! next session can pre-fill them. Strictly best-effort on both read
//! and write; losing these is an inconvenience, not a failure.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Preferences filename inside the project root.
pub const PREFERENCES_FILE: &str = ".preferences.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_aspect_ratio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_count: Option<u32>,
}

impl Preferences {
    fn path(project_root: &Path) -> PathBuf {
        project_root.join(PREFERENCES_FILE)
    }

    /// Load preferences; missing or unreadable files yield defaults.
    pub async fn load(project_root: &Path) -> Self {
        match tokio::fs::read(Self::path(project_root)).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Persist preferences, logging and swallowing failures.
    pub async fn save(&self, project_root: &Path) {
        let Ok(bytes) = serde_json::to_vec_pretty(self) else {
            return;
        };
        if let Err(e) = tokio::fs::write(Self::path(project_root), bytes).await {
            tracing::debug!(error = %e, "Preferences save failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences {
            last_model: Some("black-forest-labs/flux-schnell".into()),
            last_aspect_ratio: Some("16:9".into()),
            last_count: Some(4),
        };
        prefs.save(dir.path()).await;
        assert_eq!(Preferences::load(dir.path()).await, prefs);
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Preferences::load(dir.path()).await, Preferences::default());
    }

    #[tokio::test]
    async fn corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PREFERENCES_FILE), b"][").unwrap();
        assert_eq!(Preferences::load(dir.path()).await, Preferences::default());
    }
}
