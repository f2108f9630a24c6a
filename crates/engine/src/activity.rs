//! Durable record of terminal jobs.
//!
//! `.activity.json` holds every Completed/Failed/Cancelled job as a
//! whole-file snapshot; job counts are small, so rewrite beats
//! append-only bookkeeping. Writes go through a temp file and an atomic
//! rename so a crash mid-save leaves the previous snapshot intact.
//! In-flight jobs are never persisted: they cannot be resumed across a
//! restart and would only show up as zombies.

use std::path::{Path, PathBuf};

use darkroom_core::job::Job;

use crate::ledger::is_terminal;

/// Snapshot filename inside the project root.
pub const ACTIVITY_FILE: &str = ".activity.json";

/// Reader/writer for one project's activity snapshot.
pub struct ActivityLog {
    path: PathBuf,
}

impl ActivityLog {
    pub fn new(project_root: &Path) -> Self {
        Self {
            path: project_root.join(ACTIVITY_FILE),
        }
    }

    /// Persist the terminal subset of `jobs`, replacing the previous
    /// snapshot. Best-effort: failures are logged and swallowed; the
    /// next successful save converges state.
    pub async fn save(&self, jobs: &[Job]) {
        let terminal: Vec<&Job> = jobs.iter().filter(|j| is_terminal(j)).collect();

        if let Err(e) = self.write_snapshot(&terminal).await {
            tracing::warn!(path = %self.path.display(), error = %e, "Activity save failed");
        }
    }

    async fn write_snapshot(&self, jobs: &[&Job]) -> std::io::Result<()> {
        let bytes = serde_json::to_vec_pretty(jobs)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!(count = jobs.len(), "Activity snapshot written");
        Ok(())
    }

    /// Read the previous snapshot. A missing or unreadable file yields
    /// an empty history rather than an error.
    pub async fn load(&self) -> Vec<Job> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Activity load failed");
                return Vec::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Corrupt activity snapshot");
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use darkroom_core::job::JobStatus;
    use darkroom_core::request::{GenerationRequest, ModelOptions};

    fn job() -> Job {
        Job::new(GenerationRequest {
            model: "owner/model".into(),
            prompt: "p".into(),
            count: 1,
            options: ModelOptions::Flux {
                aspect_ratio: "1:1".into(),
                seed: None,
            },
        })
    }

    fn completed_job() -> Job {
        let mut j = job();
        j.mark_running();
        j.mark_completed(vec!["generations/a.png".into()], vec![".thumbnails/a.png".into()]);
        j
    }

    #[tokio::test]
    async fn saves_only_terminal_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(dir.path());

        let pending = job();
        let mut running = job();
        running.mark_running();
        let done = completed_job();
        let done_id = done.id;

        log.save(&[pending, running, done]).await;

        let loaded = log.load().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, done_id);
        assert_eq!(loaded[0].status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn load_of_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(dir.path());
        assert!(log.load().await.is_empty());
    }

    #[tokio::test]
    async fn load_of_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ACTIVITY_FILE), b"{not json").unwrap();
        let log = ActivityLog::new(dir.path());
        assert!(log.load().await.is_empty());
    }

    #[tokio::test]
    async fn save_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(dir.path());

        let first = completed_job();
        log.save(std::slice::from_ref(&first)).await;
        let second = completed_job();
        log.save(std::slice::from_ref(&second)).await;

        let loaded = log.load().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, second.id);
    }

    #[tokio::test]
    async fn save_into_missing_directory_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(&dir.path().join("does/not/exist"));
        // Must not panic.
        log.save(&[completed_job()]).await;
    }
}
