//! In-memory job table.
//!
//! The ledger is the single owner of job state: background tasks report
//! transitions through it instead of holding references into shared
//! mutable jobs. Lock discipline: the internal mutex is a `std` mutex
//! and is never held across an await point.

use std::sync::{Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use darkroom_core::job::{Job, JobStatus};

/// Owns every job of this running instance, in-flight and historical.
#[derive(Default)]
pub struct JobLedger {
    jobs: Mutex<Vec<Job>>,
}

impl JobLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job (newly submitted, or terminal history from disk).
    pub fn insert(&self, job: Job) {
        self.locked().push(job);
    }

    /// Clone of a job by id.
    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.locked().iter().find(|j| j.id == id).cloned()
    }

    /// Number of tracked jobs.
    pub fn len(&self) -> usize {
        self.locked().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Pending -> Running`; false if the job is gone or already moved.
    pub fn mark_running(&self, id: Uuid) -> bool {
        self.update(id, |job| job.mark_running())
    }

    /// `Running -> Completed` with persisted paths; a late completion
    /// for a terminal job reports false and is discarded by the caller.
    pub fn mark_completed(&self, id: Uuid, outputs: Vec<String>, thumbnails: Vec<String>) -> bool {
        self.update(id, |job| job.mark_completed(outputs, thumbnails))
    }

    /// `Pending/Running -> Failed` with a reason.
    pub fn mark_failed(&self, id: Uuid, error: &str) -> bool {
        self.update(id, |job| job.mark_failed(error))
    }

    /// Record a prediction's cancel address against its owning job.
    ///
    /// Returns false without recording when the job is missing or
    /// already terminal; by then `cancel_job` has drained the url list,
    /// so a late registration would never be cancelled through it. The
    /// caller owns cancelling the stray handle directly.
    pub fn register_cancel_url(&self, id: Uuid, url: &str) -> bool {
        self.update(id, |job| {
            if job.status.is_terminal() {
                return false;
            }
            job.register_cancel_url(url);
            true
        })
    }

    /// Record the stored reference paths for a job.
    pub fn set_reference_paths(&self, id: Uuid, paths: Vec<String>) {
        self.update(id, |job| {
            job.reference_paths = paths;
            true
        });
    }

    /// User cancellation: flip to `Cancelled` and hand back every cancel
    /// address accumulated so far for fire-and-forget remote cancels.
    ///
    /// Returns `None` when the job is missing or already terminal; the
    /// caller then has nothing to do, which is what makes a second
    /// cancel click harmless.
    pub fn cancel_job(&self, id: Uuid) -> Option<Vec<String>> {
        let mut jobs = self.locked();
        let job = jobs.iter_mut().find(|j| j.id == id)?;
        if !job.mark_cancelled() {
            return None;
        }
        Some(std::mem::take(&mut job.cancel_urls))
    }

    /// Jobs for display: in-flight first (newest first), then terminal
    /// (most recently finished first).
    pub fn display_list(&self) -> Vec<Job> {
        let jobs = self.locked();
        let mut in_flight: Vec<Job> = jobs
            .iter()
            .filter(|j| !j.status.is_terminal())
            .cloned()
            .collect();
        let mut terminal: Vec<Job> = jobs
            .iter()
            .filter(|j| j.status.is_terminal())
            .cloned()
            .collect();
        in_flight.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        terminal.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        in_flight.extend(terminal);
        in_flight
    }

    /// Snapshot of every job, for persistence.
    pub fn snapshot(&self) -> Vec<Job> {
        self.locked().clone()
    }

    /// Remove a job entirely (explicit user removal).
    pub fn remove(&self, id: Uuid) -> bool {
        let mut jobs = self.locked();
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        jobs.len() != before
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut Job) -> bool) -> bool {
        let mut jobs = self.locked();
        match jobs.iter_mut().find(|j| j.id == id) {
            Some(job) => f(job),
            None => false,
        }
    }

    /// Writers only ever leave jobs in valid states, so a poisoned lock
    /// is still safe to read through.
    fn locked(&self) -> MutexGuard<'_, Vec<Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Convenience predicate used by persistence.
pub fn is_terminal(job: &Job) -> bool {
    matches!(
        job.status,
        JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use darkroom_core::request::{GenerationRequest, ModelOptions};

    fn new_job() -> Job {
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

    #[test]
    fn insert_and_get() {
        let ledger = JobLedger::new();
        let job = new_job();
        let id = job.id;
        ledger.insert(job);
        assert_eq!(ledger.get(id).unwrap().status, JobStatus::Pending);
        assert!(ledger.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn transitions_route_through_ledger() {
        let ledger = JobLedger::new();
        let job = new_job();
        let id = job.id;
        ledger.insert(job);

        assert!(ledger.mark_running(id));
        assert!(ledger.mark_completed(id, vec!["generations/x.png".into()], vec![]));
        assert_eq!(ledger.get(id).unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn late_completion_is_discarded() {
        let ledger = JobLedger::new();
        let job = new_job();
        let id = job.id;
        ledger.insert(job);
        ledger.mark_running(id);

        assert!(ledger.cancel_job(id).is_some());
        assert!(!ledger.mark_completed(id, vec!["generations/x.png".into()], vec![]));
        assert!(!ledger.mark_failed(id, "late"));
        assert_eq!(ledger.get(id).unwrap().status, JobStatus::Cancelled);
    }

    #[test]
    fn cancel_returns_accumulated_handles_once() {
        let ledger = JobLedger::new();
        let job = new_job();
        let id = job.id;
        ledger.insert(job);
        ledger.mark_running(id);
        ledger.register_cancel_url(id, "https://c/1");
        ledger.register_cancel_url(id, "https://c/2");

        let urls = ledger.cancel_job(id).unwrap();
        assert_eq!(urls, vec!["https://c/1", "https://c/2"]);

        // Second cancel is a no-op.
        assert!(ledger.cancel_job(id).is_none());
    }

    #[test]
    fn registration_after_cancel_is_refused() {
        let ledger = JobLedger::new();
        let job = new_job();
        let id = job.id;
        ledger.insert(job);
        ledger.mark_running(id);
        assert!(ledger.register_cancel_url(id, "https://c/1"));

        ledger.cancel_job(id);
        assert!(!ledger.register_cancel_url(id, "https://c/2"));
        assert!(ledger.get(id).unwrap().cancel_urls.is_empty());
    }

    #[test]
    fn cancel_missing_job_is_none() {
        let ledger = JobLedger::new();
        assert!(ledger.cancel_job(Uuid::new_v4()).is_none());
    }

    #[test]
    fn display_list_puts_in_flight_first() {
        let ledger = JobLedger::new();

        let done = new_job();
        let done_id = done.id;
        ledger.insert(done);
        ledger.mark_running(done_id);
        ledger.mark_completed(done_id, vec![], vec![]);

        let running = new_job();
        let running_id = running.id;
        ledger.insert(running);
        ledger.mark_running(running_id);

        let list = ledger.display_list();
        assert_eq!(list[0].id, running_id);
        assert_eq!(list[1].id, done_id);
    }

    #[test]
    fn remove_deletes_job() {
        let ledger = JobLedger::new();
        let job = new_job();
        let id = job.id;
        ledger.insert(job);
        assert!(ledger.remove(id));
        assert!(!ledger.remove(id));
        assert!(ledger.is_empty());
    }
}
