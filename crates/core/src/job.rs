//! Job type and lifecycle state machine.
//!
//! A [`Job`] is one user-visible generation request. Its status moves
//! monotonically through `Pending -> Running -> {Completed, Failed,
//! Cancelled}`; once terminal it never changes again. Transition helpers
//! return `bool` so a late result for an already-terminal job can be
//! discarded without ceremony.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::request::GenerationRequest;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, not yet dispatched to the orchestrator.
    Pending,
    /// Dispatched; one or more remote predictions are in flight.
    Running,
    /// Outputs persisted to disk.
    Completed,
    /// An error was recorded; see [`Job::error`].
    Failed,
    /// Stopped by the user. Carries no error message.
    Cancelled,
}

impl JobStatus {
    /// Whether no further transition is allowed from this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One user-visible generation request and everything produced for it.
///
/// Serialization note: `cancel_urls` are live remote handles and are
/// excluded from the serialized form: a restarted process cannot resume
/// them, so persisting them would only mislead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Opaque unique identifier.
    pub id: Uuid,
    /// What the user asked for.
    pub request: GenerationRequest,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// When the job object was created.
    pub created_at: DateTime<Utc>,
    /// Set when the job transitions to `Running`.
    pub started_at: Option<DateTime<Utc>>,
    /// Set when the job reaches any terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Cancel addresses of every remote prediction spawned so far.
    #[serde(skip)]
    pub cancel_urls: Vec<String>,
    /// Relative paths of persisted full-resolution outputs.
    pub output_paths: Vec<String>,
    /// Relative paths of persisted thumbnails.
    pub thumbnail_paths: Vec<String>,
    /// Relative paths of deduplicated reference inputs.
    pub reference_paths: Vec<String>,
    /// Failure reason; only set for `Failed`.
    pub error: Option<String>,
}

impl Job {
    /// Create a new `Pending` job for a request.
    pub fn new(request: GenerationRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            cancel_urls: Vec::new(),
            output_paths: Vec::new(),
            thumbnail_paths: Vec::new(),
            reference_paths: Vec::new(),
            error: None,
        }
    }

    /// `Pending -> Running`. Sets `started_at`.
    ///
    /// Returns `false` (and changes nothing) from any other status.
    pub fn mark_running(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// `Running -> Completed`. Records output and thumbnail paths.
    pub fn mark_completed(&mut self, outputs: Vec<String>, thumbnails: Vec<String>) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.output_paths = outputs;
        self.thumbnail_paths = thumbnails;
        true
    }

    /// `Pending/Running -> Failed`. Records the failure reason.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
        true
    }

    /// `Pending/Running -> Cancelled`. No error message is attached;
    /// user-stopped is not the same as broken.
    pub fn mark_cancelled(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        true
    }

    /// Record the cancel address of a newly created remote prediction.
    pub fn register_cancel_url(&mut self, url: impl Into<String>) {
        self.cancel_urls.push(url.into());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
