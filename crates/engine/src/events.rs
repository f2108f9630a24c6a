//! In-process progress events backed by a `tokio::sync::broadcast`
//! channel.
//!
//! The presentation layer subscribes via [`EventBus::subscribe`]; the
//! pipeline publishes as jobs move through their lifecycle. Publishing
//! never fails: with no subscribers events are simply dropped.

use tokio::sync::broadcast;
use uuid::Uuid;

/// Broadcast channel capacity.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A job lifecycle notification.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// A new job entered the ledger as `Pending`.
    Submitted { job_id: Uuid },
    /// The job was dispatched and is now `Running`.
    Started { job_id: Uuid },
    /// A remote prediction was created for the job.
    PredictionCreated {
        job_id: Uuid,
        prediction_id: String,
        /// Position of this prediction within the job's batch.
        index: u32,
    },
    /// Outputs were persisted; the job is `Completed`.
    Completed {
        job_id: Uuid,
        output_paths: Vec<String>,
    },
    /// The job is `Failed` with this reason.
    Failed { job_id: Uuid, error: String },
    /// The job was cancelled by the user.
    Cancelled { job_id: Uuid },
}

/// Publish/subscribe hub for [`JobEvent`]s.
pub struct EventBus {
    tx: broadcast::Sender<JobEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Receive all events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: JobEvent) {
        // A send error only means nobody is listening right now.
        let _ = self.tx.send(event);
    }
}
