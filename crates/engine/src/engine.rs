//! The generation engine: submits, runs, cancels, and persists jobs.
//!
//! One engine instance owns the provider, the asset store, the ledger,
//! and the activity log for a single project folder. Each submitted job
//! runs in its own spawned task; every state change flows back through
//! the ledger, and terminal outcomes are snapshotted to disk. Remote
//! and file errors are absorbed here into the failing job; they never
//! touch other jobs' state.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use darkroom_assets::{AssetStore, Provenance, StoredBatch};
use darkroom_core::error::GenerateError;
use darkroom_core::job::Job;
use darkroom_core::request::GenerationRequest;
use darkroom_replicate::PredictionProvider;

use crate::activity::ActivityLog;
use crate::batch::{run_batch, BatchConfig};
use crate::events::{EventBus, JobEvent};
use crate::ledger::JobLedger;

/// Orchestrates the full lifecycle of generation jobs.
///
/// Created once per project via [`GenerationEngine::start`]; the
/// returned `Arc` is cheap to clone into whatever surface drives it.
pub struct GenerationEngine {
    provider: Arc<dyn PredictionProvider>,
    assets: Arc<AssetStore>,
    ledger: Arc<JobLedger>,
    activity: ActivityLog,
    events: EventBus,
    batch: BatchConfig,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
}

impl GenerationEngine {
    /// Load persisted history and return a ready engine.
    pub async fn start(
        provider: Arc<dyn PredictionProvider>,
        assets: Arc<AssetStore>,
        project_root: &Path,
        batch: BatchConfig,
    ) -> Arc<Self> {
        let activity = ActivityLog::new(project_root);
        let ledger = Arc::new(JobLedger::new());

        let history = activity.load().await;
        tracing::info!(count = history.len(), "Loaded activity history");
        for job in history {
            ledger.insert(job);
        }

        Arc::new(Self {
            provider,
            assets,
            ledger,
            activity,
            events: EventBus::new(),
            batch,
            cancel: CancellationToken::new(),
        })
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Jobs for display: in-flight first, then history.
    pub fn jobs(&self) -> Vec<Job> {
        self.ledger.display_list()
    }

    /// Clone of one job's current state.
    pub fn job(&self, id: Uuid) -> Option<Job> {
        self.ledger.get(id)
    }

    /// Submit a request. Returns the new job's id immediately; the work
    /// runs in a background task and reports through the event bus.
    pub fn submit(
        self: &Arc<Self>,
        request: GenerationRequest,
        reference_images: Vec<Vec<u8>>,
    ) -> Uuid {
        let job = Job::new(request.clone());
        let id = job.id;
        self.ledger.insert(job);
        self.events.publish(JobEvent::Submitted { job_id: id });
        tracing::info!(job_id = %id, model = %request.model, count = request.count, "Job submitted");

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = engine.cancel.cancelled() => {
                    tracing::info!(job_id = %id, "Shutdown before job finished");
                }
                _ = engine.run_job(id, request, reference_images) => {}
            }
        });

        id
    }

    /// Cancel a Pending/Running job.
    ///
    /// The job flips to `Cancelled` before this returns; remote cancels
    /// go out fire-and-forget afterwards. Returns false when the job is
    /// unknown or already terminal.
    pub fn cancel_job(self: &Arc<Self>, id: Uuid) -> bool {
        let Some(cancel_urls) = self.ledger.cancel_job(id) else {
            return false;
        };
        self.events.publish(JobEvent::Cancelled { job_id: id });
        tracing::info!(job_id = %id, predictions = cancel_urls.len(), "Job cancelled");

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            for url in &cancel_urls {
                engine.provider.cancel(url).await;
            }
            engine.persist().await;
        });
        true
    }

    /// Remove a terminal job from the ledger and the snapshot.
    pub async fn remove_job(&self, id: Uuid) -> bool {
        let removed = self.ledger.remove(id);
        if removed {
            self.persist().await;
        }
        removed
    }

    /// Cancel all background work and write a final snapshot.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down generation engine");
        self.cancel.cancel();
        self.persist().await;
    }

    // ---- pipeline ----

    async fn run_job(&self, id: Uuid, request: GenerationRequest, references: Vec<Vec<u8>>) {
        if !self.ledger.mark_running(id) {
            // Cancelled while still pending.
            return;
        }
        self.events.publish(JobEvent::Started { job_id: id });

        match self.execute(id, &request, references).await {
            Ok(batch) => {
                let completed = self.ledger.mark_completed(
                    id,
                    batch.output_paths.clone(),
                    batch.thumbnail_paths,
                );
                self.persist().await;
                if completed {
                    self.events.publish(JobEvent::Completed {
                        job_id: id,
                        output_paths: batch.output_paths,
                    });
                } else {
                    tracing::info!(job_id = %id, "Discarding result for terminal job");
                }
            }
            Err(e) => self.fail_job(id, e).await,
        }
    }

    /// Upload references, run the batch, download and persist outputs.
    async fn execute(
        &self,
        id: Uuid,
        request: &GenerationRequest,
        references: Vec<Vec<u8>>,
    ) -> Result<StoredBatch, GenerateError> {
        let mut reference_paths = Vec::with_capacity(references.len());
        let mut reference_hashes = Vec::with_capacity(references.len());
        let mut reference_urls = Vec::with_capacity(references.len());
        for bytes in references {
            let stored = self.assets.store_reference(&bytes).await?;
            let url = self
                .provider
                .upload_file(bytes, &format!("{}.png", stored.hash))
                .await?;
            reference_paths.push(stored.path);
            reference_hashes.push(stored.hash);
            reference_urls.push(url);
        }
        self.ledger.set_reference_paths(id, reference_paths);

        let ledger = &self.ledger;
        let events = &self.events;
        let provider = &self.provider;
        let output_urls = run_batch(
            Arc::clone(&self.provider),
            request,
            &reference_urls,
            &self.batch,
            &mut |prediction, index| {
                if !ledger.register_cancel_url(id, &prediction.urls.cancel) {
                    // The job went terminal while this prediction was
                    // being created; cancel_job already drained the
                    // registered handles, so reach this stray directly.
                    let provider = Arc::clone(provider);
                    let url = prediction.urls.cancel.clone();
                    tokio::spawn(async move { provider.cancel(&url).await });
                    return false;
                }
                events.publish(JobEvent::PredictionCreated {
                    job_id: id,
                    prediction_id: prediction.id.clone(),
                    index,
                });
                true
            },
        )
        .await?;

        // Cancelled while the batch ran; nothing references these
        // outputs, so skip the download and store.
        if self.ledger.get(id).map_or(true, |job| job.status.is_terminal()) {
            return Err(GenerateError::GenerationFailed(
                "job is no longer active".into(),
            ));
        }

        let mut images = Vec::with_capacity(output_urls.len());
        for url in &output_urls {
            images.push(self.provider.download(url).await?);
        }

        let provenance = Provenance::for_request(request, reference_hashes);
        self.assets.store_outputs(&images, &provenance).await
    }

    /// Record a failure, unless the job went terminal meanwhile, and
    /// best-effort cancel every prediction it had registered, including
    /// siblings that may still be running.
    async fn fail_job(&self, id: Uuid, error: GenerateError) {
        let message = error.to_string();
        if !self.ledger.mark_failed(id, &message) {
            tracing::info!(job_id = %id, "Discarding error for terminal job");
            return;
        }
        tracing::warn!(job_id = %id, error = %message, "Job failed");
        self.persist().await;

        if let Some(job) = self.ledger.get(id) {
            for url in &job.cancel_urls {
                self.provider.cancel(url).await;
            }
        }

        self.events.publish(JobEvent::Failed {
            job_id: id,
            error: message,
        });
    }

    async fn persist(&self) {
        self.activity.save(&self.ledger.snapshot()).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
