//! Provider trait and the concrete HTTP client.
//!
//! Orchestration code depends on [`PredictionProvider`] only, so tests
//! can substitute a scripted provider and a future transport can slot in
//! without touching the ledger or the batch logic.

use async_trait::async_trait;

use darkroom_core::error::GenerateError;

use crate::api::ReplicateApi;
use crate::poll::{poll_until_terminal, PollConfig};
use crate::prediction::{Prediction, PredictionStatus};
use crate::stream::{watch_stream, StreamSignal};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Capability interface for one remote prediction service.
#[async_trait]
pub trait PredictionProvider: Send + Sync {
    /// Create a prediction for `model` with a ready-to-send input payload.
    async fn create_prediction(
        &self,
        model: &str,
        input: serde_json::Value,
    ) -> Result<Prediction, GenerateError>;

    /// Drive a prediction to a terminal state and return it.
    async fn await_completion(&self, prediction: &Prediction)
        -> Result<Prediction, GenerateError>;

    /// Best-effort cancellation. Never fails: the remote job may already
    /// be terminal, and an unreachable cancel endpoint must not break
    /// the caller's own cancellation bookkeeping.
    async fn cancel(&self, cancel_url: &str);

    /// Upload raw bytes, returning the address to use in input payloads.
    async fn upload_file(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<String, GenerateError>;

    /// Download output bytes from a delivery address.
    async fn download(&self, url: &str) -> Result<Vec<u8>, GenerateError>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection settings for [`ReplicateClient`].
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    /// Bearer token. Must be non-empty.
    pub api_token: String,
    /// API root, [`DEFAULT_BASE_URL`] unless overridden for tests.
    pub base_url: String,
    /// Polling tuning.
    pub poll: PollConfig,
}

impl ReplicateConfig {
    /// Config with the production base URL and default polling.
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            poll: PollConfig::default(),
        }
    }

    /// Read the token from the `REPLICATE_API_TOKEN` environment variable.
    pub fn from_env() -> Result<Self, GenerateError> {
        match std::env::var("REPLICATE_API_TOKEN") {
            Ok(token) if !token.trim().is_empty() => Ok(Self::new(token)),
            _ => Err(GenerateError::MissingCredential),
        }
    }
}

// ---------------------------------------------------------------------------
// Concrete client
// ---------------------------------------------------------------------------

/// HTTP transport implementing [`PredictionProvider`].
pub struct ReplicateClient {
    api: ReplicateApi,
    poll: PollConfig,
}

impl ReplicateClient {
    /// Build a client from configuration.
    ///
    /// Fails with [`GenerateError::MissingCredential`] when the token is
    /// empty, so a misconfigured environment surfaces before any request.
    pub fn new(config: ReplicateConfig) -> Result<Self, GenerateError> {
        if config.api_token.trim().is_empty() {
            return Err(GenerateError::MissingCredential);
        }
        Ok(Self {
            api: ReplicateApi::new(config.base_url, config.api_token),
            poll: config.poll,
        })
    }

    /// Validate a remote-supplied address before dereferencing it.
    fn checked_url(url: &str) -> Result<&str, GenerateError> {
        reqwest::Url::parse(url).map_err(|_| GenerateError::InvalidAddress(url.to_string()))?;
        Ok(url)
    }

    /// Interpret a terminal prediction state.
    fn finish(prediction: Prediction) -> Result<Prediction, GenerateError> {
        if prediction.status == PredictionStatus::Succeeded {
            Ok(prediction)
        } else {
            Err(GenerateError::GenerationFailed(prediction.failure_message()))
        }
    }
}

#[async_trait]
impl PredictionProvider for ReplicateClient {
    async fn create_prediction(
        &self,
        model: &str,
        input: serde_json::Value,
    ) -> Result<Prediction, GenerateError> {
        let prediction = self.api.create_prediction(model, &input).await?;
        Self::checked_url(&prediction.urls.get)?;
        Self::checked_url(&prediction.urls.cancel)?;

        tracing::info!(
            prediction_id = %prediction.id,
            model,
            streaming = prediction.urls.stream.is_some(),
            "Prediction created",
        );
        Ok(prediction)
    }

    async fn await_completion(
        &self,
        prediction: &Prediction,
    ) -> Result<Prediction, GenerateError> {
        let get_url = Self::checked_url(&prediction.urls.get)?;

        if let Some(stream_url) = prediction.urls.stream.as_deref() {
            let stream_url = Self::checked_url(stream_url)?;

            match watch_stream(&self.api, stream_url).await {
                Ok(StreamSignal::Done) => {
                    let fetched = self.api.get_prediction(get_url).await?;
                    if fetched.status.is_terminal() {
                        return Self::finish(fetched);
                    }
                    // The feed can announce done before the status
                    // endpoint reflects a terminal state; poll until it
                    // catches up.
                }
                Ok(StreamSignal::Error(message)) => {
                    return Err(GenerateError::GenerationFailed(message));
                }
                Ok(StreamSignal::Disconnected) => {
                    tracing::debug!(
                        prediction_id = %prediction.id,
                        "Stream ended without terminal event, polling",
                    );
                }
                Err(e) => {
                    // A rejected subscription is not fatal either; the
                    // status endpoint stays authoritative.
                    tracing::warn!(
                        prediction_id = %prediction.id,
                        error = %e,
                        "Stream subscription failed, polling",
                    );
                }
            }
        }

        poll_until_terminal(&self.api, get_url, &self.poll).await
    }

    async fn cancel(&self, cancel_url: &str) {
        let cancel_url = match Self::checked_url(cancel_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping cancel for malformed address");
                return;
            }
        };

        if let Err(e) = self.api.cancel_prediction(cancel_url).await {
            tracing::warn!(cancel_url, error = %e, "Best-effort cancel failed");
        }
    }

    async fn upload_file(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<String, GenerateError> {
        let url = self.api.upload_file(bytes, file_name).await?;
        Self::checked_url(&url)?;
        Ok(url)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, GenerateError> {
        let url = Self::checked_url(url)?;
        Ok(self.api.download_file(url).await?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
