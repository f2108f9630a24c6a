//! REST wrapper for the prediction service HTTP endpoints.
//!
//! Wraps prediction creation, status fetch, cancellation, file upload,
//! and the event-stream subscription using [`reqwest`]. All requests
//! carry bearer-token authentication.

use serde::Deserialize;

use crate::prediction::Prediction;

/// HTTP client for one prediction service account.
pub struct ReplicateApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

/// Response of the `POST /files` upload endpoint.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    urls: UploadUrls,
}

#[derive(Debug, Deserialize)]
struct UploadUrls {
    get: String,
}

/// Errors from the REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl From<ApiError> for darkroom_core::error::GenerateError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Api { status, body } => Self::Transport { status, body },
            ApiError::Request(err) => Self::GenerationFailed(format!("request failed: {err}")),
        }
    }
}

impl ReplicateApi {
    /// Create a new API client.
    ///
    /// * `base_url` - e.g. `https://api.replicate.com/v1`.
    /// * `token`    - bearer token for the `Authorization` header.
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            token,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (connection pooling across clients).
    pub fn with_client(client: reqwest::Client, base_url: String, token: String) -> Self {
        Self {
            client,
            base_url,
            token,
        }
    }

    /// Base URL this client targets.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a prediction for `model` with the given input payload.
    ///
    /// Sends `POST /models/{model}/predictions` with `{"input": ...}`.
    pub async fn create_prediction(
        &self,
        model: &str,
        input: &serde_json::Value,
    ) -> Result<Prediction, ApiError> {
        let body = serde_json::json!({ "input": input });

        let response = self
            .client
            .post(format!("{}/models/{model}/predictions", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch the current state of a prediction by its `get` address.
    pub async fn get_prediction(&self, get_url: &str) -> Result<Prediction, ApiError> {
        let response = self
            .client
            .get(get_url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Ask the service to cancel a prediction. The response body is
    /// ignored; the remote job may already be terminal.
    pub async fn cancel_prediction(&self, cancel_url: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(cancel_url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Upload raw bytes via `POST /files` (multipart).
    ///
    /// Returns the download address to substitute for the raw bytes in a
    /// prediction's input payload.
    pub async fn upload_file(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<String, ApiError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("content", part);

        let response = self
            .client
            .post(format!("{}/files", self.base_url))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;

        let upload: UploadResponse = Self::parse_response(response).await?;
        Ok(upload.urls.get)
    }

    /// Download output bytes from a delivery address.
    pub async fn download_file(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let response = self.client.get(url).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Open the server-sent-event feed for a prediction.
    ///
    /// Returns the raw streaming response; the caller reads and parses
    /// the event frames (see [`crate::stream`]).
    pub async fn open_stream(&self, stream_url: &str) -> Result<reqwest::Response, ApiError> {
        let response = self
            .client
            .get(stream_url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        Self::ensure_success(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`ApiError::Api`] carrying
    /// the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
