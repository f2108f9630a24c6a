//! Fixed-interval polling driver.
//!
//! Re-fetches a prediction until it reaches a terminal status, sleeping
//! a fixed interval between fetches and giving up after a bounded
//! attempt count so a prediction the service never resolves cannot pin
//! resources forever.

use std::time::Duration;

use darkroom_core::error::GenerateError;

use crate::api::ReplicateApi;
use crate::prediction::{Prediction, PredictionStatus};

/// Tunable parameters for the polling strategy.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Sleep between consecutive status fetches.
    pub interval: Duration,
    /// Maximum number of status fetches before giving up.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1500),
            max_attempts: 300,
        }
    }
}

/// Poll `get_url` until the prediction is terminal.
///
/// - `succeeded` returns the fetched prediction.
/// - `failed`/`canceled` fail with the remote error text (or the
///   no-reason sentinel when the service sent none).
/// - Any other status sleeps and re-fetches, up to
///   [`PollConfig::max_attempts`]; exhausting the bound fails with
///   [`GenerateError::Timeout`].
pub async fn poll_until_terminal(
    api: &ReplicateApi,
    get_url: &str,
    config: &PollConfig,
) -> Result<Prediction, GenerateError> {
    for attempt in 1..=config.max_attempts {
        let prediction = api.get_prediction(get_url).await?;

        match prediction.status {
            PredictionStatus::Succeeded => {
                tracing::debug!(
                    prediction_id = %prediction.id,
                    attempt,
                    outputs = prediction.output.len(),
                    "Prediction succeeded",
                );
                return Ok(prediction);
            }
            PredictionStatus::Failed | PredictionStatus::Canceled => {
                let message = prediction.failure_message();
                tracing::debug!(
                    prediction_id = %prediction.id,
                    status = prediction.status.as_str(),
                    %message,
                    "Prediction ended unsuccessfully",
                );
                return Err(GenerateError::GenerationFailed(message));
            }
            _ => {
                tracing::trace!(
                    prediction_id = %prediction.id,
                    status = prediction.status.as_str(),
                    attempt,
                    "Prediction still in flight",
                );
            }
        }

        if attempt < config.max_attempts {
            tokio::time::sleep(config.interval).await;
        }
    }

    Err(GenerateError::Timeout {
        attempts: config.max_attempts,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn body(status: &str, error: Option<&str>, output: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "id": "p1",
            "status": status,
            "urls": { "get": "https://g", "cancel": "https://c" },
            "output": output,
            "error": error,
        })
    }

    fn fast_config() -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(1),
            max_attempts: 5,
        }
    }

    #[tokio::test]
    async fn returns_on_success_after_non_terminal_polls() {
        let server = MockServer::start().await;

        // Two in-flight responses, then success. Mocks are consulted in
        // mount order once earlier ones hit their response cap.
        Mock::given(method("GET"))
            .and(path("/predictions/p1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(body("processing", None, serde_json::Value::Null)),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/predictions/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body(
                "succeeded",
                None,
                serde_json::json!("https://f/out.png"),
            )))
            .mount(&server)
            .await;

        let api = ReplicateApi::new(server.uri(), "tok".into());
        let url = format!("{}/predictions/p1", server.uri());
        let pred = poll_until_terminal(&api, &url, &fast_config()).await.unwrap();
        assert_eq!(pred.output, vec!["https://f/out.png"]);
    }

    #[tokio::test]
    async fn failed_status_carries_remote_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/predictions/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body(
                "failed",
                Some("model crashed"),
                serde_json::Value::Null,
            )))
            .mount(&server)
            .await;

        let api = ReplicateApi::new(server.uri(), "tok".into());
        let url = format!("{}/predictions/p1", server.uri());
        let err = poll_until_terminal(&api, &url, &fast_config()).await.unwrap_err();
        assert_matches!(err, GenerateError::GenerationFailed(msg) if msg == "model crashed");
    }

    #[tokio::test]
    async fn canceled_with_no_error_uses_sentinel() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/predictions/p1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(body("canceled", None, serde_json::Value::Null)),
            )
            .mount(&server)
            .await;

        let api = ReplicateApi::new(server.uri(), "tok".into());
        let url = format!("{}/predictions/p1", server.uri());
        let err = poll_until_terminal(&api, &url, &fast_config()).await.unwrap_err();
        assert_matches!(
            err,
            GenerateError::GenerationFailed(msg) if msg == darkroom_core::error::NO_REASON_GIVEN
        );
    }

    #[tokio::test]
    async fn never_terminal_times_out_with_attempt_count() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/predictions/p1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(body("starting", None, serde_json::Value::Null)),
            )
            .expect(5)
            .mount(&server)
            .await;

        let api = ReplicateApi::new(server.uri(), "tok".into());
        let url = format!("{}/predictions/p1", server.uri());
        let err = poll_until_terminal(&api, &url, &fast_config()).await.unwrap_err();
        assert_matches!(err, GenerateError::Timeout { attempts: 5 });
    }

    #[tokio::test]
    async fn transport_error_propagates_immediately() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/predictions/p1"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(1)
            .mount(&server)
            .await;

        let api = ReplicateApi::new(server.uri(), "tok".into());
        let url = format!("{}/predictions/p1", server.uri());
        let err = poll_until_terminal(&api, &url, &fast_config()).await.unwrap_err();
        assert_matches!(err, GenerateError::Transport { status: 503, .. });
    }

    #[test]
    fn default_config_matches_documented_tuning() {
        let config = PollConfig::default();
        assert_eq!(config.interval, Duration::from_millis(1500));
        assert_eq!(config.max_attempts, 300);
    }
}
