//! Wire types for a remote prediction.
//!
//! One [`Prediction`] is the handle the remote service returns on
//! creation and on every status fetch. The `output` field arrives as
//! either a single address string or a list; both normalize to
//! `Vec<String>` at deserialization time so nothing downstream has to
//! care.

use serde::{Deserialize, Deserializer, Serialize};

use darkroom_core::error::NO_REASON_GIVEN;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Remote-reported prediction status.
///
/// Statuses the service has not taught us about yet are kept verbatim in
/// [`Other`](Self::Other) and treated as non-terminal, so a new remote
/// status keeps the poll loop alive instead of failing jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    Other(String),
}

impl PredictionStatus {
    /// Whether the remote job will never change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Starting => "starting",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Other(s) => s,
        }
    }
}

impl<'de> Deserialize<'de> for PredictionStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "starting" => Self::Starting,
            "processing" => Self::Processing,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" => Self::Canceled,
            _ => Self::Other(s),
        })
    }
}

impl Serialize for PredictionStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Addresses the service hands back for follow-up operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionUrls {
    /// Status-fetch address, also used for post-stream confirmation.
    pub get: String,
    /// Best-effort cancellation address.
    pub cancel: String,
    /// Server-sent-event feed, when the model supports push delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
}

/// One remote unit of work, as returned by create and status fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Remote-assigned identifier.
    pub id: String,
    pub status: PredictionStatus,
    pub urls: PredictionUrls,
    /// Output addresses; empty until the prediction succeeds.
    #[serde(default, deserialize_with = "one_or_many")]
    pub output: Vec<String>,
    /// Remote-reported error text, if any.
    #[serde(default)]
    pub error: Option<String>,
}

impl Prediction {
    /// Failure message for a `failed`/`canceled` prediction.
    ///
    /// The service sometimes reports failure with an empty or absent
    /// error field; those collapse to the [`NO_REASON_GIVEN`] sentinel.
    pub fn failure_message(&self) -> String {
        match self.error.as_deref() {
            Some(msg) if !msg.trim().is_empty() => msg.to_string(),
            _ => NO_REASON_GIVEN.to_string(),
        }
    }
}

/// Accept `null`, a bare string, or a list of strings for `output`.
fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
