//! Error taxonomy for the generation pipeline.
//!
//! Every failure a job can end with is one of these variants. Crate-local
//! errors (HTTP layer, asset layer) convert into [`GenerateError`] at the
//! ledger boundary so a job's `error` field always carries one shape.

/// A failure produced anywhere in the generation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// The remote service answered with a non-2xx status.
    #[error("Remote service error ({status}): {body}")]
    Transport {
        /// HTTP status code.
        status: u16,
        /// Raw response body for diagnostics.
        body: String,
    },

    /// A prediction reached `succeeded` but carried no output addresses.
    #[error("Prediction succeeded with no output")]
    NoOutput,

    /// The remote service reported the prediction failed or was canceled.
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// A URL returned by the remote service could not be parsed.
    #[error("Invalid address from remote service: {0}")]
    InvalidAddress(String),

    /// No API token is configured.
    #[error("No API token configured")]
    MissingCredential,

    /// Polling exhausted its attempt bound without a terminal status.
    #[error("Prediction did not finish within {attempts} poll attempts")]
    Timeout {
        /// Number of status fetches performed before giving up.
        attempts: u32,
    },

    /// Local file I/O failed while persisting assets.
    #[error("Asset I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An image could not be decoded or re-encoded.
    #[error("Image processing error: {0}")]
    Image(String),
}

/// Fallback message for remote failures that carry no error text.
pub const NO_REASON_GIVEN: &str = "no reason given";
