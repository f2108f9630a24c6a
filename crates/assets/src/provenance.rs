//! Provenance sidecar contents.
//!
//! One `.meta` file is written per batch, next to its outputs, recording
//! everything needed to attribute or reproduce the images. Dates
//! serialize as ISO-8601 (chrono's RFC 3339 form).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use darkroom_core::request::{GenerationRequest, ModelOptions};

/// Metadata shared by every output of one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Prompt text the batch was generated from.
    pub prompt: String,
    /// Remote model identifier.
    pub model: String,
    /// Model-specific options in effect.
    pub options: ModelOptions,
    /// Content hashes of the reference inputs used, if any.
    #[serde(default)]
    pub reference_hashes: Vec<String>,
    /// When the batch completed.
    pub created_at: DateTime<Utc>,
}

impl Provenance {
    /// Build provenance for a request plus the reference hashes it used.
    pub fn for_request(request: &GenerationRequest, reference_hashes: Vec<String>) -> Self {
        Self {
            prompt: request.prompt.clone(),
            model: request.model.clone(),
            options: request.options.clone(),
            reference_hashes,
            created_at: Utc::now(),
        }
    }
}
