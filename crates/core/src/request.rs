//! Generation request and per-model option sets.
//!
//! Each supported model family gets its own [`ModelOptions`] variant
//! exposing exactly the knobs that family accepts. The untyped wire
//! payload is produced in one place, [`GenerationRequest::to_input`],
//! at the transport boundary; nothing else in the pipeline handles a
//! free-form key/value map.

use serde::{Deserialize, Serialize};

/// Hard ceiling on how many outputs one request may ask for.
pub const MAX_OUTPUT_COUNT: u32 = 8;

/// Options for one model family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModelOptions {
    /// Flux family: aspect-ratio driven, supports `num_outputs` natively.
    Flux {
        /// e.g. `"1:1"`, `"16:9"`, `"3:4"`.
        aspect_ratio: String,
        /// Fixed seed for reproducible sampling.
        #[serde(skip_serializing_if = "Option::is_none")]
        seed: Option<u64>,
    },
    /// SDXL family: explicit pixel dimensions, one output per prediction.
    Sdxl {
        width: u32,
        height: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        negative_prompt: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        seed: Option<u64>,
    },
}

impl ModelOptions {
    /// Whether one prediction can produce the whole requested count.
    ///
    /// When `false`, the batch orchestrator fans a multi-output request
    /// into one prediction per image.
    pub fn supports_native_count(&self) -> bool {
        matches!(self, Self::Flux { .. })
    }
}

/// What the user asked for, before any remote dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Remote model identifier, e.g. `"black-forest-labs/flux-schnell"`.
    pub model: String,
    /// Prompt text.
    pub prompt: String,
    /// Requested number of output images (1..=[`MAX_OUTPUT_COUNT`]).
    pub count: u32,
    /// Model-specific options.
    pub options: ModelOptions,
}

impl GenerationRequest {
    /// Clamp the requested count into the valid range.
    pub fn effective_count(&self) -> u32 {
        self.count.clamp(1, MAX_OUTPUT_COUNT)
    }

    /// Build the wire `input` payload for one prediction.
    ///
    /// * `count` - outputs this single prediction should produce. Only
    ///   embedded for families with native count support.
    /// * `reference_urls` - upload-returned addresses substituted for
    ///   raw reference bytes (see the file upload step in the client).
    pub fn to_input(&self, count: u32, reference_urls: &[String]) -> serde_json::Value {
        let mut input = serde_json::Map::new();
        input.insert("prompt".into(), self.prompt.clone().into());

        match &self.options {
            ModelOptions::Flux { aspect_ratio, seed } => {
                input.insert("aspect_ratio".into(), aspect_ratio.clone().into());
                if count > 1 {
                    input.insert("num_outputs".into(), count.into());
                }
                if let Some(seed) = seed {
                    input.insert("seed".into(), (*seed).into());
                }
            }
            ModelOptions::Sdxl {
                width,
                height,
                negative_prompt,
                seed,
            } => {
                input.insert("width".into(), (*width).into());
                input.insert("height".into(), (*height).into());
                if let Some(neg) = negative_prompt {
                    input.insert("negative_prompt".into(), neg.clone().into());
                }
                if let Some(seed) = seed {
                    input.insert("seed".into(), (*seed).into());
                }
            }
        }

        if !reference_urls.is_empty() {
            // Single reference goes under "image"; several under "image_input".
            if reference_urls.len() == 1 {
                input.insert("image".into(), reference_urls[0].clone().into());
            } else {
                input.insert(
                    "image_input".into(),
                    reference_urls.iter().cloned().collect::<Vec<_>>().into(),
                );
            }
        }

        serde_json::Value::Object(input)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
