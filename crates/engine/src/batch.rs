//! Batch fan-out and ordered reassembly.
//!
//! A request for N outputs becomes either one prediction (the model
//! accepts a native count, or N is 1) or N throttled predictions awaited
//! concurrently. Results carry their creation index, and the flattened
//! output list follows that index order, never completion order.

use std::sync::Arc;
use std::time::Duration;

use darkroom_core::error::GenerateError;
use darkroom_core::request::GenerationRequest;
use darkroom_replicate::prediction::Prediction;
use darkroom_replicate::PredictionProvider;

/// Tunable parameters for batch creation.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Minimum delay between consecutive prediction creations, applied
    /// after the first, to stay under provider rate limits.
    pub creation_throttle: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            creation_throttle: Duration::from_secs(5),
        }
    }
}

/// Run one batch to completion and return output addresses in request
/// order.
///
/// `on_created` fires for every prediction as soon as it exists, before
/// any of them completes; the caller uses it to register cancel
/// addresses so user cancellation can reach in-flight work. It returns
/// whether the batch is still wanted: `false` means the job went
/// terminal while the prediction was being created, and no further
/// predictions are created. The caller owns cancelling the handle it
/// just declined.
///
/// The first failing prediction's error propagates; siblings are not
/// awaited further here. The caller is expected to best-effort cancel
/// the handles it registered (see the engine's failure path).
pub async fn run_batch(
    provider: Arc<dyn PredictionProvider>,
    request: &GenerationRequest,
    reference_urls: &[String],
    config: &BatchConfig,
    on_created: &mut (dyn FnMut(&Prediction, u32) -> bool + Send),
) -> Result<Vec<String>, GenerateError> {
    let count = request.effective_count();

    if count == 1 || request.options.supports_native_count() {
        let input = request.to_input(count, reference_urls);
        let prediction = provider.create_prediction(&request.model, input).await?;
        if !on_created(&prediction, 0) {
            return Err(GenerateError::GenerationFailed(
                "job is no longer active".into(),
            ));
        }

        let done = provider.await_completion(&prediction).await?;
        if done.output.is_empty() {
            return Err(GenerateError::NoOutput);
        }
        return Ok(done.output);
    }

    // One prediction per output, created sequentially with a throttle.
    let mut handles = Vec::with_capacity(count as usize);
    for index in 0..count {
        if index > 0 {
            tokio::time::sleep(config.creation_throttle).await;
        }
        let input = request.to_input(1, reference_urls);
        let prediction = provider.create_prediction(&request.model, input).await?;
        tracing::debug!(
            prediction_id = %prediction.id,
            index,
            total = count,
            "Batch prediction created",
        );
        if !on_created(&prediction, index) {
            return Err(GenerateError::GenerationFailed(
                "job is no longer active".into(),
            ));
        }
        handles.push(prediction);
    }

    // Await all concurrently; tasks tag results with their index.
    let mut tasks = Vec::with_capacity(handles.len());
    for (index, prediction) in handles.into_iter().enumerate() {
        let provider = Arc::clone(&provider);
        tasks.push(tokio::spawn(async move {
            let result = provider.await_completion(&prediction).await;
            (index, result)
        }));
    }

    let mut indexed: Vec<(usize, Prediction)> = Vec::with_capacity(tasks.len());
    let mut first_error: Option<GenerateError> = None;
    for task in tasks {
        let (index, result) = task.await.map_err(|e| {
            GenerateError::GenerationFailed(format!("prediction task panicked: {e}"))
        })?;
        match result {
            Ok(done) => indexed.push((index, done)),
            Err(e) => {
                tracing::warn!(index, error = %e, "Batch prediction failed");
                first_error.get_or_insert(e);
            }
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }

    indexed.sort_by_key(|(index, _)| *index);

    let mut outputs = Vec::with_capacity(indexed.len());
    for (_, done) in indexed {
        if done.output.is_empty() {
            return Err(GenerateError::NoOutput);
        }
        outputs.extend(done.output);
    }
    Ok(outputs)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
