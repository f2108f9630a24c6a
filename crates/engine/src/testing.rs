//! Scripted [`PredictionProvider`] for orchestration tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use darkroom_core::error::GenerateError;
use darkroom_replicate::prediction::{Prediction, PredictionStatus, PredictionUrls};
use darkroom_replicate::PredictionProvider;

/// A provider whose behavior per prediction id is scripted up front.
///
/// Created predictions receive ids `p0`, `p1`, ... in creation order.
#[derive(Default)]
pub struct MockProvider {
    /// `(model, input)` of every create call, in order.
    pub created: Mutex<Vec<(String, serde_json::Value)>>,
    /// Cancel addresses received, in order.
    pub cancelled: Mutex<Vec<String>>,
    /// Per-id artificial completion delay.
    pub delays: HashMap<String, Duration>,
    /// Ids whose await fails with a scripted error.
    pub failing: HashSet<String>,
    /// Output addresses each successful prediction reports.
    pub outputs_per_prediction: usize,
    counter: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            outputs_per_prediction: 1,
            ..Self::default()
        }
    }

    pub fn create_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    fn handle(id: &str) -> Prediction {
        Prediction {
            id: id.to_string(),
            status: PredictionStatus::Starting,
            urls: PredictionUrls {
                get: format!("https://mock.test/predictions/{id}"),
                cancel: format!("https://mock.test/predictions/{id}/cancel"),
                stream: None,
            },
            output: Vec::new(),
            error: None,
        }
    }
}

#[async_trait]
impl PredictionProvider for MockProvider {
    async fn create_prediction(
        &self,
        model: &str,
        input: serde_json::Value,
    ) -> Result<Prediction, GenerateError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.created
            .lock()
            .unwrap()
            .push((model.to_string(), input));
        Ok(Self::handle(&format!("p{n}")))
    }

    async fn await_completion(
        &self,
        prediction: &Prediction,
    ) -> Result<Prediction, GenerateError> {
        if let Some(delay) = self.delays.get(&prediction.id) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&prediction.id) {
            return Err(GenerateError::GenerationFailed(format!(
                "scripted failure for {}",
                prediction.id
            )));
        }
        let mut done = prediction.clone();
        done.status = PredictionStatus::Succeeded;
        done.output = (0..self.outputs_per_prediction)
            .map(|i| format!("https://files.mock.test/{}-{i}.png", prediction.id))
            .collect();
        Ok(done)
    }

    async fn cancel(&self, cancel_url: &str) {
        self.cancelled.lock().unwrap().push(cancel_url.to_string());
    }

    async fn upload_file(
        &self,
        bytes: Vec<u8>,
        _file_name: &str,
    ) -> Result<String, GenerateError> {
        Ok(format!(
            "https://files.mock.test/uploads/{}",
            darkroom_core::hashing::sha256_hex(&bytes)
        ))
    }

    async fn download(&self, _url: &str) -> Result<Vec<u8>, GenerateError> {
        // A real 4x4 PNG so the asset store can decode it.
        let img = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            4,
            4,
            image::Rgba([90, 10, 200, 255]),
        ));
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .map_err(|e| GenerateError::Image(e.to_string()))?;
        Ok(buf)
    }
}
