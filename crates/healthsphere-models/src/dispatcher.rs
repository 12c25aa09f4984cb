//! Inference dispatcher: image bytes in, label out

use crate::preprocess::preprocess_for;
use crate::store::ModelStore;
use healthsphere_core::{Error, Prediction, PredictionRequest, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Front door for predictions
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<ModelStore>,
}

impl Dispatcher {
    pub fn new(store: Arc<ModelStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    /// Classify `image` with the model registered as `model_type`
    pub async fn predict(&self, model_type: &str, image: Vec<u8>) -> Result<String> {
        self.predict_detailed(model_type, image)
            .await
            .map(|prediction| prediction.label)
    }

    /// Serve a request received at the service boundary
    pub async fn dispatch(&self, request: PredictionRequest) -> Result<Prediction> {
        let PredictionRequest {
            logical_model_name,
            raw_image_bytes,
        } = request;
        self.predict_detailed(&logical_model_name, raw_image_bytes).await
    }

    /// Like [`predict`](Self::predict) but also returns the scores
    pub async fn predict_detailed(&self, model_type: &str, image: Vec<u8>) -> Result<Prediction> {
        let start = Instant::now();
        let result = self.run(model_type, image).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind().as_str(),
        };
        metrics::counter!(
            "healthsphere_predictions_total",
            "model" => model_type.to_string(),
            "outcome" => outcome
        )
        .increment(1);

        if let Err(e) = &result {
            warn!("Prediction failed for {}: {}", model_type, e);
        } else {
            metrics::histogram!(
                "healthsphere_prediction_latency_us",
                "model" => model_type.to_string()
            )
            .record(start.elapsed().as_micros() as f64);
        }
        result
    }

    async fn run(&self, model_type: &str, image: Vec<u8>) -> Result<Prediction> {
        // Resolve first: unknown names must not reach the cache or the fetcher
        let descriptor = self
            .store
            .registry()
            .get_model(model_type)
            .cloned()
            .ok_or_else(|| Error::unknown_model(model_type))?;

        let tensor = {
            let descriptor = descriptor.clone();
            tokio::task::spawn_blocking(move || preprocess_for(&descriptor, &image))
                .await
                .map_err(|e| Error::internal(format!("Preprocessing task failed: {}", e)))??
        };
        debug!(
            "Preprocessed image for {} into {:?}",
            model_type,
            tensor.shape()
        );

        let handle = self.store.get_or_load(model_type).await?;

        let scores = tokio::task::spawn_blocking(move || {
            let start = Instant::now();
            let scores = handle.run_inference(&tensor);
            (scores, start.elapsed())
        })
        .await
        .map_err(|e| Error::internal(format!("Inference task failed: {}", e)))
        .and_then(|(scores, elapsed)| {
            metrics::histogram!(
                "healthsphere_inference_latency_us",
                "model" => model_type.to_string()
            )
            .record(elapsed.as_micros() as f64);
            scores
        })?;
        info!("Raw prediction for {}: {:?}", model_type, scores);

        select_label(&scores, &descriptor.labels)
    }
}

/// Arg-max over `scores` (first occurrence wins) mapped through `labels`
pub fn select_label(scores: &[f32], labels: &[String]) -> Result<Prediction> {
    if scores.len() != labels.len() {
        return Err(Error::inference(format!(
            "model produced {} scores for {} labels",
            scores.len(),
            labels.len()
        )));
    }

    let (index, score) = scores
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, s)| match best {
            Some((_, b)) if s <= b || s.is_nan() => best,
            _ => Some((i, s)),
        })
        .ok_or_else(|| Error::inference("model produced no scores"))?;

    Ok(Prediction {
        label: labels[index].clone(),
        index,
        score,
        scores: scores.to_vec(),
    })
}
