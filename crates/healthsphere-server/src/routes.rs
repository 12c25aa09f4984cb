//! HTTP routes and handlers

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use healthsphere_core::{Error, PredictionRequest};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/predict", post(predict))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "OK",
        "message": "HealthSphere Backend is running",
        "available_models": state.available_models(),
    }))
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> String {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

/// Multipart prediction: `image` file plus `model` name
async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let mut multipart = multipart.map_err(|_| AppError::MissingInput)?;

    let mut image: Option<Vec<u8>> = None;
    let mut model: Option<String> = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("image") => image = Some(field.bytes().await?.to_vec()),
            Some("model") => model = Some(field.text().await?),
            _ => {}
        }
    }

    let (Some(image), Some(model)) = (image, model) else {
        return Err(AppError::MissingInput);
    };

    let available = state.available_models();
    if !available.contains(&model) {
        return Err(AppError::UnknownModel { available });
    }

    // Staged copy is removed when `staged` drops, whatever the outcome
    let staged = stage_upload(state.upload_dir.clone(), image).await?;
    info!("Image saved at: {} for {}", staged.path().display(), model);

    let image = tokio::fs::read(staged.path())
        .await
        .map_err(|e| AppError::Upload(e.to_string()))?;

    let prediction = state
        .dispatcher
        .dispatch(PredictionRequest::new(model.as_str(), image))
        .await
        .map_err(|source| AppError::Prediction {
            model: model.clone(),
            source,
        })?;

    drop(staged);
    debug!("Temporary image removed for {}", model);

    Ok(Json(json!({ "prediction": prediction.label })).into_response())
}

async fn stage_upload(dir: PathBuf, bytes: Vec<u8>) -> Result<NamedTempFile, AppError> {
    tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .tempfile_in(&dir)?;
        file.write_all(&bytes)?;
        file.flush()?;
        Ok(file)
    })
    .await
    .map_err(|e| AppError::Upload(e.to_string()))?
    .map_err(|e| AppError::Upload(e.to_string()))
}

/// Request-boundary errors
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Missing image or model type")]
    MissingInput,

    #[error("Invalid model type. Available models: {available:?}")]
    UnknownModel { available: Vec<String> },

    #[error("Failed to read upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Failed to save image: {0}")]
    Upload(String),

    #[error("Prediction failed for {model}: {source}")]
    Prediction { model: String, source: Error },
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::MissingInput | AppError::UnknownModel { .. } => StatusCode::BAD_REQUEST,
            AppError::Multipart(e) => e.status(),
            AppError::Upload(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Prediction { source, .. } if source.is_client_error() => {
                StatusCode::BAD_REQUEST
            }
            AppError::Prediction { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        } else {
            debug!("Rejected request: {}", self);
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
