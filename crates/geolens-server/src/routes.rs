//! HTTP routes and handlers

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::state::AppState;
use geolens_core::{ClassLabel, IdentificationResult, ModelStatus, NUM_CLASSES};
use geolens_engine::source::decode_base64;
use geolens_engine::{ImageSource, InferencePath};

/// Default maximum request body size
pub const DEFAULT_BODY_LIMIT: usize = 16 * 1024 * 1024;

pub fn create_router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/classes", get(classes))
        .route("/status", get(status))
        .route("/identify", post(identify))
        .route("/predict", post(identify))
        .route("/identify/raw", post(identify_raw))
        .route("/model/reload", post(reload_model))
        .route("/metrics", get(metrics))
        .fallback(fallback)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "model_loaded": state.engine.status().loaded,
        "num_classes": NUM_CLASSES,
    }))
}

async fn classes() -> Json<serde_json::Value> {
    Json(json!({
        "classes": ClassLabel::ALL,
        "num_classes": NUM_CLASSES,
    }))
}

async fn status(State(state): State<AppState>) -> Json<ModelStatus> {
    Json(state.engine.status())
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// JSON identification request
#[derive(Debug, Deserialize)]
struct IdentifyRequest {
    /// Base64 payload or data URL
    #[serde(default)]
    image: Option<String>,

    /// Remote image (http, https or data URL)
    #[serde(default)]
    url: Option<String>,

    /// Include the path taken and timing
    #[serde(default)]
    detailed: bool,
}

#[derive(Debug, Serialize)]
struct DetailedResponse {
    #[serde(flatten)]
    result: IdentificationResult,
    path: InferencePath,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback_reason: Option<String>,
    low_confidence: bool,
    elapsed_ms: u64,
}

async fn identify(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let request: IdentifyRequest = serde_json::from_slice(&body)?;

    let source = match (request.image, request.url) {
        (Some(image), _) => ImageSource::Bytes(decode_base64(&image)?),
        (None, Some(url)) => remote_source(url)?,
        (None, None) => return Err(AppError::InvalidRequest("No image provided".to_string())),
    };

    respond(&state, source, request.detailed).await
}

async fn identify_raw(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    if body.is_empty() {
        return Err(AppError::InvalidRequest("No image provided".to_string()));
    }
    respond(&state, ImageSource::Bytes(body), false).await
}

/// Only network and inline URLs are accepted from clients
fn remote_source(url: String) -> Result<ImageSource, AppError> {
    let lower = url.to_ascii_lowercase();
    if ["http://", "https://", "data:"].iter().any(|s| lower.starts_with(s)) {
        Ok(ImageSource::Url(url))
    } else {
        Err(AppError::InvalidRequest(format!(
            "unsupported url scheme: {}",
            url.split(':').next().unwrap_or_default()
        )))
    }
}

async fn respond(
    state: &AppState,
    source: ImageSource,
    detailed: bool,
) -> Result<Response, AppError> {
    let id = state.engine.identify_detailed(source).await?;
    debug!(path = %id.path, elapsed_us = id.elapsed.as_micros() as u64, "identify request served");

    if detailed {
        Ok(Json(DetailedResponse {
            elapsed_ms: id.elapsed.as_millis() as u64,
            result: id.result,
            path: id.path,
            fallback_reason: id.fallback_reason,
            low_confidence: id.low_confidence,
        })
        .into_response())
    } else {
        Ok(Json(id.result).into_response())
    }
}

async fn reload_model(State(state): State<AppState>) -> Json<ModelStatus> {
    info!("Reloading model");
    state.engine.dispose();
    state.engine.load_model().await;
    Json(state.engine.status())
}

async fn fallback() -> Response {
    AppError::NotFound.into_response()
}

/// Error handling
#[derive(Debug)]
enum AppError {
    InvalidRequest(String),
    Unprocessable(String),
    NotFound,
    InternalError(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidRequest(err.to_string())
    }
}

impl From<geolens_core::Error> for AppError {
    fn from(err: geolens_core::Error) -> Self {
        match err {
            geolens_core::Error::ImageDecode(_) => AppError::Unprocessable(err.to_string()),
            other => AppError::InternalError(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            AppError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request", msg),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "image_decode", msg),
            AppError::NotFound => (StatusCode::NOT_FOUND, "not_found", "Not found".to_string()),
            AppError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg),
        };

        let body = json!({
            "error": {
                "message": message,
                "type": kind,
            }
        });

        (status, Json(body)).into_response()
    }
}
