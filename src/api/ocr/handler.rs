// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! OCR endpoint handlers

use axum::{extract::State, Json};
use axum_extra::extract::Multipart;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::request::OcrRequest;
use super::response::{HealthResponse, ModelsResponse};
use crate::api::errors::ApiError;
use crate::api::http_server::AppState;
use crate::vision::image_utils::decode_base64_bytes;
use crate::vision::ocr::pipeline::{OcrPipeline, PipelineResult};

/// Multipart field carrying the image
pub const UPLOAD_FIELD: &str = "file";

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

/// GET /v1/models
pub async fn models_handler(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.models.as_ref().clone(),
    })
}

/// POST /v1/ocr - Extract text from a base64-encoded image
///
/// # Request
/// - `image`: Base64-encoded image data (required)
///
/// # Response
/// - `results`: `{bbox: [x1, y1, x2, y2], text}` in reading order
/// - `full_text`: non-empty line strings joined by newlines
/// - `processing_time`: seconds
///
/// # Errors
/// - 400 Bad Request: missing image, invalid base64 or undecodable image
/// - 500 Internal Server Error: text detection failed
/// - 503 Service Unavailable: worker cancelled during shutdown
pub async fn ocr_handler(
    State(state): State<AppState>,
    Json(request): Json<OcrRequest>,
) -> Result<Json<PipelineResult>, ApiError> {
    let image = request.validate().inspect_err(|e| {
        warn!("OCR validation failed: {}", e);
    })?;

    let bytes = decode_base64_bytes(image, state.max_image_bytes)
        .map_err(|e| ApiError::InvalidImage(e.to_string()))?;
    debug!("OCR request received, {} bytes", bytes.len());

    run_pipeline(state.pipeline.clone(), bytes).await.map(Json)
}

/// POST /v1/ocr/upload - Extract text from a multipart upload
pub async fn ocr_upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PipelineResult>, ApiError> {
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidRequest(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::InvalidRequest(format!("Failed to read upload: {}", e)))?;
            image = Some(data);
            break;
        }
    }

    let image = image.ok_or_else(|| ApiError::ValidationError {
        field: UPLOAD_FIELD.to_string(),
        message: format!("multipart field '{}' is required", UPLOAD_FIELD),
    })?;
    debug!("OCR upload received, {} bytes", image.len());

    run_pipeline(state.pipeline.clone(), image.to_vec()).await.map(Json)
}

/// Run the pipeline off the async executor
async fn run_pipeline(pipeline: Arc<OcrPipeline>, bytes: Vec<u8>) -> Result<PipelineResult, ApiError> {
    let result = tokio::task::spawn_blocking(move || pipeline.process(&bytes))
        .await
        .map_err(|e| {
            if e.is_cancelled() {
                ApiError::ServiceUnavailable("OCR worker cancelled".to_string())
            } else {
                ApiError::InternalError(format!("OCR worker panicked: {}", e))
            }
        })??;

    info!(
        "OCR complete: {} spans, {} chars in {:.3}s",
        result.results.len(),
        result.full_text.len(),
        result.processing_time
    );

    Ok(result)
}
