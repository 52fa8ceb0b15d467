// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use std::{future::Future, sync::Arc};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use super::ocr::{health_handler, models_handler, ocr_handler, ocr_upload_handler};
use crate::config::ServiceConfig;
use crate::version;
use crate::vision::model_manager::{VisionModelInfo, VisionModelManager};
use crate::vision::ocr::pipeline::OcrPipeline;

/// Slack on top of the image limit for JSON and multipart framing
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared, read-only state for every request
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<OcrPipeline>,
    pub models: Arc<Vec<VisionModelInfo>>,
    pub max_image_bytes: usize,
}

impl AppState {
    pub fn new(manager: &VisionModelManager) -> Self {
        let pipeline = manager.pipeline();
        Self {
            max_image_bytes: pipeline.config().max_image_bytes,
            pipeline,
            models: Arc::new(manager.list_models().to_vec()),
        }
    }

    /// Largest request body accepted; base64 inflates payloads by 4/3
    pub fn body_limit(&self) -> usize {
        self.max_image_bytes
            .saturating_mul(4)
            .saturating_div(3)
            .saturating_add(BODY_OVERHEAD_BYTES)
    }
}

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.body_limit();

    Router::new()
        // Health check
        .route("/health", get(health_handler))
        .route("/v1/models", get(models_handler))
        .route("/v1/version", get(|| async { Json(version::get_version_info()) }))
        // OCR endpoints
        .route("/v1/ocr", post(ocr_handler))
        .route("/v1/ocr/upload", post(ocr_upload_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

/// Bind to the configured address and serve until Ctrl-C
pub async fn start_server(config: &ServiceConfig, state: AppState) -> Result<()> {
    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    serve(listener, state, shutdown_signal()).await
}

/// Serve on an existing listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!("OCR API listening on {}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

    info!("OCR API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
