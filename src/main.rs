// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use adaptive_ocr::{
    api::{start_server, AppState},
    config::ServiceConfig,
    version,
    vision::VisionModelManager,
};
use anyhow::{anyhow, Context, Result};
use std::env;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    info!("Starting {}", version::get_version_string());

    let config = match env::var("OCR_CONFIG") {
        Ok(path) => ServiceConfig::from_file(&path)?,
        Err(_) => ServiceConfig::from_env(),
    };
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    // Models load once; failure here is fatal and nothing is served
    let model_config = config.model.clone();
    let detection = config.detection.clone();
    let pipeline_config = config.pipeline_config();
    let manager = tokio::task::spawn_blocking(move || {
        VisionModelManager::load(&model_config, detection, pipeline_config)
    })
    .await
    .context("Model loading task failed")?
    .context("Failed to initialize OCR models")?;

    for model in manager.list_models() {
        info!("  {} model: {}", model.model_type, model.path.display());
    }

    start_server(&config, AppState::new(&manager)).await?;

    info!("Goodbye");
    Ok(())
}
