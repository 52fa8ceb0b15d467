// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Context, Result};
use clap::Args;
use image::DynamicImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::ServiceConfig;
use crate::vision::image_utils::decode_image_bytes_with_limit;
use crate::vision::model_manager::VisionModelManager;
use crate::vision::ocr::analyzer::{analyze as analyze_image, ImageMetrics};
use crate::vision::ocr::pipeline::RecognitionBatching;
use crate::vision::ocr::strategy::{adapt, classify, Characteristics, FilterStrategy, LightingClass};

/// Arguments for the scan command
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Image file to read
    pub image: PathBuf,

    /// TOML configuration file (defaults to OCR_* environment variables)
    #[arg(long, env = "OCR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Recognize one batch per line instead of one call per rectangle
    #[arg(long)]
    pub per_line: bool,

    /// Override the model directory
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,
}

/// Arguments for the analyze command
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Image file to read
    pub image: PathBuf,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,
}

/// What the adaptive preprocessor would do with an image
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub width: u32,
    pub height: u32,
    pub metrics: ImageMetrics,
    pub lighting: LightingClass,
    pub characteristics: Characteristics,
    pub strategy: FilterStrategy,
}

impl AnalysisReport {
    pub fn from_image(image: &DynamicImage) -> Self {
        let metrics = analyze_image(image);
        let (lighting, characteristics) = classify(&metrics);
        Self {
            width: image.width(),
            height: image.height(),
            metrics,
            lighting,
            characteristics,
            strategy: adapt(lighting, characteristics),
        }
    }
}

/// Resolve configuration for a scan: file, then environment, then flags
pub fn load_config(args: &ScanArgs) -> Result<ServiceConfig> {
    let mut config = match &args.config {
        Some(path) => ServiceConfig::from_file(path)?,
        None => ServiceConfig::from_env(),
    };

    if args.per_line {
        config.recognition_batching = RecognitionBatching::PerLine;
    }
    if let Some(dir) = &args.model_dir {
        config.model.model_dir = dir.clone();
    }

    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}

pub async fn scan(args: ScanArgs) -> Result<()> {
    let config = load_config(&args)?;
    let bytes = read_image(&args.image).await?;

    let result = tokio::task::spawn_blocking(move || {
        let manager = VisionModelManager::load(
            &config.model,
            config.detection.clone(),
            config.pipeline_config(),
        )?;
        info!("Loaded {} models", manager.list_models().len());
        manager.pipeline().process(&bytes).map_err(anyhow::Error::from)
    })
    .await
    .context("OCR task failed")??;

    print_json(&result, args.pretty)
}

pub async fn analyze(args: AnalyzeArgs) -> Result<()> {
    let bytes = read_image(&args.image).await?;
    let (image, _) = decode_image_bytes_with_limit(&bytes, usize::MAX)
        .with_context(|| format!("Failed to decode {}", args.image.display()))?;

    print_json(&AnalysisReport::from_image(&image), args.pretty)
}

async fn read_image(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json);
    Ok(())
}
