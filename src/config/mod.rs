// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service configuration
//!
//! Loaded from environment variables ([`ServiceConfig::from_env`]) or a TOML
//! file ([`ServiceConfig::from_file`]); call [`ServiceConfig::validate`]
//! before use.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::vision::image_utils::DEFAULT_MAX_IMAGE_BYTES;
use crate::vision::model_manager::OcrModelConfig;
use crate::vision::ocr::detection::DetectionConfig;
use crate::vision::ocr::pipeline::{PipelineConfig, RecognitionBatching};
use crate::vision::ocr::preprocessing::{DEFAULT_TARGET_SHORT_SIDE, SIZE_MULTIPLE};
use crate::vision::ocr::reading_order::ReadingOrderConfig;

/// Everything the service and CLI need to build and serve the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on an encoded upload
    pub max_image_bytes: usize,
    /// Short side of the detection input before rounding to 32
    pub target_short_side: u32,
    pub model: OcrModelConfig,
    pub detection: DetectionConfig,
    pub reading_order: ReadingOrderConfig,
    pub recognition_batching: RecognitionBatching,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            target_short_side: DEFAULT_TARGET_SHORT_SIDE,
            model: OcrModelConfig::default(),
            detection: DetectionConfig::default(),
            reading_order: ReadingOrderConfig::default(),
            recognition_batching: RecognitionBatching::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file; missing keys take defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load configuration from environment variables
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `OCR_HOST` / `OCR_PORT` | `host` / `port` |
    /// | `OCR_MAX_IMAGE_BYTES` | `max_image_bytes` |
    /// | `OCR_TARGET_SHORT_SIDE` | `target_short_side` |
    /// | `OCR_MODEL_DIR` | `model.model_dir` |
    /// | `OCR_INTRA_THREADS` | `model.intra_threads` |
    /// | `OCR_BOX_THRESHOLD` | `detection.box_threshold` |
    /// | `OCR_RECOGNITION_BATCHING` | `per_rectangle` or `per_line` |
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("OCR_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var(&lookup, "OCR_PORT") {
            config.port = port;
        }
        if let Some(bytes) = parse_var(&lookup, "OCR_MAX_IMAGE_BYTES") {
            config.max_image_bytes = bytes;
        }
        if let Some(side) = parse_var(&lookup, "OCR_TARGET_SHORT_SIDE") {
            config.target_short_side = side;
        }
        if let Some(dir) = lookup("OCR_MODEL_DIR") {
            config.model.model_dir = PathBuf::from(dir);
        }
        if let Some(threads) = parse_var(&lookup, "OCR_INTRA_THREADS") {
            config.model.intra_threads = threads;
        }
        if let Some(threshold) = parse_var(&lookup, "OCR_BOX_THRESHOLD") {
            config.detection.box_threshold = threshold;
        }
        match lookup("OCR_RECOGNITION_BATCHING").as_deref().map(str::trim) {
            Some("per_line") => config.recognition_batching = RecognitionBatching::PerLine,
            Some("per_rectangle") => config.recognition_batching = RecognitionBatching::PerRectangle,
            _ => {}
        }

        config
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.target_short_side < SIZE_MULTIPLE {
            return Err(format!(
                "target_short_side must be at least {}",
                SIZE_MULTIPLE
            ));
        }
        if self.max_image_bytes == 0 {
            return Err("max_image_bytes must be greater than 0".to_string());
        }
        if self.model.intra_threads == 0 {
            return Err("model.intra_threads must be greater than 0".to_string());
        }

        let ro = &self.reading_order;
        if !(ro.merge_factor > 0.0 && ro.merge_factor < ro.grouping_factor) {
            return Err(format!(
                "reading_order.merge_factor must be in (0, grouping_factor = {})",
                ro.grouping_factor
            ));
        }
        if ro.gap_factor <= 1.0 {
            return Err("reading_order.gap_factor must be greater than 1".to_string());
        }

        let det = &self.detection;
        for (name, value) in [
            ("detection.binary_threshold", det.binary_threshold),
            ("detection.box_threshold", det.box_threshold),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(format!("{} must be in (0, 1), got {}", name, value));
            }
        }
        if det.unclip_ratio <= 0.0 {
            return Err("detection.unclip_ratio must be greater than 0".to_string());
        }
        if det.max_candidates == 0 {
            return Err("detection.max_candidates must be greater than 0".to_string());
        }

        Ok(())
    }

    /// `host:port` for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            target_short_side: self.target_short_side,
            max_image_bytes: self.max_image_bytes,
            reading_order: self.reading_order.clone(),
            batching: self.recognition_batching,
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}
