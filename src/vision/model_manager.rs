// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! One-shot construction of the shared OCR pipeline
//!
//! Models are loaded exactly once at startup. Any failure aborts
//! construction; there is no partially initialized manager.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::vision::ocr::detection::{DetectionConfig, OnnxTextDetector};
use crate::vision::ocr::pipeline::{OcrPipeline, PipelineConfig};
use crate::vision::ocr::recognition::OnnxTextRecognizer;

/// Model construction failures; fatal for the process
#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Model directory not found: {0}")]
    ModelDirMissing(PathBuf),

    #[error("Failed to load text detector: {0}")]
    Detector(String),

    #[error("Failed to load text recognizer: {0}")]
    Recognizer(String),

    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),
}

/// Where the ONNX models and dictionary live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrModelConfig {
    pub model_dir: PathBuf,
    pub detector_file: String,
    pub recognizer_file: String,
    pub dictionary_file: String,
    /// ONNX Runtime intra-op threads per session
    pub intra_threads: usize,
}

impl Default for OcrModelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("./models/ocr-onnx"),
            detector_file: "det_model.onnx".to_string(),
            recognizer_file: "rec_model.onnx".to_string(),
            dictionary_file: "ppocr_keys_v1.txt".to_string(),
            intra_threads: 4,
        }
    }
}

impl OcrModelConfig {
    pub fn detector_path(&self) -> PathBuf {
        self.model_dir.join(&self.detector_file)
    }

    pub fn recognizer_path(&self) -> PathBuf {
        self.model_dir.join(&self.recognizer_file)
    }

    pub fn dictionary_path(&self) -> PathBuf {
        self.model_dir.join(&self.dictionary_file)
    }
}

/// Information about a loaded model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisionModelInfo {
    pub name: String,
    /// `detection` or `recognition`
    pub model_type: String,
    pub path: PathBuf,
}

/// Owns the process-wide pipeline built from ONNX models
#[derive(Debug, Clone)]
pub struct VisionModelManager {
    pipeline: Arc<OcrPipeline>,
    models: Vec<VisionModelInfo>,
}

impl VisionModelManager {
    /// Load both models and build the pipeline
    ///
    /// # Errors
    /// Returns [`InitializationError`] if the directory or any file is
    /// missing, or ONNX Runtime rejects a model.
    pub fn load(
        models: &OcrModelConfig,
        detection: DetectionConfig,
        pipeline: PipelineConfig,
    ) -> Result<Self, InitializationError> {
        if models.intra_threads == 0 {
            return Err(InitializationError::InvalidConfig(
                "intra_threads must be at least 1".to_string(),
            ));
        }
        if !models.model_dir.is_dir() {
            return Err(InitializationError::ModelDirMissing(models.model_dir.clone()));
        }

        let detector = OnnxTextDetector::new(models.detector_path(), models.intra_threads, detection)
            .map_err(|e| InitializationError::Detector(format!("{:#}", e)))?;

        let recognizer = OnnxTextRecognizer::new(
            models.recognizer_path(),
            models.dictionary_path(),
            models.intra_threads,
        )
        .map_err(|e| InitializationError::Recognizer(format!("{:#}", e)))?;

        info!(
            "OCR models loaded from {} (dictionary: {} characters)",
            models.model_dir.display(),
            recognizer.dictionary_size()
        );

        Ok(Self::from_pipeline(
            Arc::new(OcrPipeline::new(
                Arc::new(detector),
                Arc::new(recognizer),
                pipeline,
            )),
            vec![
                VisionModelInfo {
                    name: models.detector_file.clone(),
                    model_type: "detection".to_string(),
                    path: models.detector_path(),
                },
                VisionModelInfo {
                    name: models.recognizer_file.clone(),
                    model_type: "recognition".to_string(),
                    path: models.recognizer_path(),
                },
            ],
        ))
    }

    /// Wrap an already built pipeline (custom capabilities, tests)
    pub fn from_pipeline(pipeline: Arc<OcrPipeline>, models: Vec<VisionModelInfo>) -> Self {
        Self { pipeline, models }
    }

    pub fn pipeline(&self) -> Arc<OcrPipeline> {
        Arc::clone(&self.pipeline)
    }

    pub fn list_models(&self) -> &[VisionModelInfo] {
        &self.models
    }
}
