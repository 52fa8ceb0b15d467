// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! End-to-end OCR pipeline
//!
//! decode -> analyze/classify/adapt/preprocess -> detect -> normalize boxes
//! -> reading order -> crop and recognize -> assemble.

use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::detection::{DetectionError, TextDetector};
use super::geometry::{normalize_boxes, Rectangle};
use super::preprocessing::{AdaptivePreprocessor, DEFAULT_TARGET_SHORT_SIDE};
use super::reading_order::{reconstruct, ReadingOrderConfig};
use super::recognition::{clean_text, TextRecognizer};
use crate::vision::image_utils::{decode_image_bytes_with_limit, ImageError, DEFAULT_MAX_IMAGE_BYTES};

/// Conditions that abort a whole request
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Could not decode image: {0}")]
    Decode(#[from] ImageError),

    #[error(transparent)]
    Detection(#[from] DetectionError),
}

/// How crops are handed to the recognizer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionBatching {
    /// One `recognize` call per rectangle
    #[default]
    PerRectangle,
    /// One `recognize_batch` call per line
    PerLine,
}

/// Tunables for [`OcrPipeline`]
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub target_short_side: u32,
    pub max_image_bytes: usize,
    pub reading_order: ReadingOrderConfig,
    pub batching: RecognitionBatching,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_short_side: DEFAULT_TARGET_SHORT_SIDE,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            reading_order: ReadingOrderConfig::default(),
            batching: RecognitionBatching::default(),
        }
    }
}

/// One recognized rectangle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedSpan {
    /// `[x1, y1, x2, y2]` in original-image pixels
    pub bbox: Rectangle,
    /// Cleaned text; may be empty
    pub text: String,
}

/// Output of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Spans in reading order
    pub results: Vec<RecognizedSpan>,
    /// Non-empty span texts joined by spaces per line, lines joined by `\n`
    pub full_text: String,
    /// Wall-clock seconds from entry to return
    pub processing_time: f64,
}

/// Detector and recognizer plus the deterministic logic around them
///
/// Built once and shared read-only (`Arc<OcrPipeline>`) by every request.
pub struct OcrPipeline {
    detector: Arc<dyn TextDetector>,
    recognizer: Arc<dyn TextRecognizer>,
    preprocessor: AdaptivePreprocessor,
    config: PipelineConfig,
}

impl std::fmt::Debug for OcrPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OcrPipeline {
    pub fn new(
        detector: Arc<dyn TextDetector>,
        recognizer: Arc<dyn TextRecognizer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            detector,
            recognizer,
            preprocessor: AdaptivePreprocessor::new(),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run OCR on encoded image bytes
    ///
    /// # Errors
    /// [`PipelineError::Decode`] when the bytes are not a supported image,
    /// [`PipelineError::Detection`] when the detector fails. Geometry
    /// problems and recognizer failures never abort the request.
    pub fn process(&self, bytes: &[u8]) -> Result<PipelineResult, PipelineError> {
        let start = Instant::now();
        let (image, info) = decode_image_bytes_with_limit(bytes, self.config.max_image_bytes)?;
        debug!(
            "Decoded {:?} image, {} bytes, {}x{}",
            info.format, info.size_bytes, info.width, info.height
        );
        self.run(&image, start)
    }

    /// Run OCR on an already decoded image
    pub fn process_image(&self, image: &DynamicImage) -> Result<PipelineResult, PipelineError> {
        self.run(image, Instant::now())
    }

    fn run(&self, image: &DynamicImage, start: Instant) -> Result<PipelineResult, PipelineError> {
        let (orig_w, orig_h) = image.dimensions();

        let prepared = self
            .preprocessor
            .preprocess(image, self.config.target_short_side);
        debug!(
            "Preprocessed {}x{} -> {}x{} ({}, {:?})",
            orig_w, orig_h, prepared.resized.1, prepared.resized.0, prepared.lighting, prepared.strategy
        );

        let detection = self.detector.detect(&prepared.tensor, (orig_h, orig_w))?;
        let rects = normalize_boxes(&detection.polygons, orig_w, orig_h);
        debug!(
            "Detector returned {} polygons, {} valid rectangles",
            detection.len(),
            rects.len()
        );

        let lines = reconstruct(&rects, &self.config.reading_order);
        debug!("Reconstructed {} lines", lines.len());

        let mut results = Vec::with_capacity(rects.len());
        let mut line_texts = Vec::with_capacity(lines.len());

        for line in &lines {
            let (bboxes, crops): (Vec<Rectangle>, Vec<DynamicImage>) = line
                .rectangles()
                .iter()
                .filter_map(|rect| crop(image, rect).map(|c| (*rect, c)))
                .unzip();

            let texts = self.recognize_line(&crops);

            let mut words = Vec::with_capacity(texts.len());
            for (bbox, raw) in bboxes.into_iter().zip(texts) {
                let text = clean_text(&raw);
                if !text.is_empty() {
                    words.push(text.clone());
                }
                results.push(RecognizedSpan { bbox, text });
            }

            let joined = words.join(" ");
            if !joined.trim().is_empty() {
                line_texts.push(joined);
            }
        }

        let processing_time = start.elapsed().as_secs_f64();
        info!(
            "OCR finished: {} spans in {} lines, {:.3}s",
            results.len(),
            line_texts.len(),
            processing_time
        );

        Ok(PipelineResult {
            results,
            full_text: line_texts.join("\n"),
            processing_time,
        })
    }

    /// One text per crop, in crop order
    fn recognize_line(&self, crops: &[DynamicImage]) -> Vec<String> {
        match self.config.batching {
            RecognitionBatching::PerRectangle => crops
                .iter()
                .map(|crop| self.recognizer.recognize(crop))
                .collect(),
            RecognitionBatching::PerLine => {
                if crops.is_empty() {
                    return Vec::new();
                }
                let mut texts = self.recognizer.recognize_batch(crops);
                if texts.len() != crops.len() {
                    warn!(
                        "Recognizer returned {} texts for {} crops",
                        texts.len(),
                        crops.len()
                    );
                    texts.resize(crops.len(), String::new());
                }
                texts
            }
        }
    }
}

/// Crop the original image; `None` when the region is empty
fn crop(image: &DynamicImage, rect: &Rectangle) -> Option<DynamicImage> {
    let crop = image.crop_imm(rect.x1(), rect.y1(), rect.width(), rect.height());
    (crop.width() > 0 && crop.height() > 0).then_some(crop)
}
