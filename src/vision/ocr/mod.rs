// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Adaptive OCR for photographed documents
//!
//! Components:
//! - `analyzer` - brightness, contrast and sharpness metrics
//! - `strategy` - lighting classification and filter parameter selection
//! - `filters` / `preprocessing` - the adaptive normalization chain
//! - `geometry` - detector polygons to clamped rectangles
//! - `reading_order` - lines, columns and reading sequence
//! - `detection` / `recognition` - model capabilities (ONNX)
//! - `pipeline` - end-to-end orchestration

pub mod analyzer;
pub mod detection;
pub mod filters;
pub mod geometry;
pub mod pipeline;
pub mod preprocessing;
pub mod reading_order;
pub mod recognition;
pub mod strategy;

pub use analyzer::{analyze, ImageMetrics};
pub use detection::{Detection, DetectionConfig, DetectionError, OnnxTextDetector, TextDetector};
pub use geometry::{normalize_boxes, Point, Polygon, Rectangle};
pub use pipeline::{
    OcrPipeline, PipelineConfig, PipelineError, PipelineResult, RecognitionBatching,
    RecognizedSpan,
};
pub use preprocessing::{AdaptivePreprocessor, PreprocessedImage};
pub use reading_order::{reconstruct, Column, Line, ReadingOrderConfig};
pub use recognition::{clean_text, OnnxTextRecognizer, TextRecognizer};
pub use strategy::{adapt, classify, Characteristics, FilterStrategy, LightingClass};
