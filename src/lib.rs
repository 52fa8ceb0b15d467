// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod cli;
pub mod config;
pub mod version;
pub mod vision;

pub use config::ServiceConfig;
pub use vision::ocr::{
    OcrPipeline, PipelineConfig, PipelineError, PipelineResult, ReadingOrderConfig,
    RecognizedSpan, TextDetector, TextRecognizer,
};
pub use vision::VisionModelManager;
