// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision processing for CPU-based document OCR
//!
//! This module provides:
//! - Image decoding with format sniffing and size limits
//! - The adaptive OCR pipeline and its model capabilities
//! - One-shot model loading

pub mod image_utils;
pub mod model_manager;
pub mod ocr;

pub use image_utils::{decode_base64_bytes, decode_base64_image, decode_image_bytes, detect_format, ImageError, ImageInfo};
pub use model_manager::{InitializationError, OcrModelConfig, VisionModelInfo, VisionModelManager};
