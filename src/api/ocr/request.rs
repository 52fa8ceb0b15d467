// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! OCR request types and validation

use serde::{Deserialize, Serialize};

use crate::api::errors::ApiError;

/// Request for OCR processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrRequest {
    /// Base64-encoded image data
    #[serde(default)]
    pub image: Option<String>,
}

impl OcrRequest {
    /// Validate the OCR request and return the base64 payload
    pub fn validate(&self) -> Result<&str, ApiError> {
        match self.image.as_deref().map(str::trim) {
            Some(image) if !image.is_empty() => Ok(image),
            _ => Err(ApiError::ValidationError {
                field: "image".to_string(),
                message: "image is required".to_string(),
            }),
        }
    }
}
