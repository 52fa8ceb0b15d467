// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! OCR endpoints
//!
//! - `POST /v1/ocr` - base64 image in a JSON body
//! - `POST /v1/ocr/upload` - multipart upload, field `file`

pub mod handler;
pub mod request;
pub mod response;

pub use handler::{health_handler, models_handler, ocr_handler, ocr_upload_handler};
pub use request::OcrRequest;
pub use response::{HealthResponse, ModelsResponse};
