// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod errors;
pub mod http_server;
pub mod ocr;

pub use errors::{ApiError, ErrorResponse};
pub use http_server::{create_router, serve, start_server, AppState};
pub use ocr::{ocr_handler, ocr_upload_handler, HealthResponse, ModelsResponse, OcrRequest};
