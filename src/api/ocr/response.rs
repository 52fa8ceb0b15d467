// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Response bodies for the service endpoints
//!
//! OCR responses are the pipeline's own `PipelineResult`.

use serde::{Deserialize, Serialize};

use crate::vision::model_manager::VisionModelInfo;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Models loaded at startup
#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<VisionModelInfo>,
}
