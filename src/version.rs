// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the adaptive OCR service

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "adaptive-preprocessing",
    "lighting-classification",
    "reading-order",
    "multi-column",
    "onnx-cpu",
    "per-line-batching",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("Adaptive OCR {}", VERSION_NUMBER)
}

/// Get full version info for API responses
pub fn get_version_info() -> serde_json::Value {
    serde_json::json!({
        "version": VERSION_NUMBER,
        "features": FEATURES,
    })
}
