// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Route registration tests
//!
//! These tests verify that:
//! - /health answers without touching the models
//! - /v1/models lists the loaded models
//! - OCR routes only accept POST
//! - Unknown routes are 404

use adaptive_ocr::{
    api::{create_router, AppState, HealthResponse},
    vision::{
        model_manager::{VisionModelInfo, VisionModelManager},
        ocr::{
            detection::{Detection, DetectionError, TextDetector},
            pipeline::{OcrPipeline, PipelineConfig},
            recognition::TextRecognizer,
        },
    },
};
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
};
use image::DynamicImage;
use ndarray::Array4;
use std::path::PathBuf;
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot`

struct NoTextDetector;

impl TextDetector for NoTextDetector {
    fn detect(&self, _: &Array4<f32>, _: (u32, u32)) -> Result<Detection, DetectionError> {
        Ok(Detection::default())
    }
}

struct SilentRecognizer;

impl TextRecognizer for SilentRecognizer {
    fn recognize(&self, _: &DynamicImage) -> String {
        String::new()
    }
}

/// Helper: AppState with two listed models
fn setup_state() -> AppState {
    let pipeline = OcrPipeline::new(
        Arc::new(NoTextDetector),
        Arc::new(SilentRecognizer),
        PipelineConfig::default(),
    );
    let models = vec![
        VisionModelInfo {
            name: "det_model.onnx".to_string(),
            model_type: "detection".to_string(),
            path: PathBuf::from("/models/det_model.onnx"),
        },
        VisionModelInfo {
            name: "rec_model.onnx".to_string(),
            model_type: "recognition".to_string(),
            path: PathBuf::from("/models/rec_model.onnx"),
        },
    ];
    AppState::new(&VisionModelManager::from_pipeline(Arc::new(pipeline), models))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[cfg(test)]
mod route_registration_tests {
    use super::*;

    /// Test 1: Health check returns {"status":"ok"}
    #[tokio::test]
    async fn test_health() {
        let response = create_router(setup_state()).oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: HealthResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(health, HealthResponse::ok());
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&bytes).unwrap(),
            serde_json::json!({ "status": "ok" })
        );
    }

    /// Test 2: Models endpoint lists both capabilities
    #[tokio::test]
    async fn test_models_listed() {
        let response = create_router(setup_state()).oneshot(get("/v1/models")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let types: Vec<&str> = json["models"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["model_type"].as_str().unwrap())
            .collect();
        assert_eq!(types, vec!["detection", "recognition"]);
    }

    /// Test 3: Version endpoint reports the crate version
    #[tokio::test]
    async fn test_version() {
        let response = create_router(setup_state()).oneshot(get("/v1/version")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    /// Test 4: OCR routes reject GET
    #[tokio::test]
    async fn test_ocr_routes_reject_get() {
        for uri in ["/v1/ocr", "/v1/ocr/upload"] {
            let response = create_router(setup_state()).oneshot(get(uri)).await.unwrap();
            assert_eq!(
                response.status(),
                StatusCode::METHOD_NOT_ALLOWED,
                "GET {} should be rejected with 405",
                uri
            );
        }
    }

    /// Test 5: Unknown routes are not found
    #[tokio::test]
    async fn test_unknown_route() {
        let response = create_router(setup_state()).oneshot(get("/v1/inference")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    /// Test 6: Body limit covers base64 inflation of the image limit
    #[test]
    fn test_body_limit() {
        let state = setup_state();
        assert!(state.body_limit() > state.max_image_bytes * 4 / 3);
    }
}
