// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! OCR endpoint tests for POST /v1/ocr and POST /v1/ocr/upload
//!
//! These tests verify that the handlers:
//! - Run the pipeline on base64 and multipart images
//! - Return the pipeline result as JSON
//! - Map validation, decode and detection failures to status codes

use adaptive_ocr::{
    api::{create_router, AppState, ErrorResponse},
    vision::{
        model_manager::{VisionModelInfo, VisionModelManager},
        ocr::{
            detection::{Detection, DetectionError, TextDetector},
            geometry::Point,
            pipeline::{OcrPipeline, PipelineConfig, PipelineResult},
            recognition::TextRecognizer,
        },
    },
};
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::Array4;
use serde::de::DeserializeOwned;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot`

struct OneBoxDetector;

impl TextDetector for OneBoxDetector {
    fn detect(&self, _: &Array4<f32>, _: (u32, u32)) -> Result<Detection, DetectionError> {
        Ok(Detection {
            polygons: vec![vec![
                Point::new(10.0, 10.0),
                Point::new(60.0, 10.0),
                Point::new(60.0, 30.0),
                Point::new(10.0, 30.0),
            ]],
            scores: vec![0.95],
        })
    }
}

struct BrokenDetector;

impl TextDetector for BrokenDetector {
    fn detect(&self, _: &Array4<f32>, _: (u32, u32)) -> Result<Detection, DetectionError> {
        Err(DetectionError::UnexpectedOutputShape(vec![1, 2]))
    }
}

struct AbcRecognizer;

impl TextRecognizer for AbcRecognizer {
    fn recognize(&self, _: &DynamicImage) -> String {
        "ABC".to_string()
    }
}

/// Helper: AppState around stub capabilities
fn setup_state(detector: Arc<dyn TextDetector>) -> AppState {
    let pipeline = OcrPipeline::new(
        detector,
        Arc::new(AbcRecognizer),
        PipelineConfig {
            target_short_side: 32,
            max_image_bytes: 256 * 1024,
            ..Default::default()
        },
    );
    let manager = VisionModelManager::from_pipeline(
        Arc::new(pipeline),
        vec![VisionModelInfo {
            name: "stub-det".to_string(),
            model_type: "detection".to_string(),
            path: PathBuf::from("/dev/null"),
        }],
    );
    AppState::new(&manager)
}

fn png_bytes() -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_fn(100, 50, |x, y| {
        if (10..60).contains(&x) && (10..30).contains(&y) {
            Rgb([20, 20, 20])
        } else {
            Rgb([240, 240, 240])
        }
    }));
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn multipart_request(field: &str, data: &[u8]) -> Request<Body> {
    let boundary = "XOCRBOUNDARY";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"page.png\"\r\n",
            field
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/v1/ocr/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn read_json<T: DeserializeOwned>(response: Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[cfg(test)]
mod ocr_endpoint_tests {
    use super::*;

    /// Test 1: Valid base64 image returns the recognized span
    #[tokio::test]
    async fn test_ocr_base64_success() {
        let app = create_router(setup_state(Arc::new(OneBoxDetector)));
        let request = json_request(
            "/v1/ocr",
            serde_json::json!({ "image": STANDARD.encode(png_bytes()) }),
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let result: PipelineResult = read_json(response).await;
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].bbox.to_array(), [10, 10, 60, 30]);
        assert_eq!(result.results[0].text, "ABC");
        assert_eq!(result.full_text, "ABC");
    }

    /// Test 2: Missing image is a validation error
    #[tokio::test]
    async fn test_ocr_missing_image() {
        let app = create_router(setup_state(Arc::new(OneBoxDetector)));

        let response = app
            .oneshot(json_request("/v1/ocr", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let error: ErrorResponse = read_json(response).await;
        assert_eq!(error.error_type, "validation_error");
    }

    /// Test 3: Invalid base64 and non-image payloads are 400
    #[tokio::test]
    async fn test_ocr_invalid_image() {
        let state = setup_state(Arc::new(OneBoxDetector));

        for image in ["%%%not-base64%%%".to_string(), STANDARD.encode(b"plain text, no image")] {
            let response = create_router(state.clone())
                .oneshot(json_request("/v1/ocr", serde_json::json!({ "image": image })))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let error: ErrorResponse = read_json(response).await;
            assert_eq!(error.error_type, "invalid_image");
        }
    }

    /// Test 4: Detector failure is a server error
    #[tokio::test]
    async fn test_ocr_detector_failure() {
        let app = create_router(setup_state(Arc::new(BrokenDetector)));
        let request = json_request(
            "/v1/ocr",
            serde_json::json!({ "image": STANDARD.encode(png_bytes()) }),
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let error: ErrorResponse = read_json(response).await;
        assert_eq!(error.error_type, "internal_error");
    }

    /// Test 5: Images above the configured limit are rejected
    #[tokio::test]
    async fn test_ocr_image_too_large() {
        let app = create_router(setup_state(Arc::new(OneBoxDetector)));
        let oversized = STANDARD.encode(vec![0u8; 300 * 1024]);

        let response = app
            .oneshot(json_request("/v1/ocr", serde_json::json!({ "image": oversized })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    /// Test 6: Multipart upload with a `file` field
    #[tokio::test]
    async fn test_upload_success() {
        let app = create_router(setup_state(Arc::new(OneBoxDetector)));

        let response = app
            .oneshot(multipart_request("file", &png_bytes()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let result: PipelineResult = read_json(response).await;
        assert_eq!(result.full_text, "ABC");
    }

    /// Test 7: Multipart upload without a `file` field
    #[tokio::test]
    async fn test_upload_missing_field() {
        let app = create_router(setup_state(Arc::new(OneBoxDetector)));

        let response = app
            .oneshot(multipart_request("attachment", &png_bytes()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let error: ErrorResponse = read_json(response).await;
        assert_eq!(error.error_type, "validation_error");
        assert!(error.message.contains("file"));
    }
}
