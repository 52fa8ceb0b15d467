// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! End-to-end OCR pipeline tests with stub model capabilities
//!
//! These tests verify that `OcrPipeline`:
//! - Returns spans in reading order with cleaned text
//! - Joins non-empty lines into `full_text`
//! - Keeps rectangle identity under per-line batching
//! - Fails only on undecodable input or detector errors
//! - Can be shared across threads

use adaptive_ocr::vision::ocr::{
    detection::{Detection, DetectionError, TextDetector},
    geometry::{Point, Polygon, Rectangle},
    pipeline::{OcrPipeline, PipelineConfig, PipelineError, RecognitionBatching, RecognizedSpan},
    recognition::TextRecognizer,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::Array4;
use std::io::Cursor;
use std::sync::Arc;
use std::thread;

fn quad(x1: f32, y1: f32, x2: f32, y2: f32) -> Polygon {
    vec![
        Point::new(x1, y1),
        Point::new(x2, y1),
        Point::new(x2, y2),
        Point::new(x1, y2),
    ]
}

/// Detector returning the same polygons for every image
struct FixedDetector(Vec<Polygon>);

impl TextDetector for FixedDetector {
    fn detect(
        &self,
        tensor: &Array4<f32>,
        _original_shape: (u32, u32),
    ) -> Result<Detection, DetectionError> {
        assert_eq!(tensor.shape()[1], 3);
        Ok(Detection {
            scores: vec![0.9; self.0.len()],
            polygons: self.0.clone(),
        })
    }
}

struct FailingDetector;

impl TextDetector for FailingDetector {
    fn detect(&self, _: &Array4<f32>, _: (u32, u32)) -> Result<Detection, DetectionError> {
        Err(DetectionError::Inference("model exploded".to_string()))
    }
}

/// Recognizer returning a constant
struct ConstRecognizer(&'static str);

impl TextRecognizer for ConstRecognizer {
    fn recognize(&self, _crop: &DynamicImage) -> String {
        self.0.to_string()
    }
}

/// Recognizer reporting the crop width, so order mistakes are visible
struct WidthRecognizer;

impl TextRecognizer for WidthRecognizer {
    fn recognize(&self, crop: &DynamicImage) -> String {
        format!("w{}", crop.width())
    }

    fn recognize_batch(&self, crops: &[DynamicImage]) -> Vec<String> {
        crops.iter().map(|c| self.recognize(c)).collect()
    }
}

fn page() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(120, 80, |x, y| {
        if (10..60).contains(&x) && (10..30).contains(&y) {
            Rgb([25, 25, 25])
        } else {
            Rgb([235, 235, 235])
        }
    }))
}

fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn config() -> PipelineConfig {
    PipelineConfig {
        target_short_side: 32,
        ..Default::default()
    }
}

fn pipeline(detector: impl TextDetector + 'static, recognizer: impl TextRecognizer + 'static) -> OcrPipeline {
    OcrPipeline::new(Arc::new(detector), Arc::new(recognizer), config())
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;

    /// Test 1: One box, recognizer always says "ABC"
    #[test]
    fn test_single_box_end_to_end() {
        let ocr = pipeline(
            FixedDetector(vec![quad(10.0, 10.0, 60.0, 30.0)]),
            ConstRecognizer("ABC"),
        );

        let result = ocr.process(&png_bytes(&page())).unwrap();

        assert_eq!(
            result.results,
            vec![RecognizedSpan {
                bbox: Rectangle::new(10, 10, 60, 30).unwrap(),
                text: "ABC".to_string(),
            }]
        );
        assert_eq!(result.full_text, "ABC");
        assert!(result.processing_time >= 0.0);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["results"][0]["bbox"], serde_json::json!([10, 10, 60, 30]));
        assert_eq!(json["results"][0]["text"], "ABC");
    }

    /// Test 2: Common OCR confusions are cleaned up
    #[test]
    fn test_text_cleanup() {
        let ocr = pipeline(
            FixedDetector(vec![quad(10.0, 10.0, 60.0, 30.0)]),
            ConstRecognizer("  |tem [a]  "),
        );

        let result = ocr.process_image(&page()).unwrap();
        assert_eq!(result.results[0].text, "Item (a)");
        assert_eq!(result.full_text, "Item (a)");
    }

    /// Test 3: Empty recognitions stay in results but not in full_text
    #[test]
    fn test_empty_text_spans_kept() {
        let ocr = pipeline(
            FixedDetector(vec![quad(10.0, 10.0, 60.0, 30.0), quad(10.0, 50.0, 40.0, 70.0)]),
            ConstRecognizer("   "),
        );

        let result = ocr.process_image(&page()).unwrap();
        assert_eq!(result.results.len(), 2);
        assert!(result.results.iter().all(|s| s.text.is_empty()));
        assert_eq!(result.full_text, "");
    }

    /// Test 4: Lines joined by newline, words by space, in reading order
    #[test]
    fn test_full_text_layout() {
        let ocr = pipeline(
            FixedDetector(vec![
                quad(10.0, 50.0, 40.0, 70.0),
                quad(70.0, 11.0, 110.0, 31.0),
                quad(10.0, 10.0, 60.0, 30.0),
            ]),
            WidthRecognizer,
        );

        let result = ocr.process_image(&page()).unwrap();
        assert_eq!(result.full_text, "w50 w40\nw30");
        let boxes: Vec<[u32; 4]> = result.results.iter().map(|s| s.bbox.to_array()).collect();
        assert_eq!(boxes, vec![[10, 10, 60, 30], [70, 11, 110, 31], [10, 50, 40, 70]]);
    }

    /// Test 5: Per-line batching gives the same answer as per-rectangle
    #[test]
    fn test_per_line_batching_matches() {
        let polygons = vec![
            quad(70.0, 11.0, 110.0, 31.0),
            quad(10.0, 10.0, 60.0, 30.0),
            quad(10.0, 50.0, 40.0, 70.0),
        ];
        let per_rect = pipeline(FixedDetector(polygons.clone()), WidthRecognizer);
        let per_line = OcrPipeline::new(
            Arc::new(FixedDetector(polygons)),
            Arc::new(WidthRecognizer),
            PipelineConfig {
                batching: RecognitionBatching::PerLine,
                ..config()
            },
        );

        let a = per_rect.process_image(&page()).unwrap();
        let b = per_line.process_image(&page()).unwrap();
        assert_eq!(a.results, b.results);
        assert_eq!(a.full_text, b.full_text);
    }

    /// Test 6: Out-of-bounds and degenerate polygons degrade gracefully
    #[test]
    fn test_bad_geometry_is_dropped() {
        let ocr = pipeline(
            FixedDetector(vec![
                quad(-30.0, -30.0, 500.0, 20.0),
                quad(200.0, 200.0, 300.0, 300.0),
                quad(5.0, 5.0, 5.0, 40.0),
                vec![],
            ]),
            ConstRecognizer("x"),
        );

        let result = ocr.process_image(&page()).unwrap();
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].bbox.to_array(), [0, 0, 119, 20]);
    }

    /// Test 7: No detections yields an empty result
    #[test]
    fn test_no_text_found() {
        let ocr = pipeline(FixedDetector(vec![]), ConstRecognizer("never"));
        let result = ocr.process_image(&page()).unwrap();
        assert!(result.results.is_empty());
        assert!(result.full_text.is_empty());
    }

    /// Test 8: Undecodable bytes fail with a decode error
    #[test]
    fn test_decode_error() {
        let ocr = pipeline(FixedDetector(vec![]), ConstRecognizer(""));

        assert!(matches!(ocr.process(b"not an image at all"), Err(PipelineError::Decode(_))));
        assert!(matches!(ocr.process(&[]), Err(PipelineError::Decode(_))));
    }

    /// Test 9: Detector failures abort the request
    #[test]
    fn test_detector_error_propagates() {
        let ocr = pipeline(FailingDetector, ConstRecognizer(""));
        let err = ocr.process(&png_bytes(&page())).unwrap_err();
        assert!(matches!(err, PipelineError::Detection(DetectionError::Inference(_))));
    }

    /// Test 10: One pipeline serves concurrent requests
    #[test]
    fn test_shared_across_threads() {
        let ocr = Arc::new(pipeline(
            FixedDetector(vec![quad(10.0, 10.0, 60.0, 30.0)]),
            ConstRecognizer("ABC"),
        ));
        let bytes = Arc::new(png_bytes(&page()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ocr = Arc::clone(&ocr);
                let bytes = Arc::clone(&bytes);
                thread::spawn(move || ocr.process(&bytes).unwrap())
            })
            .collect();

        for handle in handles {
            let result = handle.join().unwrap();
            assert_eq!(result.full_text, "ABC");
            assert_eq!(result.results.len(), 1);
        }
    }
}
