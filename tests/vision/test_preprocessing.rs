// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Adaptive preprocessing tests
//!
//! These tests verify that the preprocessor:
//! - Resizes to exact multiples of 32 at or above the target short side
//! - Produces a `[1, 3, H, W]` tensor in `[0, 1]`
//! - Picks the lighting class from mean brightness
//! - Keeps dark pages legible through the filter chain

use adaptive_ocr::vision::ocr::{
    preprocessing::{resized_dimensions, AdaptivePreprocessor, SIZE_MULTIPLE},
    strategy::{adapt, LightingClass, CLIP_LIMIT_RANGE, SIGMA_RANGE},
    Characteristics,
};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

/// Light page with a dark bar of "text"
fn document(width: u32, height: u32, paper: u8, ink: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        if y > height / 3 && y < height / 2 && x > width / 8 && x < width * 7 / 8 {
            Rgb([ink, ink, ink])
        } else {
            Rgb([paper, paper, paper])
        }
    }))
}

#[cfg(test)]
mod preprocessing_tests {
    use super::*;

    /// Test 1: Output sides are multiples of 32 and cover the target
    #[test]
    fn test_dimensions_are_multiples_of_32() {
        for &(h, w, target) in &[
            (80, 120, 64),
            (1000, 700, 640),
            (33, 33, 32),
            (1, 500, 48),
            (640, 640, 640),
            (479, 1280, 100),
        ] {
            let (new_h, new_w) = resized_dimensions(h, w, target);
            let floor = target.div_ceil(SIZE_MULTIPLE) * SIZE_MULTIPLE;

            assert_eq!(new_h % SIZE_MULTIPLE, 0, "height for {}x{}", w, h);
            assert_eq!(new_w % SIZE_MULTIPLE, 0, "width for {}x{}", w, h);
            assert!(new_h.min(new_w) >= floor, "{}x{} -> {}x{}", w, h, new_w, new_h);
        }
    }

    /// Test 2: Preprocess yields a normalized NCHW tensor
    #[test]
    fn test_preprocess_tensor_shape() {
        let prepared = AdaptivePreprocessor::new().preprocess(&document(90, 60, 220, 30), 64);

        let (h, w) = prepared.resized;
        assert_eq!((h, w), (64, 96));
        assert_eq!(prepared.tensor.shape(), &[1, 3, h as usize, w as usize]);
        assert_eq!(prepared.image.dimensions(), (w, h));
        assert!(prepared.tensor.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    /// Test 3: Lighting class follows the page brightness
    #[test]
    fn test_lighting_classification() {
        let preprocessor = AdaptivePreprocessor::new();

        let dark = preprocessor.preprocess(&document(64, 64, 40, 10), 32);
        assert!(dark.lighting.is_dark());

        let bright = preprocessor.preprocess(&document(64, 64, 250, 200), 32);
        assert_eq!(bright.lighting, LightingClass::VeryBright);

        let flat = DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 40, Luma([120])));
        let normal = preprocessor.preprocess(&flat, 32);
        assert_eq!(normal.lighting, LightingClass::Normal);
        assert!(normal.characteristics.low_contrast);
    }

    /// Test 4: A dark page keeps its text darker than the paper
    #[test]
    fn test_dark_page_output_keeps_contrast() {
        let prepared = AdaptivePreprocessor::new().preprocess(&document(128, 96, 35, 5), 64);
        assert!(prepared.lighting.is_dark());

        let (h, w) = prepared.resized;
        let gray = DynamicImage::ImageRgb8(prepared.image.clone()).to_luma8();
        let first = gray.get_pixel(0, 0)[0];
        assert!(gray.pixels().any(|p| p[0] != first), "output is a flat frame");

        // sample by position in the source page: bar spans rows 33..47, columns 17..111
        let (mut ink, mut paper) = (Vec::new(), Vec::new());
        for (x, y, p) in gray.enumerate_pixels() {
            let (sx, sy) = (x * 128 / w, y * 96 / h);
            if (36..44).contains(&sy) && (24..104).contains(&sx) {
                ink.push(p[0] as f64);
            } else if sy < 24 || sy > 60 {
                paper.push(p[0] as f64);
            }
        }
        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        assert!(!ink.is_empty() && !paper.is_empty());
        assert!(
            mean(&ink) + 30.0 < mean(&paper),
            "ink {:.1} vs paper {:.1}",
            mean(&ink),
            mean(&paper)
        );
    }

    /// Test 5: Every class/flag combination stays within the safe ranges
    #[test]
    fn test_strategy_safe_ranges() {
        let classes = [
            LightingClass::VeryDark,
            LightingClass::Dark,
            LightingClass::Normal,
            LightingClass::Bright,
            LightingClass::VeryBright,
        ];

        for class in classes {
            for bits in 0..16u8 {
                let flags = Characteristics {
                    high_contrast: bits & 1 != 0,
                    low_contrast: bits & 2 != 0,
                    blurred: bits & 4 != 0,
                    clear: bits & 8 != 0,
                };
                let s = adapt(class, flags);

                assert!((CLIP_LIMIT_RANGE.0..=CLIP_LIMIT_RANGE.1).contains(&s.clip_limit));
                assert!((SIGMA_RANGE.0..=SIGMA_RANGE.1).contains(&s.sigma_color));
                assert!((SIGMA_RANGE.0..=SIGMA_RANGE.1).contains(&s.sigma_space));
                assert!(s.tile_grid >= 1);
                assert_eq!(s, adapt(class, flags), "adapt must be deterministic");
            }
        }
    }
}
