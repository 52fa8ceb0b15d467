// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing for the detection and recognition models
//!
//! Detection input goes through the adaptive chain:
//! 1. Resize so the short side equals the target, then round both sides up
//!    to a multiple of 32
//! 2. Min-max brightness renormalization, range chosen by lighting class
//! 3. CLAHE with the strategy's clip limit and tile grid
//! 4. Bilateral smoothing
//! 5. Morphological closing (dark classes only)
//! 6. Non-local means denoising
//! 7. Unsharp mask, only when the original image was not blurry
//!
//! The order is part of the output contract; changing it changes results.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, RgbImage};
use ndarray::Array4;
use tracing::debug;

use super::analyzer::{analyze_gray, ImageMetrics};
use super::filters;
use super::strategy::{adapt, classify, Characteristics, FilterStrategy, LightingClass};

/// Default short side for detection input
pub const DEFAULT_TARGET_SHORT_SIDE: u32 = 640;

/// Detector downsampling factor; resized sides are multiples of this
pub const SIZE_MULTIPLE: u32 = 32;

/// Sharpening only runs when the original sharpness exceeds this
pub const SHARPEN_FLOOR: f64 = 80.0;

/// Recognition model input height (PP-OCRv5 English model uses 48)
pub const REC_INPUT_HEIGHT: u32 = 48;

/// Maximum width for recognition model input
pub const REC_MAX_WIDTH: u32 = 320;

/// Mean values for normalization (ImageNet)
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Std values for normalization (ImageNet)
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Everything the adaptive chain produced for one image
#[derive(Debug, Clone)]
pub struct PreprocessedImage {
    /// `[1, 3, H, W]`, values in `[0, 1]`
    pub tensor: Array4<f32>,
    /// The same pixels in displayable form
    pub image: RgbImage,
    /// `(height, width)` after resizing
    pub resized: (u32, u32),
    pub metrics: ImageMetrics,
    pub lighting: LightingClass,
    pub characteristics: Characteristics,
    pub strategy: FilterStrategy,
}

/// Analyzes, classifies and normalizes document photographs
///
/// Stateless; a fresh strategy is resolved for every image.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptivePreprocessor;

impl AdaptivePreprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Run the full adaptive chain on one image
    pub fn preprocess(&self, image: &DynamicImage, target_short_side: u32) -> PreprocessedImage {
        let gray = image.to_luma8();
        let metrics = analyze_gray(&gray);
        let (lighting, characteristics) = classify(&metrics);
        let strategy = adapt(lighting, characteristics);

        debug!(
            "Image {}x{}: brightness={:.1}, contrast={:.1}, sharpness={:.1} -> {} {:?}",
            metrics.width,
            metrics.height,
            metrics.mean,
            metrics.contrast,
            metrics.sharpness,
            lighting,
            characteristics
        );

        let (new_h, new_w) = resized_dimensions(metrics.height, metrics.width, target_short_side);
        let resized = image::imageops::resize(&gray, new_w, new_h, FilterType::Triangle);

        let enhanced = apply_strategy(&resized, &metrics, lighting, &strategy);
        let display = DynamicImage::ImageLuma8(enhanced).to_rgb8();
        let tensor = rgb_to_unit_tensor(&display);

        PreprocessedImage {
            tensor,
            image: display,
            resized: (new_h, new_w),
            metrics,
            lighting,
            characteristics,
            strategy,
        }
    }
}

/// Steps 2-7 of the chain on an already resized grayscale image
pub fn apply_strategy(
    resized: &GrayImage,
    metrics: &ImageMetrics,
    lighting: LightingClass,
    strategy: &FilterStrategy,
) -> GrayImage {
    let (low, high) = lighting.normalization_range();
    let mut gray = filters::normalize_min_max(resized, low, high);

    gray = filters::clahe(&gray, strategy.clip_limit, strategy.tile_grid);

    gray = filters::bilateral(
        &gray,
        strategy.bilateral_diameter,
        strategy.sigma_color,
        strategy.sigma_space,
    );

    if lighting.is_dark() {
        gray = filters::close_strokes(&gray);
    }

    gray = filters::nl_means(
        &gray,
        strategy.denoise_h,
        strategy.template_window,
        strategy.search_window,
    );

    if metrics.sharpness > SHARPEN_FLOOR {
        gray = filters::unsharp(&gray);
    }

    gray
}

/// `(height, width)` with the short side scaled to `target_short_side` and
/// both sides rounded up to [`SIZE_MULTIPLE`]
pub fn resized_dimensions(height: u32, width: u32, target_short_side: u32) -> (u32, u32) {
    let short = height.min(width).max(1) as f64;
    let scale = target_short_side as f64 / short;

    let new_h = ((height as f64 * scale + 0.5) as u32).max(1);
    let new_w = ((width as f64 * scale + 0.5) as u32).max(1);

    (
        new_h.div_ceil(SIZE_MULTIPLE) * SIZE_MULTIPLE,
        new_w.div_ceil(SIZE_MULTIPLE) * SIZE_MULTIPLE,
    )
}

/// NCHW tensor `[1, 3, H, W]` with values scaled to `[0, 1]`
pub fn rgb_to_unit_tensor(rgb: &RgbImage) -> Array4<f32> {
    let (width, height) = rgb.dimensions();
    let mut tensor = Array4::zeros((1, 3, height as usize, width as usize));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }

    tensor
}

/// Preprocess a cropped text region for recognition
///
/// Resizes to height [`REC_INPUT_HEIGHT`] with dynamic width (aspect ratio
/// preserved, capped at [`REC_MAX_WIDTH`]) and normalizes with ImageNet
/// mean/std into `[1, 3, 48, W]`.
pub fn preprocess_for_recognition(image: &DynamicImage) -> Array4<f32> {
    let (orig_w, orig_h) = image.dimensions();

    let scale = REC_INPUT_HEIGHT as f32 / orig_h.max(1) as f32;
    let new_width = ((orig_w as f32 * scale).round() as u32)
        .min(REC_MAX_WIDTH)
        .max(4);

    let resized = image.resize_exact(new_width, REC_INPUT_HEIGHT, FilterType::Lanczos3);
    let rgb = resized.to_rgb8();

    let mut tensor = Array4::zeros((1, 3, REC_INPUT_HEIGHT as usize, new_width as usize));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 / 255.0 - MEAN[c]) / STD[c];
        }
    }

    tensor
}
