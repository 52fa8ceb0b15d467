// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Scalar quality metrics for an input photograph

use image::{DynamicImage, GrayImage};
use imageproc::filter::laplacian_filter;
use serde::Serialize;

/// Brightness, contrast and sharpness of one decoded image
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImageMetrics {
    /// Mean grayscale brightness (0-255)
    pub mean: f64,
    /// Population standard deviation of grayscale brightness
    pub std_dev: f64,
    /// 5th percentile brightness
    pub p5: f64,
    /// 95th percentile brightness
    pub p95: f64,
    /// `p95 - p5`
    pub contrast: f64,
    /// Variance of the Laplacian response, a sharpness proxy
    pub sharpness: f64,
    pub width: u32,
    pub height: u32,
}

/// Compute [`ImageMetrics`] for a decoded image
///
/// The image must be at least 1x1; callers validate this at decode time.
pub fn analyze(image: &DynamicImage) -> ImageMetrics {
    analyze_gray(&image.to_luma8())
}

/// Same as [`analyze`] for an image that is already grayscale
pub fn analyze_gray(gray: &GrayImage) -> ImageMetrics {
    let (width, height) = gray.dimensions();
    let count = (width as u64 * height as u64).max(1);

    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let mean = histogram
        .iter()
        .enumerate()
        .map(|(v, &n)| v as f64 * n as f64)
        .sum::<f64>()
        / count as f64;
    let variance = histogram
        .iter()
        .enumerate()
        .map(|(v, &n)| (v as f64 - mean).powi(2) * n as f64)
        .sum::<f64>()
        / count as f64;

    let p5 = percentile(&histogram, count, 5.0);
    let p95 = percentile(&histogram, count, 95.0);

    ImageMetrics {
        mean,
        std_dev: variance.sqrt(),
        p5,
        p95,
        contrast: p95 - p5,
        sharpness: laplacian_variance(gray),
        width,
        height,
    }
}

/// Percentile with linear interpolation between neighbouring ranks
fn percentile(histogram: &[u64; 256], count: u64, p: f64) -> f64 {
    let rank = p / 100.0 * (count - 1) as f64;
    let lower = rank.floor() as u64;
    let upper = rank.ceil() as u64;
    let frac = rank - lower as f64;

    let lo = value_at_rank(histogram, lower) as f64;
    let hi = value_at_rank(histogram, upper) as f64;
    lo + (hi - lo) * frac
}

/// Value of the element at a 0-based rank in sorted order
fn value_at_rank(histogram: &[u64; 256], rank: u64) -> u8 {
    let mut seen = 0u64;
    for (value, &n) in histogram.iter().enumerate() {
        seen += n;
        if seen > rank {
            return value as u8;
        }
    }
    255
}

fn laplacian_variance(gray: &GrayImage) -> f64 {
    let response = laplacian_filter(gray);
    let n = (response.width() as u64 * response.height() as u64).max(1) as f64;

    let mean = response.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
    response
        .pixels()
        .map(|p| (p[0] as f64 - mean).powi(2))
        .sum::<f64>()
        / n
}
