// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Per-image selection of preprocessing filter parameters
//!
//! Selection is two-staged. [`classify`] buckets the image by mean
//! brightness into a [`LightingClass`] and raises independent
//! [`Characteristics`] flags from contrast and sharpness. [`adapt`] then
//! starts from the class's base [`FilterStrategy`] and applies one
//! adjustment per raised flag, always in the order high contrast, low
//! contrast, blurred, clear. Every adjusted parameter is clamped to its safe
//! range afterwards.

use serde::Serialize;

use super::analyzer::ImageMetrics;

/// Mean-brightness breakpoints separating the lighting classes
pub const BRIGHTNESS_BREAKPOINTS: [f64; 4] = [50.0, 100.0, 150.0, 200.0];

pub const HIGH_CONTRAST_ABOVE: f64 = 100.0;
pub const LOW_CONTRAST_BELOW: f64 = 50.0;
pub const BLURRED_BELOW: f64 = 80.0;
pub const CLEAR_ABOVE: f64 = 1000.0;

/// Safe range for the CLAHE clip limit
pub const CLIP_LIMIT_RANGE: (f32, f32) = (0.5, 8.0);
/// Safe range for both bilateral sigmas
pub const SIGMA_RANGE: (f32, f32) = (5.0, 80.0);

/// Discrete brightness category, ordered darkest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LightingClass {
    VeryDark,
    Dark,
    Normal,
    Bright,
    VeryBright,
}

impl LightingClass {
    /// Bucket a mean brightness; a value equal to a breakpoint selects the
    /// brighter class
    pub fn from_mean(mean: f64) -> Self {
        let [b1, b2, b3, b4] = BRIGHTNESS_BREAKPOINTS;
        if mean < b1 {
            LightingClass::VeryDark
        } else if mean < b2 {
            LightingClass::Dark
        } else if mean < b3 {
            LightingClass::Normal
        } else if mean < b4 {
            LightingClass::Bright
        } else {
            LightingClass::VeryBright
        }
    }

    pub fn is_dark(&self) -> bool {
        matches!(self, LightingClass::VeryDark | LightingClass::Dark)
    }

    pub fn is_bright(&self) -> bool {
        matches!(self, LightingClass::Bright | LightingClass::VeryBright)
    }

    /// Target `(low, high)` range for brightness renormalization
    pub fn normalization_range(&self) -> (u8, u8) {
        if self.is_dark() {
            (40, 220)
        } else if self.is_bright() {
            (50, 230)
        } else {
            (30, 220)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LightingClass::VeryDark => "very_dark",
            LightingClass::Dark => "dark",
            LightingClass::Normal => "normal",
            LightingClass::Bright => "bright",
            LightingClass::VeryBright => "very_bright",
        }
    }
}

impl std::fmt::Display for LightingClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contrast/sharpness flags, orthogonal to the lighting class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Characteristics {
    pub high_contrast: bool,
    pub low_contrast: bool,
    pub blurred: bool,
    pub clear: bool,
}

impl Characteristics {
    pub fn from_metrics(metrics: &ImageMetrics) -> Self {
        Self {
            high_contrast: metrics.contrast > HIGH_CONTRAST_ABOVE,
            low_contrast: metrics.contrast < LOW_CONTRAST_BELOW,
            blurred: metrics.sharpness < BLURRED_BELOW,
            clear: metrics.sharpness > CLEAR_ABOVE,
        }
    }
}

/// Resolved numeric filter parameters for one image
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FilterStrategy {
    /// CLAHE clip limit
    pub clip_limit: f32,
    /// CLAHE tiles per axis
    pub tile_grid: u32,
    /// Bilateral filter neighbourhood diameter
    pub bilateral_diameter: u32,
    pub sigma_color: f32,
    pub sigma_space: f32,
    /// Non-local means filter strength
    pub denoise_h: f32,
    /// Side of the patch compared by non-local means
    pub template_window: u32,
    /// Side of the area searched for similar patches
    pub search_window: u32,
}

impl FilterStrategy {
    /// Base parameters for a lighting class before any adjustment
    pub fn base(class: LightingClass) -> Self {
        let strong_denoise = (10.0, 7, 21);
        let light_denoise = (5.0, 3, 10);

        let (clip_limit, tile_grid, (d, sc, ss), (h, tw, sw)) = match class {
            LightingClass::VeryDark => (8.0, 8, (7, 50.0, 50.0), strong_denoise),
            LightingClass::Dark => (6.0, 8, (7, 40.0, 40.0), strong_denoise),
            LightingClass::Normal => (3.0, 16, (5, 30.0, 30.0), light_denoise),
            LightingClass::Bright => (1.5, 16, (5, 20.0, 20.0), light_denoise),
            LightingClass::VeryBright => (1.0, 16, (3, 15.0, 15.0), light_denoise),
        };

        Self {
            clip_limit,
            tile_grid,
            bilateral_diameter: d,
            sigma_color: sc,
            sigma_space: ss,
            denoise_h: h,
            template_window: tw,
            search_window: sw,
        }
    }

    fn shift_sigmas(&mut self, delta: f32, bound: f32) {
        if delta >= 0.0 {
            self.sigma_color = (self.sigma_color + delta).min(bound);
            self.sigma_space = (self.sigma_space + delta).min(bound);
        } else {
            self.sigma_color = (self.sigma_color + delta).max(bound);
            self.sigma_space = (self.sigma_space + delta).max(bound);
        }
    }

    fn clamp_to_safe_ranges(&mut self) {
        self.clip_limit = self.clip_limit.clamp(CLIP_LIMIT_RANGE.0, CLIP_LIMIT_RANGE.1);
        self.sigma_color = self.sigma_color.clamp(SIGMA_RANGE.0, SIGMA_RANGE.1);
        self.sigma_space = self.sigma_space.clamp(SIGMA_RANGE.0, SIGMA_RANGE.1);
        self.tile_grid = self.tile_grid.max(1);
    }
}

/// Classify an image from its metrics
pub fn classify(metrics: &ImageMetrics) -> (LightingClass, Characteristics) {
    (
        LightingClass::from_mean(metrics.mean),
        Characteristics::from_metrics(metrics),
    )
}

/// Resolve the strategy for a class, adjusted by the raised flags
pub fn adapt(class: LightingClass, characteristics: Characteristics) -> FilterStrategy {
    let mut strategy = FilterStrategy::base(class);

    if characteristics.high_contrast {
        strategy.clip_limit = (strategy.clip_limit * 1.5).min(CLIP_LIMIT_RANGE.1);
        strategy.shift_sigmas(10.0, 70.0);
    }

    if characteristics.low_contrast {
        strategy.clip_limit = (strategy.clip_limit * 2.0).min(CLIP_LIMIT_RANGE.1);
        strategy.tile_grid = 8;
    }

    if characteristics.blurred {
        strategy.clip_limit = (strategy.clip_limit * 0.7).max(CLIP_LIMIT_RANGE.0);
        strategy.shift_sigmas(-10.0, SIGMA_RANGE.0);
    }

    if characteristics.clear {
        strategy.shift_sigmas(20.0, SIGMA_RANGE.1);
    }

    strategy.clamp_to_safe_ranges();
    strategy
}
