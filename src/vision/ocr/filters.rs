// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Grayscale transforms used by the adaptive preprocessor
//!
//! All functions are pure: they take a borrowed image and return a new one
//! of the same dimensions. Borders are handled by replicating edge pixels.

use image::{GrayImage, Luma};
use imageproc::contrast::stretch_contrast;
use imageproc::filter::{bilateral_filter, filter3x3};
use imageproc::morphology::{grayscale_close, Mask};

/// Normalized 3x3 Gaussian, `[1,2,1] x [1,2,1] / 16`
#[rustfmt::skip]
const GAUSSIAN_3X3: [f32; 9] = [
    1.0 / 16.0, 2.0 / 16.0, 1.0 / 16.0,
    2.0 / 16.0, 4.0 / 16.0, 2.0 / 16.0,
    1.0 / 16.0, 2.0 / 16.0, 1.0 / 16.0,
];

#[inline]
fn clamp_index(v: i64, len: u32) -> u32 {
    v.clamp(0, len as i64 - 1) as u32
}

#[inline]
fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Linearly stretch the image's own min/max onto `[low, high]`
///
/// A flat image has no range to stretch and maps entirely to `low`.
pub fn normalize_min_max(image: &GrayImage, low: u8, high: u8) -> GrayImage {
    let (min, max) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));

    if image.width() == 0 || image.height() == 0 || max <= min {
        return GrayImage::from_pixel(image.width(), image.height(), Luma([low]));
    }

    stretch_contrast(image, min, max, low.min(high), high.max(low))
}

/// Contrast Limited Adaptive Histogram Equalization
///
/// The image is split into `tile_grid x tile_grid` tiles. Each tile gets a
/// clipped, redistributed histogram turned into a lookup table; pixels are
/// mapped by bilinear interpolation between the four nearest tile centres.
pub fn clahe(image: &GrayImage, clip_limit: f32, tile_grid: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let grid = tile_grid.max(1);
    let tile_w = width.div_ceil(grid).max(1);
    let tile_h = height.div_ceil(grid).max(1);
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            luts.push(tile_lut(image, x0, y0, x1, y1, clip_limit));
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];
    let inv_tw = 1.0 / tile_w as f32;
    let inv_th = 1.0 / tile_h as f32;

    GrayImage::from_fn(width, height, |x, y| {
        let v = image.get_pixel(x, y)[0] as usize;

        let txf = x as f32 * inv_tw - 0.5;
        let tyf = y as f32 * inv_th - 0.5;
        let tx1 = txf.floor();
        let ty1 = tyf.floor();
        let xa = txf - tx1;
        let ya = tyf - ty1;

        let tx1i = clamp_index(tx1 as i64, tiles_x);
        let tx2i = clamp_index(tx1 as i64 + 1, tiles_x);
        let ty1i = clamp_index(ty1 as i64, tiles_y);
        let ty2i = clamp_index(ty1 as i64 + 1, tiles_y);

        let top = lut_at(tx1i, ty1i)[v] as f32 * (1.0 - xa) + lut_at(tx2i, ty1i)[v] as f32 * xa;
        let bottom =
            lut_at(tx1i, ty2i)[v] as f32 * (1.0 - xa) + lut_at(tx2i, ty2i)[v] as f32 * xa;

        Luma([to_u8(top * (1.0 - ya) + bottom * ya)])
    })
}

fn tile_lut(image: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
    let mut histogram = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            histogram[image.get_pixel(x, y)[0] as usize] += 1;
        }
    }

    let area = (x1 - x0) * (y1 - y0);
    let mut lut = [0u8; 256];
    if area == 0 {
        return lut;
    }

    if clip_limit > 0.0 {
        let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for h in histogram.iter_mut() {
            if *h > limit {
                excess += *h - limit;
                *h = limit;
            }
        }

        let batch = excess / 256;
        let residual = (excess % 256) as usize;
        for h in histogram.iter_mut() {
            *h += batch;
        }
        if residual > 0 {
            let step = (256 / residual).max(1);
            for h in histogram.iter_mut().step_by(step).take(residual) {
                *h += 1;
            }
        }
    }

    let scale = 255.0 / area as f32;
    let mut cumulative = 0u32;
    for (v, slot) in lut.iter_mut().enumerate() {
        cumulative += histogram[v];
        *slot = to_u8(cumulative as f32 * scale);
    }
    lut
}

/// Edge-preserving bilateral smoothing
///
/// `diameter` is the side of the square window; `sigma_color` weights
/// intensity differences and `sigma_space` weights spatial distance.
pub fn bilateral(image: &GrayImage, diameter: u32, sigma_color: f32, sigma_space: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    // an all-black image has no intensity range to weight against
    let peak = image.pixels().map(|p| p[0]).max().unwrap_or(0);
    if diameter <= 1 || width == 0 || height == 0 || peak == 0 {
        return image.clone();
    }

    bilateral_filter(
        image,
        diameter,
        sigma_color.max(f32::EPSILON),
        sigma_space.max(f32::EPSILON),
    )
}

/// Grayscale morphological closing with a 3x3 cross element, one iteration
///
/// Dilation takes the neighbourhood maximum and erosion the minimum, so
/// dark gaps narrower than the cross are filled with the surrounding tone.
pub fn close_strokes(image: &GrayImage) -> GrayImage {
    if image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    grayscale_close(image, &Mask::diamond(1))
}

/// Non-local means denoising
///
/// Each pixel becomes a weighted mean of the pixels in its
/// `search_window` neighbourhood, weighted by how similar their
/// `template_window` patches are: `exp(-mean_sq_diff / h^2)`. Patch
/// distances are evaluated per displacement with an integral image, so cost
/// is proportional to `pixels * search_window^2`.
pub fn nl_means(image: &GrayImage, h: f32, template_window: u32, search_window: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    if h <= 0.0 || width == 0 || height == 0 {
        return image.clone();
    }

    let w = width as usize;
    let hgt = height as usize;
    let template_r = (template_window / 2) as i64;
    let search_r = (search_window / 2) as i64;
    let inv_h2 = 1.0 / (h as f64 * h as f64);

    let src: Vec<i32> = image.pixels().map(|p| p[0] as i32).collect();
    let at = |x: i64, y: i64| src[clamp_index(y, height) as usize * w + clamp_index(x, width) as usize];

    let mut weight_sum = vec![0.0f64; w * hgt];
    let mut value_sum = vec![0.0f64; w * hgt];
    let mut integral = vec![0u64; (w + 1) * (hgt + 1)];

    for dy in -search_r..=search_r {
        for dx in -search_r..=search_r {
            // integral of squared differences between the image and its shift
            for y in 0..hgt {
                let mut row = 0u64;
                for x in 0..w {
                    let d = src[y * w + x] - at(x as i64 + dx, y as i64 + dy);
                    row += (d * d) as u64;
                    integral[(y + 1) * (w + 1) + x + 1] = integral[y * (w + 1) + x + 1] + row;
                }
            }

            for y in 0..hgt {
                let ya = (y as i64 - template_r).max(0) as usize;
                let yb = ((y as i64 + template_r) as usize).min(hgt - 1) + 1;
                for x in 0..w {
                    let xa = (x as i64 - template_r).max(0) as usize;
                    let xb = ((x as i64 + template_r) as usize).min(w - 1) + 1;

                    let ssd = integral[yb * (w + 1) + xb] + integral[ya * (w + 1) + xa]
                        - integral[ya * (w + 1) + xb]
                        - integral[yb * (w + 1) + xa];
                    let area = ((yb - ya) * (xb - xa)) as f64;
                    let weight = (-(ssd as f64 / area) * inv_h2).exp();

                    let idx = y * w + x;
                    weight_sum[idx] += weight;
                    value_sum[idx] += weight * at(x as i64 + dx, y as i64 + dy) as f64;
                }
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let idx = y as usize * w + x as usize;
        Luma([to_u8((value_sum[idx] / weight_sum[idx]) as f32)])
    })
}

/// Unsharp mask: `1.2 * image - 0.2 * gaussian_3x3(image)`
pub fn unsharp(image: &GrayImage) -> GrayImage {
    let blurred: GrayImage = filter3x3::<_, f32, u8>(image, &GAUSSIAN_3X3);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let v = image.get_pixel(x, y)[0] as f32;
        let b = blurred.get_pixel(x, y)[0] as f32;
        Luma([to_u8(1.2 * v - 0.2 * b)])
    })
}
