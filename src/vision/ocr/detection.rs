// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Text detection capability
//!
//! [`TextDetector`] is the seam the pipeline calls: given the normalized
//! detection tensor and the original image shape, return text polygons in
//! original-image coordinates. [`OnnxTextDetector`] implements it with a
//! DB-style (Differentiable Binarization) probability-map model.

use anyhow::{Context, Result};
use ndarray::{Array4, ArrayView2, Axis};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info};

use super::geometry::{Point, Polygon};
use super::preprocessing::{MEAN, STD};

/// Failures of a detector capability
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Invalid input shape: {0:?}, expected [1, 3, H, W]")]
    InvalidInputShape(Vec<usize>),

    #[error("Unexpected detector output shape: {0:?}")]
    UnexpectedOutputShape(Vec<usize>),

    #[error("Detection inference failed: {0}")]
    Inference(String),

    #[error("Detection session lock poisoned")]
    SessionPoisoned,
}

/// Raw detector output: polygons in original-image space, one score each
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    pub polygons: Vec<Polygon>,
    pub scores: Vec<f32>,
}

impl Detection {
    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }
}

/// Finds text regions in a preprocessed image
///
/// Implementations are shared read-only across concurrent requests.
#[cfg_attr(test, mockall::automock)]
pub trait TextDetector: Send + Sync {
    /// `tensor` is `[1, 3, H, W]` in `[0, 1]`; `original_shape` is
    /// `(height, width)` of the decoded image the polygons must map onto
    fn detect(
        &self,
        tensor: &Array4<f32>,
        original_shape: (u32, u32),
    ) -> Result<Detection, DetectionError>;
}

/// DB post-processing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Probability at or above which a map pixel counts as text
    pub binary_threshold: f32,
    /// Minimum mean probability for a region to be kept
    pub box_threshold: f32,
    /// Box expansion factor; distance = area * ratio / perimeter
    pub unclip_ratio: f32,
    /// Stop after this many regions
    pub max_candidates: usize,
    /// Regions with fewer map pixels are ignored
    pub min_region_pixels: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            binary_threshold: 0.3,
            box_threshold: 0.6,
            unclip_ratio: 1.5,
            max_candidates: 1000,
            min_region_pixels: 10,
        }
    }
}

/// ONNX text detector producing a single-channel probability map
///
/// Runs on CPU. The session is loaded once and reused; `Clone` shares it.
#[derive(Clone)]
pub struct OnnxTextDetector {
    session: Arc<Mutex<Session>>,
    input_name: String,
    config: DetectionConfig,
}

impl std::fmt::Debug for OnnxTextDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxTextDetector")
            .field("input_name", &self.input_name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OnnxTextDetector {
    /// Load the detection model from an ONNX file
    ///
    /// # Errors
    /// Returns error if the file is missing or ONNX Runtime cannot build a
    /// session from it.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        intra_threads: usize,
        config: DetectionConfig,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();

        if !model_path.exists() {
            anyhow::bail!("Text detection model not found: {}", model_path.display());
        }

        info!("Loading text detection model from {}", model_path.display());

        let session = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(intra_threads)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path)
            .context(format!(
                "Failed to load text detection model from {}",
                model_path.display()
            ))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "x".to_string());

        debug!("Detection model loaded - input: {}", input_name);

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            config,
        })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }
}

impl TextDetector for OnnxTextDetector {
    fn detect(
        &self,
        tensor: &Array4<f32>,
        original_shape: (u32, u32),
    ) -> Result<Detection, DetectionError> {
        let shape = tensor.shape();
        if shape[0] != 1 || shape[1] != 3 {
            return Err(DetectionError::InvalidInputShape(shape.to_vec()));
        }

        let input = imagenet_normalize(tensor);
        let input_value =
            Value::from_array(input).map_err(|e| DetectionError::Inference(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectionError::SessionPoisoned)?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_value])
            .map_err(|e| DetectionError::Inference(e.to_string()))?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| DetectionError::Inference(e.to_string()))?;

        let out_shape = output.shape().to_vec();
        let (map_h, map_w) = match out_shape.as_slice() {
            [1, 1, h, w] | [1, h, w] => (*h, *w),
            _ => return Err(DetectionError::UnexpectedOutputShape(out_shape.clone())),
        };
        let map = output
            .to_shape((map_h, map_w))
            .map_err(|_| DetectionError::UnexpectedOutputShape(out_shape))?;

        let detection = extract_regions(map.view(), original_shape, &self.config);
        debug!(
            "Detected {} text regions on a {}x{} map",
            detection.len(),
            map_w,
            map_h
        );

        Ok(detection)
    }
}

/// `(v - mean) / std` per channel on a `[1, 3, H, W]` tensor in `[0, 1]`
fn imagenet_normalize(tensor: &Array4<f32>) -> Array4<f32> {
    let mut input = tensor.to_owned();
    for (c, mut channel) in input.axis_iter_mut(Axis(1)).enumerate() {
        channel.mapv_inplace(|v| (v - MEAN[c]) / STD[c]);
    }
    input
}

/// DB post-processing: binarize, label 4-connected regions, score, unclip
/// and map each box from probability-map space onto the original image
pub fn extract_regions(
    map: ArrayView2<f32>,
    original_shape: (u32, u32),
    config: &DetectionConfig,
) -> Detection {
    let (map_h, map_w) = map.dim();
    let (orig_h, orig_w) = original_shape;
    let mut detection = Detection::default();

    if map_h == 0 || map_w == 0 {
        return detection;
    }

    let scale_x = orig_w as f32 / map_w as f32;
    let scale_y = orig_h as f32 / map_h as f32;
    let mut visited = vec![false; map_h * map_w];

    for y in 0..map_h {
        for x in 0..map_w {
            if visited[y * map_w + x] || map[[y, x]] < config.binary_threshold {
                continue;
            }

            let region = flood_fill(&map, &mut visited, x, y, config.binary_threshold);
            if region.count < config.min_region_pixels {
                continue;
            }

            let score = region.sum / region.count as f32;
            if score < config.box_threshold {
                continue;
            }

            let (x1, y1, x2, y2) = region.unclipped(config.unclip_ratio);
            let x1 = (x1 * scale_x).clamp(0.0, orig_w as f32);
            let x2 = (x2 * scale_x).clamp(0.0, orig_w as f32);
            let y1 = (y1 * scale_y).clamp(0.0, orig_h as f32);
            let y2 = (y2 * scale_y).clamp(0.0, orig_h as f32);

            detection.polygons.push(vec![
                Point::new(x1, y1),
                Point::new(x2, y1),
                Point::new(x2, y2),
                Point::new(x1, y2),
            ]);
            detection.scores.push(score);

            if detection.len() >= config.max_candidates {
                return detection;
            }
        }
    }

    detection
}

/// Bounding box and probability mass of one connected region
#[derive(Debug, Clone, Copy)]
struct Region {
    min_x: usize,
    max_x: usize,
    min_y: usize,
    max_y: usize,
    count: usize,
    sum: f32,
}

impl Region {
    /// Box edges in map coordinates, grown by `area * ratio / perimeter`
    fn unclipped(&self, ratio: f32) -> (f32, f32, f32, f32) {
        let w = (self.max_x - self.min_x + 1) as f32;
        let h = (self.max_y - self.min_y + 1) as f32;
        let distance = w * h * ratio / (2.0 * (w + h));

        (
            self.min_x as f32 - distance,
            self.min_y as f32 - distance,
            (self.max_x + 1) as f32 + distance,
            (self.max_y + 1) as f32 + distance,
        )
    }
}

/// Flood fill the 4-connected region containing `(start_x, start_y)`
fn flood_fill(
    map: &ArrayView2<f32>,
    visited: &mut [bool],
    start_x: usize,
    start_y: usize,
    threshold: f32,
) -> Region {
    let (height, width) = map.dim();
    let mut stack = vec![(start_x, start_y)];
    let mut region = Region {
        min_x: start_x,
        max_x: start_x,
        min_y: start_y,
        max_y: start_y,
        count: 0,
        sum: 0.0,
    };

    while let Some((x, y)) = stack.pop() {
        let idx = y * width + x;
        if visited[idx] {
            continue;
        }

        let prob = map[[y, x]];
        if prob < threshold {
            continue;
        }

        visited[idx] = true;
        region.count += 1;
        region.sum += prob;
        region.min_x = region.min_x.min(x);
        region.max_x = region.max_x.max(x);
        region.min_y = region.min_y.min(y);
        region.max_y = region.max_y.max(y);

        if x > 0 {
            stack.push((x - 1, y));
        }
        if x + 1 < width {
            stack.push((x + 1, y));
        }
        if y > 0 {
            stack.push((x, y - 1));
        }
        if y + 1 < height {
            stack.push((x, y + 1));
        }
    }

    region
}
