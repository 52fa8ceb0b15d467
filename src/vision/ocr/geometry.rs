// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Text-region geometry and detector box normalization
//!
//! Detectors emit polygons in original-image space. Everything downstream
//! works on [`Rectangle`], an axis-aligned box whose coordinates are clamped
//! to the image and which always has positive width and height.

use serde::{Deserialize, Serialize};

/// A 2-D point as emitted by a detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Ordered outline of a detected text region
pub type Polygon = Vec<Point>;

/// Axis-aligned box in original-image pixel coordinates
///
/// Invariant: `x2 > x1` and `y2 > y1`. Construct through [`Rectangle::new`]
/// or [`normalize_boxes`]; fields are read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "[u32; 4]", try_from = "[u32; 4]")]
pub struct Rectangle {
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
}

impl Rectangle {
    /// Returns `None` when the box would be empty or inverted
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Option<Self> {
        if x2 > x1 && y2 > y1 {
            Some(Self { x1, y1, x2, y2 })
        } else {
            None
        }
    }

    pub fn x1(&self) -> u32 {
        self.x1
    }

    pub fn y1(&self) -> u32 {
        self.y1
    }

    pub fn x2(&self) -> u32 {
        self.x2
    }

    pub fn y2(&self) -> u32 {
        self.y2
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    pub fn center_x(&self) -> f32 {
        (self.x1 + self.x2) as f32 / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.y1 + self.y2) as f32 / 2.0
    }

    /// `[x1, y1, x2, y2]`, the wire representation
    pub fn to_array(&self) -> [u32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

impl From<Rectangle> for [u32; 4] {
    fn from(rect: Rectangle) -> Self {
        rect.to_array()
    }
}

impl TryFrom<[u32; 4]> for Rectangle {
    type Error = String;

    fn try_from(value: [u32; 4]) -> Result<Self, Self::Error> {
        let [x1, y1, x2, y2] = value;
        Rectangle::new(x1, y1, x2, y2)
            .ok_or_else(|| format!("degenerate rectangle {:?}", value))
    }
}

/// Convert raw detector polygons into clamped rectangles
///
/// Each polygon is reduced to the bounding box of its points, every
/// coordinate is truncated to an integer pixel and clamped into
/// `[0, dim - 1]`. Polygons without finite points, or whose box collapses to
/// zero width or height after clamping, are dropped. Output order follows
/// input order but carries no meaning.
pub fn normalize_boxes(polygons: &[Polygon], width: u32, height: u32) -> Vec<Rectangle> {
    if width == 0 || height == 0 {
        return Vec::new();
    }

    polygons
        .iter()
        .filter_map(|polygon| bounding_rectangle(polygon, width, height))
        .collect()
}

fn bounding_rectangle(polygon: &[Point], width: u32, height: u32) -> Option<Rectangle> {
    let mut points = polygon
        .iter()
        .filter(|p| p.x.is_finite() && p.y.is_finite());

    let first = points.next()?;
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }

    let x1 = clamp_coord(min_x, width);
    let x2 = clamp_coord(max_x, width);
    let y1 = clamp_coord(min_y, height);
    let y2 = clamp_coord(max_y, height);

    Rectangle::new(x1, y1, x2, y2)
}

fn clamp_coord(value: f32, dim: u32) -> u32 {
    // `as` truncates toward zero and saturates out-of-range values
    let v = value.trunc() as i64;
    v.clamp(0, dim as i64 - 1) as u32
}
