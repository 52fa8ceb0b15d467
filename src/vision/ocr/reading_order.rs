// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Reading-order reconstruction
//!
//! Turns an unordered set of text rectangles into a linear reading sequence:
//! rectangles are clustered into lines by vertical center, over-split lines
//! are merged, lines are clustered into columns by a 1-D gap heuristic over
//! their horizontal centers, and the result is flattened column by column.
//!
//! The gap heuristic assumes columns are separated by whitespace wider than
//! the horizontal jitter of lines inside a column. A single ragged column
//! with wide natural variance can be split into false columns; this is a
//! known limitation of the heuristic and is left as is.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::geometry::Rectangle;

/// Tuning constants for [`reconstruct`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadingOrderConfig {
    /// Rectangles narrower or shorter than this (pixels) are dropped as noise
    pub min_box_size: u32,
    /// Line join tolerance as a fraction of the median box height
    pub grouping_factor: f32,
    /// Line merge tolerance; must be tighter than `grouping_factor`
    pub merge_factor: f32,
    /// A gap larger than `median_gap * gap_factor` starts a new column
    pub gap_factor: f32,
    /// Below this many lines the page is a single column
    pub min_lines_for_columns: usize,
}

impl Default for ReadingOrderConfig {
    fn default() -> Self {
        Self {
            min_box_size: 2,
            grouping_factor: 0.6,
            merge_factor: 0.45,
            gap_factor: 1.6,
            min_lines_for_columns: 4,
        }
    }
}

/// Rectangles judged to sit on one physical text line
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    rects: Vec<Rectangle>,
}

impl Line {
    fn new(first: Rectangle) -> Self {
        Self { rects: vec![first] }
    }

    pub fn rectangles(&self) -> &[Rectangle] {
        &self.rects
    }

    pub fn into_rectangles(self) -> Vec<Rectangle> {
        self.rects
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Mean vertical center of the member rectangles
    pub fn center_y(&self) -> f32 {
        mean(self.rects.iter().map(Rectangle::center_y))
    }

    /// Mean horizontal center of the member rectangles
    pub fn center_x(&self) -> f32 {
        mean(self.rects.iter().map(Rectangle::center_x))
    }

    fn sort_left_to_right(&mut self) {
        self.rects.sort_by_key(|r| (r.x1(), r.y1()));
    }
}

/// Lines judged to belong to one layout column, top to bottom
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    lines: Vec<Line>,
}

impl Column {
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<Line> {
        self.lines
    }

    pub fn center_x(&self) -> f32 {
        mean(self.lines.iter().map(Line::center_x))
    }
}

/// Order rectangles for reading
///
/// Returns lines column by column (left to right), top to bottom within a
/// column, each line holding its rectangles left to right. Empty input gives
/// empty output. The result depends only on the rectangle values, not on
/// their input order.
pub fn reconstruct(rects: &[Rectangle], config: &ReadingOrderConfig) -> Vec<Line> {
    let kept: Vec<Rectangle> = rects
        .iter()
        .copied()
        .filter(|r| r.width() >= config.min_box_size && r.height() >= config.min_box_size)
        .collect();

    if kept.is_empty() {
        return Vec::new();
    }

    let median_h = median_height(&kept);
    let lines = group_lines(kept, median_h, config);
    let lines = merge_lines(lines, median_h, config);
    let columns = group_columns(lines, config);

    debug!(
        "Reading order: {} rects -> {} columns, median height {:.1}",
        rects.len(),
        columns.len(),
        median_h
    );

    columns.into_iter().flat_map(Column::into_lines).collect()
}

/// Median rectangle height; the mean of the two middle values for even counts
pub fn median_height(rects: &[Rectangle]) -> f32 {
    let mut heights: Vec<u32> = rects.iter().map(Rectangle::height).collect();
    heights.sort_unstable();
    median_of_sorted(&heights.iter().map(|&h| h as f32).collect::<Vec<_>>())
}

/// Greedy single-pass clustering by vertical center
///
/// Rectangles are visited by ascending `(center_y, x1)`; each joins the
/// nearest line whose running mean center lies within
/// `median_height * grouping_factor`, or starts a new line.
fn group_lines(mut rects: Vec<Rectangle>, median_h: f32, config: &ReadingOrderConfig) -> Vec<Line> {
    rects.sort_by(|a, b| {
        a.center_y()
            .total_cmp(&b.center_y())
            .then(a.x1().cmp(&b.x1()))
            .then_with(|| a.to_array().cmp(&b.to_array()))
    });

    let tolerance = median_h * config.grouping_factor;
    let mut lines: Vec<Line> = Vec::new();
    // (sum of centers, count) per line, kept alongside to avoid recomputation
    let mut sums: Vec<(f32, usize)> = Vec::new();

    for rect in rects {
        let cy = rect.center_y();
        let nearest = sums
            .iter()
            .enumerate()
            .map(|(i, &(sum, n))| (i, (cy - sum / n as f32).abs()))
            .filter(|&(_, d)| d <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match nearest {
            Some((i, _)) => {
                lines[i].rects.push(rect);
                sums[i].0 += cy;
                sums[i].1 += 1;
            }
            None => {
                lines.push(Line::new(rect));
                sums.push((cy, 1));
            }
        }
    }

    lines
}

/// Merge adjacent lines whose mean centers differ by less than
/// `median_height * merge_factor`
///
/// Lines are visited top to bottom and each is compared with the line
/// accumulated so far above it, whose mean is updated after every merge.
fn merge_lines(mut lines: Vec<Line>, median_h: f32, config: &ReadingOrderConfig) -> Vec<Line> {
    lines.sort_by(compare_lines_vertically);

    let tolerance = median_h * config.merge_factor;
    let mut merged: Vec<Line> = Vec::with_capacity(lines.len());

    for line in lines {
        match merged.last_mut() {
            Some(prev) if (line.center_y() - prev.center_y()).abs() < tolerance => {
                prev.rects.extend(line.rects);
            }
            _ => merged.push(line),
        }
    }

    merged
}

/// Split lines into columns and order everything for reading
///
/// With fewer than `min_lines_for_columns` lines the page is one column.
/// Otherwise the sorted horizontal line centers are cut wherever the gap to
/// the next center exceeds `median_gap * gap_factor`.
pub fn group_columns(lines: Vec<Line>, config: &ReadingOrderConfig) -> Vec<Column> {
    if lines.is_empty() {
        return Vec::new();
    }

    let mut lines = lines;
    lines.sort_by(|a, b| {
        a.center_x()
            .total_cmp(&b.center_x())
            .then_with(|| compare_lines_vertically(a, b))
    });

    let mut columns: Vec<Column> = Vec::new();

    if lines.len() < config.min_lines_for_columns {
        columns.push(Column { lines });
    } else {
        let centers: Vec<f32> = lines.iter().map(Line::center_x).collect();
        let mut gaps: Vec<f32> = centers.windows(2).map(|w| w[1] - w[0]).collect();
        let threshold = {
            gaps.sort_by(f32::total_cmp);
            median_of_sorted(&gaps) * config.gap_factor
        };

        let mut current: Vec<Line> = Vec::new();
        let mut previous_center: Option<f32> = None;
        for (line, center) in lines.into_iter().zip(centers) {
            if let Some(prev) = previous_center {
                if center - prev > threshold {
                    columns.push(Column {
                        lines: std::mem::take(&mut current),
                    });
                }
            }
            previous_center = Some(center);
            current.push(line);
        }
        columns.push(Column { lines: current });
    }

    for column in &mut columns {
        column.lines.sort_by(compare_lines_vertically);
        for line in &mut column.lines {
            line.sort_left_to_right();
        }
    }
    columns.sort_by(|a, b| a.center_x().total_cmp(&b.center_x()));

    columns
}

fn compare_lines_vertically(a: &Line, b: &Line) -> Ordering {
    a.center_y()
        .total_cmp(&b.center_y())
        .then_with(|| a.center_x().total_cmp(&b.center_x()))
}

fn median_of_sorted(values: &[f32]) -> f32 {
    match values.len() {
        0 => 0.0,
        n if n % 2 == 1 => values[n / 2],
        n => (values[n / 2 - 1] + values[n / 2]) / 2.0,
    }
}

fn mean(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, n) = values.fold((0.0f32, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f32
    }
}
