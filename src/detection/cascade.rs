//! Haar-feature cascade classifier
//!
//! The model matches OpenCV's boosted Haar cascades: a base window, a table
//! of rectangle features and a list of stages. Each stage sums the leaf
//! values of its weak classifiers (decision stumps or small trees over
//! feature values) and rejects the window when the sum falls below the stage
//! threshold.
//!
//! Scanning follows `CascadeClassifier::detectMultiScale`: the image is
//! shrunk by successive scale factors and the base window slides over every
//! level. Feature sums are divided by the window's standard deviation over
//! the window inset by one pixel, so thresholds trained by OpenCV apply
//! unchanged.
//!
//! Cascades load from OpenCV XML files or from the serde JSON form of
//! [`HaarCascade`].

use super::xml;
use crate::error::{RetouchError, Result};
use crate::types::Region;
use image::{imageops, GrayImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Overlap tolerance used when merging raw detections
const GROUP_EPS: f64 = 0.2;

/// Weighted rectangle of a Haar feature, in window coordinates
///
/// For tilted features `(x, y)` is the top corner of a rectangle rotated by
/// 45 degrees, `width` runs down-right and `height` down-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HaarRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaarFeature {
    pub rects: Vec<HaarRect>,
    #[serde(default)]
    pub tilted: bool,
}

/// Split node of a weak classifier
///
/// Children greater than zero index another node; zero or negative children
/// are leaves at index `-child`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub feature: usize,
    pub threshold: f32,
    pub left: i32,
    pub right: i32,
}

/// Boosted decision tree; a stump is one node with two leaves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeakClassifier {
    pub nodes: Vec<TreeNode>,
    pub leaves: Vec<f32>,
}

impl WeakClassifier {
    /// Walk the tree with `value` giving the normalized value of a feature
    pub fn evaluate(&self, mut value: impl FnMut(usize) -> f64) -> f32 {
        let mut idx = 0usize;
        for _ in 0..self.nodes.len() {
            let Some(node) = self.nodes.get(idx) else {
                break;
            };
            let next = if value(node.feature) < f64::from(node.threshold) {
                node.left
            } else {
                node.right
            };
            if next <= 0 {
                return self.leaves.get(next.unsigned_abs() as usize).copied().unwrap_or(0.0);
            }
            idx = next as usize;
        }
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub threshold: f32,
    pub classifiers: Vec<WeakClassifier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaarCascade {
    pub window_width: u32,
    pub window_height: u32,
    pub stages: Vec<Stage>,
    pub features: Vec<HaarFeature>,
}

/// Parameters of one multi-scale scan
#[derive(Debug, Clone, Copy)]
pub struct ScanParams {
    pub scale_factor: f32,
    pub min_neighbors: usize,
    /// Smallest window side, in source pixels
    pub min_size: u32,
}

impl HaarCascade {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cascade: Self = serde_json::from_str(json)
            .map_err(|e| RetouchError::invalid_config(format!("Invalid cascade JSON: {}", e)))?;
        cascade.validate()?;
        Ok(cascade)
    }

    /// Parse an OpenCV `FileStorage` XML cascade
    pub fn from_xml_str(text: &str) -> Result<Self> {
        let cascade = xml::parse_cascade(text)?;
        cascade.validate()?;
        Ok(cascade)
    }

    /// Load a cascade file, XML or JSON depending on its first character
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RetouchError::file_io_error("read cascade file", path, &e))?;
        if text.trim_start().starts_with('<') {
            Self::from_xml_str(&text)
        } else {
            Self::from_json_str(&text)
        }
    }

    fn validate(&self) -> Result<()> {
        let (ww, wh) = (self.window_width, self.window_height);
        if ww < 3 || wh < 3 {
            return Err(RetouchError::invalid_config(format!(
                "Cascade window {ww}x{wh} is too small"
            )));
        }
        if self.stages.is_empty() {
            return Err(RetouchError::invalid_config("Cascade has no stages"));
        }

        for (i, feature) in self.features.iter().enumerate() {
            if feature.rects.is_empty() {
                return Err(RetouchError::invalid_config(format!("Cascade feature {i} has no rectangles")));
            }
            for r in &feature.rects {
                let inside = if feature.tilted {
                    r.x >= r.height && r.x + r.width <= ww && r.y + r.width + r.height <= wh
                } else {
                    r.x + r.width <= ww && r.y + r.height <= wh
                };
                if !inside {
                    return Err(RetouchError::invalid_config(format!(
                        "Cascade feature {i} rectangle {}x{}+{}+{} exceeds the {ww}x{wh} window",
                        r.width, r.height, r.x, r.y
                    )));
                }
            }
        }

        for (s, stage) in self.stages.iter().enumerate() {
            for weak in &stage.classifiers {
                if weak.nodes.is_empty() {
                    return Err(RetouchError::invalid_config(format!("Stage {s} has an empty weak classifier")));
                }
                for (n, node) in weak.nodes.iter().enumerate() {
                    if node.feature >= self.features.len() {
                        return Err(RetouchError::invalid_config(format!(
                            "Stage {s} references feature {} of {}",
                            node.feature,
                            self.features.len()
                        )));
                    }
                    for child in [node.left, node.right] {
                        let valid = if child > 0 {
                            (child as usize) > n && (child as usize) < weak.nodes.len()
                        } else {
                            (child.unsigned_abs() as usize) < weak.leaves.len()
                        };
                        if !valid {
                            return Err(RetouchError::invalid_config(format!(
                                "Stage {s} has a tree node with invalid child {child}"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn has_tilted_features(&self) -> bool {
        self.features.iter().any(|f| f.tilted)
    }

    /// Scan `gray` at every scale and return grouped detections
    #[must_use]
    pub fn detect(&self, gray: &GrayImage, params: ScanParams) -> Vec<Region> {
        let (w, h) = gray.dimensions();
        let scale_factor = f64::from(params.scale_factor.max(1.01));
        let tilted = self.has_tilted_features();

        let mut candidates = Vec::new();
        let mut factor = 1.0f64;
        loop {
            let scaled_w = (f64::from(w) / factor).round() as u32;
            let scaled_h = (f64::from(h) / factor).round() as u32;
            if scaled_w < self.window_width || scaled_h < self.window_height {
                break;
            }
            let win_w = (f64::from(self.window_width) * factor).round() as u32;
            let win_h = (f64::from(self.window_height) * factor).round() as u32;

            if win_w.min(win_h) >= params.min_size {
                let resized;
                let level = if (scaled_w, scaled_h) == (w, h) {
                    gray
                } else {
                    resized = imageops::resize(gray, scaled_w, scaled_h, imageops::FilterType::Triangle);
                    &resized
                };
                let integral = IntegralImages::new(level, tilted);
                let step = if factor > 2.0 { 1 } else { 2 };

                for y in (0..=scaled_h - self.window_height).step_by(step) {
                    for x in (0..=scaled_w - self.window_width).step_by(step) {
                        if !self.accepts(&integral, x, y) {
                            continue;
                        }
                        let hit = Region::clipped(
                            (f64::from(x) * factor).round() as i64,
                            (f64::from(y) * factor).round() as i64,
                            i64::from(win_w),
                            i64::from(win_h),
                            (w, h),
                        );
                        candidates.extend(hit);
                    }
                }
            }
            factor *= scale_factor;
        }

        group_rectangles(&candidates, params.min_neighbors, GROUP_EPS)
    }

    /// Run every stage on the window whose top-left corner is `(x, y)`
    fn accepts(&self, ii: &IntegralImages, x: u32, y: u32) -> bool {
        let norm = self.variance_norm(ii, x, y);
        for stage in &self.stages {
            let mut sum = 0.0f64;
            for weak in &stage.classifiers {
                sum += f64::from(weak.evaluate(|feature| self.feature_sum(ii, feature, x, y) / norm));
            }
            if sum < f64::from(stage.threshold) {
                return false;
            }
        }
        true
    }

    /// `area * stddev` over the window inset by one pixel, 1 for flat windows
    fn variance_norm(&self, ii: &IntegralImages, x: u32, y: u32) -> f64 {
        let (nw, nh) = (self.window_width - 2, self.window_height - 2);
        let area = f64::from(nw) * f64::from(nh);
        let sum = ii.sum(x + 1, y + 1, nw, nh);
        let sq_sum = ii.sq_sum(x + 1, y + 1, nw, nh);
        let nf = area * sq_sum - sum * sum;
        if nf > 0.0 {
            nf.sqrt()
        } else {
            1.0
        }
    }

    fn feature_sum(&self, ii: &IntegralImages, feature: usize, x: u32, y: u32) -> f64 {
        let Some(feature) = self.features.get(feature) else {
            return 0.0;
        };
        feature
            .rects
            .iter()
            .map(|r| {
                let sum = if feature.tilted {
                    ii.tilted_sum(x + r.x, y + r.y, r.width, r.height)
                } else {
                    ii.sum(x + r.x, y + r.y, r.width, r.height)
                };
                f64::from(r.weight) * sum
            })
            .sum()
    }
}

/// Summed-area tables of intensity and squared intensity, plus the
/// 45-degree table when tilted features are in use
struct IntegralImages {
    stride: usize,
    sum: Vec<f64>,
    sq_sum: Vec<f64>,
    tilted: Option<TiltedTable>,
}

impl IntegralImages {
    fn new(gray: &GrayImage, with_tilted: bool) -> Self {
        let (w, h) = gray.dimensions();
        let stride = w as usize + 1;
        let mut sum = vec![0.0f64; stride * (h as usize + 1)];
        let mut sq_sum = vec![0.0f64; stride * (h as usize + 1)];
        for y in 0..h as usize {
            let mut row = 0.0f64;
            let mut row_sq = 0.0f64;
            for x in 0..w as usize {
                let v = f64::from(gray.get_pixel(x as u32, y as u32).0[0]);
                row += v;
                row_sq += v * v;
                let i = (y + 1) * stride + x + 1;
                sum[i] = sum[i - stride] + row;
                sq_sum[i] = sq_sum[i - stride] + row_sq;
            }
        }
        Self {
            stride,
            sum,
            sq_sum,
            tilted: with_tilted.then(|| TiltedTable::new(gray)),
        }
    }

    #[inline]
    fn rect(table: &[f64], stride: usize, x: u32, y: u32, w: u32, h: u32) -> f64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        table[y1 * stride + x1] - table[y0 * stride + x1] - table[y1 * stride + x0] + table[y0 * stride + x0]
    }

    fn sum(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        Self::rect(&self.sum, self.stride, x, y, w, h)
    }

    fn sq_sum(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        Self::rect(&self.sq_sum, self.stride, x, y, w, h)
    }

    fn tilted_sum(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        self.tilted.as_ref().map_or(0.0, |t| t.rect(x, y, w, h))
    }
}

/// Rotated summed-area table
///
/// `T(X, Y)` holds the sum of pixels `(x, y)` with `y < Y` and
/// `|x - X + 1| <= Y - y - 1`: the triangle whose apex is pixel
/// `(X - 1, Y - 1)`. Columns are padded by the image height on both sides
/// so the recurrence never reads outside the table.
struct TiltedTable {
    pad: i64,
    stride: usize,
    table: Vec<f64>,
}

impl TiltedTable {
    fn new(gray: &GrayImage) -> Self {
        let (w, h) = gray.dimensions();
        let pad = i64::from(h) + 1;
        let stride = (i64::from(w) + 2 * pad + 1) as usize;
        let mut table = vec![0.0f64; stride * (h as usize + 1)];
        let pixel = |x: i64, y: i64| -> f64 {
            if x < 0 || y < 0 || x >= i64::from(w) || y >= i64::from(h) {
                0.0
            } else {
                f64::from(gray.get_pixel(x as u32, y as u32).0[0])
            }
        };

        for big_y in 1..=i64::from(h) {
            for col in 1..stride - 1 {
                let big_x = col as i64 - pad;
                let row = big_y as usize * stride;
                let above = (big_y as usize - 1) * stride;
                let two_above = if big_y >= 2 {
                    table[(big_y as usize - 2) * stride + col]
                } else {
                    0.0
                };
                table[row + col] = table[above + col - 1] + table[above + col + 1] - two_above
                    + pixel(big_x - 1, big_y - 1)
                    + pixel(big_x - 1, big_y - 2);
            }
        }
        Self { pad, stride, table }
    }

    fn at(&self, big_x: i64, big_y: i64) -> f64 {
        let col = big_x + self.pad;
        if col < 0 || big_y < 0 || col as usize >= self.stride {
            return 0.0;
        }
        self.table.get(big_y as usize * self.stride + col as usize).copied().unwrap_or(0.0)
    }

    fn rect(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        let (x, y, w, h) = (i64::from(x), i64::from(y), i64::from(w), i64::from(h));
        self.at(x, y) - self.at(x - h, y + h) - self.at(x + w, y + w) + self.at(x + w - h, y + w + h)
    }
}

fn similar(a: &Region, b: &Region, eps: f64) -> bool {
    let delta = eps * (f64::from(a.width.min(b.width)) + f64::from(a.height.min(b.height))) * 0.5;
    let d = |p: u32, q: u32| (f64::from(p) - f64::from(q)).abs() <= delta;
    d(a.x, b.x) && d(a.y, b.y) && d(a.right(), b.right()) && d(a.bottom(), b.bottom())
}

fn find(parent: &mut [usize], i: usize) -> usize {
    let mut root = i;
    while parent[root] != root {
        root = parent[root];
    }
    let mut node = i;
    while parent[node] != root {
        let next = parent[node];
        parent[node] = root;
        node = next;
    }
    root
}

/// Cluster overlapping detections, drop clusters with `min_neighbors` or
/// fewer members, average the rest and remove clusters nested in stronger ones.
#[must_use]
pub fn group_rectangles(rects: &[Region], min_neighbors: usize, eps: f64) -> Vec<Region> {
    if rects.is_empty() {
        return Vec::new();
    }
    let mut parent: Vec<usize> = (0..rects.len()).collect();
    for i in 0..rects.len() {
        for j in i + 1..rects.len() {
            if similar(&rects[i], &rects[j], eps) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    let mut clusters: std::collections::BTreeMap<usize, (usize, [f64; 4])> = std::collections::BTreeMap::new();
    for (i, r) in rects.iter().enumerate() {
        let root = find(&mut parent, i);
        let entry = clusters.entry(root).or_insert((0, [0.0; 4]));
        entry.0 += 1;
        entry.1[0] += f64::from(r.x);
        entry.1[1] += f64::from(r.y);
        entry.1[2] += f64::from(r.width);
        entry.1[3] += f64::from(r.height);
    }

    let averaged: Vec<(usize, Region)> = clusters
        .values()
        .filter(|(n, _)| *n > min_neighbors)
        .map(|(n, s)| {
            let k = *n as f64;
            (
                *n,
                Region::new(
                    (s[0] / k).round() as u32,
                    (s[1] / k).round() as u32,
                    (s[2] / k).round() as u32,
                    (s[3] / k).round() as u32,
                ),
            )
        })
        .collect();

    averaged
        .iter()
        .filter(|(n1, r1)| {
            !averaged.iter().any(|(n2, r2)| {
                if r1 == r2 {
                    return false;
                }
                let dx = (f64::from(r2.width) * eps).round();
                let dy = (f64::from(r2.height) * eps).round();
                let inside = f64::from(r1.x) >= f64::from(r2.x) - dx
                    && f64::from(r1.y) >= f64::from(r2.y) - dy
                    && f64::from(r1.right()) <= f64::from(r2.right()) + dx
                    && f64::from(r1.bottom()) <= f64::from(r2.bottom()) + dy;
                inside && (*n2 > (*n1).max(3) || *n1 < 3)
            })
        })
        .map(|(_, r)| *r)
        .collect()
}
