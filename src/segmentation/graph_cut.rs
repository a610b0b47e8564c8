//! Graph-cut tier: rectangle-seeded GrabCut
//!
//! Foreground and background colours are each modelled by a Gaussian
//! mixture. Every iteration reassigns pixels to mixture components, refits
//! the mixtures and solves a min cut over the 8-connected pixel graph.
//! Pixels outside the seed rectangle stay background throughout.
//!
//! With the `opencv` feature the cut runs through `imgproc::grab_cut` and
//! the built-in solver only handles OpenCV failures.

use super::maxflow::FlowGraph;
use super::SegmentationStrategy;
use crate::config::SegmentationConfig;
use crate::error::{RetouchError, Result};
use crate::mask::Mask;
use crate::types::{Region, SegmentationTier};
use image::{imageops, RgbImage};
use tracing::debug;

const COMPONENTS: usize = 5;
const GAMMA: f64 = 50.0;
const LAMBDA: f64 = 8.0 * GAMMA + 1.0;
const KMEANS_ITERATIONS: usize = 10;
const COVARIANCE_REGULARIZATION: f64 = 0.01;
/// Images smaller than this on either side are rejected
pub const MIN_SIDE: u32 = 8;

/// Seed rectangle margins as fractions of the frame: left/right, top, bottom
const MARGIN_X: f32 = 0.2;
const MARGIN_TOP: f32 = 0.18;
const MARGIN_BOTTOM: f32 = 0.12;

type Color = [f64; 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Background,
    ProbableBackground,
    ProbableForeground,
}

impl Label {
    fn is_foreground(self) -> bool {
        self == Self::ProbableForeground
    }

    fn is_fixed(self) -> bool {
        self == Self::Background
    }
}

#[derive(Debug, Clone)]
struct Component {
    weight: f64,
    mean: Color,
    inverse: [[f64; 3]; 3],
    norm: f64,
}

impl Component {
    fn density(&self, c: &Color) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        let d = [c[0] - self.mean[0], c[1] - self.mean[1], c[2] - self.mean[2]];
        let mut m = 0.0;
        for (i, row) in self.inverse.iter().enumerate() {
            m += d[i] * (row[0] * d[0] + row[1] * d[1] + row[2] * d[2]);
        }
        self.norm * (-0.5 * m).exp()
    }
}

/// Gaussian mixture over RGB
#[derive(Debug, Clone)]
struct ColorModel {
    components: Vec<Component>,
}

impl ColorModel {
    /// Fit from samples with a component index per sample
    fn fit(samples: &[Color], assignment: &[usize]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let total = samples.len() as f64;
        let mut components = Vec::with_capacity(COMPONENTS);
        for k in 0..COMPONENTS {
            let members: Vec<&Color> = samples
                .iter()
                .zip(assignment)
                .filter(|(_, a)| **a == k)
                .map(|(c, _)| c)
                .collect();
            if members.is_empty() {
                components.push(Component {
                    weight: 0.0,
                    mean: [0.0; 3],
                    inverse: [[0.0; 3]; 3],
                    norm: 0.0,
                });
                continue;
            }
            let n = members.len() as f64;
            let mut mean = [0.0; 3];
            for c in &members {
                for i in 0..3 {
                    mean[i] += c[i] / n;
                }
            }
            let mut cov = [[0.0; 3]; 3];
            for c in &members {
                for i in 0..3 {
                    for j in 0..3 {
                        cov[i][j] += (c[i] - mean[i]) * (c[j] - mean[j]) / n;
                    }
                }
            }
            for (i, row) in cov.iter_mut().enumerate() {
                row[i] += COVARIANCE_REGULARIZATION;
            }
            let (det, inverse) = invert3(&cov)?;
            components.push(Component {
                weight: n / total,
                mean,
                inverse,
                norm: 1.0 / det.sqrt(),
            });
        }
        Some(Self { components })
    }

    fn likelihood(&self, c: &Color) -> f64 {
        self.components
            .iter()
            .map(|k| k.weight * k.density(c))
            .sum()
    }

    fn best_component(&self, c: &Color) -> usize {
        let mut best = 0;
        let mut best_density = -1.0;
        for (k, component) in self.components.iter().enumerate() {
            if component.weight <= 0.0 {
                continue;
            }
            let d = component.density(c);
            if d > best_density {
                best = k;
                best_density = d;
            }
        }
        best
    }
}

fn invert3(m: &[[f64; 3]; 3]) -> Option<(f64, [[f64; 3]; 3])> {
    let c00 = m[1][1] * m[2][2] - m[1][2] * m[2][1];
    let c01 = m[1][2] * m[2][0] - m[1][0] * m[2][2];
    let c02 = m[1][0] * m[2][1] - m[1][1] * m[2][0];
    let det = m[0][0] * c00 + m[0][1] * c01 + m[0][2] * c02;
    if !det.is_finite() || det <= f64::EPSILON {
        return None;
    }
    let inv = [
        [
            c00 / det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) / det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) / det,
        ],
        [
            c01 / det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) / det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) / det,
        ],
        [
            c02 / det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) / det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) / det,
        ],
    ];
    Some((det, inv))
}

fn distance2(a: &Color, b: &Color) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// Deterministic k-means: seeds are brightness quantiles
fn kmeans(samples: &[Color], k: usize) -> Vec<usize> {
    if samples.is_empty() || k == 0 {
        return Vec::new();
    }
    let mut order: Vec<usize> = (0..samples.len()).collect();
    order.sort_by(|&a, &b| {
        let la = samples[a].iter().sum::<f64>();
        let lb = samples[b].iter().sum::<f64>();
        la.total_cmp(&lb)
    });
    let mut centers: Vec<Color> = (0..k)
        .map(|i| {
            let pos = ((i as f64 + 0.5) / k as f64 * samples.len() as f64) as usize;
            samples[order[pos.min(samples.len() - 1)]]
        })
        .collect();

    let mut assignment = vec![0; samples.len()];
    for _ in 0..KMEANS_ITERATIONS {
        for (a, c) in assignment.iter_mut().zip(samples) {
            *a = centers
                .iter()
                .enumerate()
                .map(|(i, center)| (i, distance2(c, center)))
                .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
                .0;
        }
        let mut sums = vec![[0.0; 3]; k];
        let mut counts = vec![0usize; k];
        for (a, c) in assignment.iter().zip(samples) {
            counts[*a] += 1;
            for i in 0..3 {
                sums[*a][i] += c[i];
            }
        }
        for ((center, sum), count) in centers.iter_mut().zip(&sums).zip(&counts) {
            if *count > 0 {
                let n = *count as f64;
                *center = [sum[0] / n, sum[1] / n, sum[2] / n];
            }
        }
    }
    assignment
}

/// GrabCut state over one working image
struct GrabCut {
    width: usize,
    height: usize,
    colors: Vec<Color>,
    labels: Vec<Label>,
    beta: f64,
}

impl GrabCut {
    fn new(image: &RgbImage, rect: Region) -> Self {
        let (w, h) = image.dimensions();
        let colors: Vec<Color> = image
            .pixels()
            .map(|p| [f64::from(p[0]), f64::from(p[1]), f64::from(p[2])])
            .collect();
        let labels = (0..h)
            .flat_map(|y| (0..w).map(move |x| (x, y)))
            .map(|(x, y)| {
                if x >= rect.x && x < rect.right() && y >= rect.y && y < rect.bottom() {
                    Label::ProbableForeground
                } else {
                    Label::Background
                }
            })
            .collect();
        let mut gc = Self {
            width: w as usize,
            height: h as usize,
            colors,
            labels,
            beta: 0.0,
        };
        gc.beta = gc.compute_beta();
        gc
    }

    /// Offsets of the already-visited neighbours (left, up-left, up, up-right)
    /// with their distance weight
    fn back_neighbors(&self, x: usize, y: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let w = self.width;
        let diag = GAMMA / std::f64::consts::SQRT_2;
        [
            (x > 0).then(|| (y * w + x - 1, GAMMA)),
            (x > 0 && y > 0).then(|| ((y - 1) * w + x - 1, diag)),
            (y > 0).then(|| ((y - 1) * w + x, GAMMA)),
            (x + 1 < w && y > 0).then(|| ((y - 1) * w + x + 1, diag)),
        ]
        .into_iter()
        .flatten()
    }

    fn compute_beta(&self) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;
        for y in 0..self.height {
            for x in 0..self.width {
                let p = y * self.width + x;
                for (q, _) in self.back_neighbors(x, y) {
                    sum += distance2(&self.colors[p], &self.colors[q]);
                    count += 1;
                }
            }
        }
        if count == 0 || sum <= f64::EPSILON {
            0.0
        } else {
            1.0 / (2.0 * sum / count as f64)
        }
    }

    fn samples(&self, foreground: bool) -> Vec<Color> {
        self.colors
            .iter()
            .zip(&self.labels)
            .filter(|(_, l)| l.is_foreground() == foreground)
            .map(|(c, _)| *c)
            .collect()
    }

    /// Fresh mixtures from k-means over the current labelling
    fn init_models(&self) -> Result<(ColorModel, ColorModel)> {
        let fit = |foreground: bool| {
            let samples = self.samples(foreground);
            let assignment = kmeans(&samples, COMPONENTS);
            ColorModel::fit(&samples, &assignment).ok_or_else(|| {
                RetouchError::tier(
                    SegmentationTier::GraphCut,
                    format!(
                        "cannot train {} colour model",
                        if foreground { "foreground" } else { "background" }
                    ),
                )
            })
        };
        Ok((fit(false)?, fit(true)?))
    }

    fn refit(&self, background: &ColorModel, foreground: &ColorModel) -> Result<(ColorModel, ColorModel)> {
        let refit_one = |model: &ColorModel, fg: bool| {
            let samples = self.samples(fg);
            let assignment: Vec<usize> = samples.iter().map(|c| model.best_component(c)).collect();
            ColorModel::fit(&samples, &assignment).ok_or_else(|| {
                RetouchError::tier(SegmentationTier::GraphCut, "colour model became degenerate")
            })
        };
        Ok((refit_one(background, false)?, refit_one(foreground, true)?))
    }

    fn cut(&mut self, background: &ColorModel, foreground: &ColorModel) {
        let n = self.width * self.height;
        let (source, sink) = (n, n + 1);
        let mut graph = FlowGraph::new(n + 2);

        for y in 0..self.height {
            for x in 0..self.width {
                let p = y * self.width + x;
                let (from_source, to_sink) = match self.labels[p] {
                    Label::Background => (0.0, LAMBDA),
                    Label::ProbableBackground | Label::ProbableForeground => {
                        let c = &self.colors[p];
                        (
                            -background.likelihood(c).max(f64::MIN_POSITIVE).ln(),
                            -foreground.likelihood(c).max(f64::MIN_POSITIVE).ln(),
                        )
                    },
                };
                // Only the difference between the t-links affects the cut
                let d = from_source - to_sink;
                if d > 0.0 {
                    graph.add_edge(source, p, d, 0.0);
                } else if d < 0.0 {
                    graph.add_edge(p, sink, -d, 0.0);
                }

                for (q, weight) in self.back_neighbors(x, y) {
                    let w = weight * (-self.beta * distance2(&self.colors[p], &self.colors[q])).exp();
                    graph.add_edge(p, q, w, w);
                }
            }
        }

        let flow = graph.max_flow(source, sink);
        let side = graph.source_side(source);
        for (label, in_source) in self.labels.iter_mut().zip(side) {
            if !label.is_fixed() {
                *label = if in_source {
                    Label::ProbableForeground
                } else {
                    Label::ProbableBackground
                };
            }
        }
        debug!(flow, "graph cut solved");
    }

    fn iterate(&mut self, iterations: usize) -> Result<()> {
        let (mut background, mut foreground) = self.init_models()?;
        for _ in 0..iterations {
            (background, foreground) = self.refit(&background, &foreground)?;
            self.cut(&background, &foreground);
        }
        Ok(())
    }

    fn foreground_mask(&self) -> Mask {
        Mask::from_fn(self.width as u32, self.height as u32, |x, y| {
            if self.labels[y as usize * self.width + x as usize].is_foreground() {
                1.0
            } else {
                0.0
            }
        })
    }
}

/// Second cascade tier
#[derive(Debug, Clone)]
pub struct GraphCutTier {
    max_side: u32,
    iterations: usize,
    refine_iterations: usize,
}

impl Default for GraphCutTier {
    fn default() -> Self {
        Self::from_config(&SegmentationConfig::default())
    }
}

impl GraphCutTier {
    #[must_use]
    pub fn from_config(config: &SegmentationConfig) -> Self {
        Self {
            max_side: config.graph_cut_max_side.max(MIN_SIDE),
            iterations: config.graph_cut_iterations.max(1),
            refine_iterations: config.graph_cut_refine_iterations,
        }
    }

    /// Seed rectangle for a frame of the given size
    #[must_use]
    pub fn seed_rect(width: u32, height: u32) -> Region {
        let x0 = (width as f32 * MARGIN_X).round() as u32;
        let y0 = (height as f32 * MARGIN_TOP).round() as u32;
        let y1 = height.saturating_sub((height as f32 * MARGIN_BOTTOM).round() as u32);
        let x1 = width.saturating_sub(x0);
        Region::new(x0, y0, x1.saturating_sub(x0).max(1), y1.saturating_sub(y0).max(1))
    }

    fn working_copy(&self, image: &RgbImage) -> RgbImage {
        let (w, h) = image.dimensions();
        let longest = w.max(h);
        if longest <= self.max_side {
            return image.clone();
        }
        let scale = self.max_side as f32 / longest as f32;
        let nw = ((w as f32 * scale).round() as u32).max(1);
        let nh = ((h as f32 * scale).round() as u32).max(1);
        imageops::resize(image, nw, nh, imageops::FilterType::Triangle)
    }
}

impl SegmentationStrategy for GraphCutTier {
    fn tier(&self) -> SegmentationTier {
        SegmentationTier::GraphCut
    }

    fn try_run(&self, image: &RgbImage) -> Result<Mask> {
        let (w, h) = image.dimensions();
        let work = self.working_copy(image);
        let (ww, wh) = work.dimensions();
        if w < MIN_SIDE || h < MIN_SIDE || ww < MIN_SIDE || wh < MIN_SIDE {
            return Err(RetouchError::tier(
                SegmentationTier::GraphCut,
                format!("image {w}x{h} is too small for a graph cut"),
            ));
        }

        let rect = Self::seed_rect(ww, wh);
        debug!(working = %format!("{ww}x{wh}"), rect = %rect, "running graph cut");
        let mask = match external_grab_cut(&work, rect, self.iterations, self.refine_iterations) {
            Some(mask) => mask,
            None => {
                let mut grabcut = GrabCut::new(&work, rect);
                grabcut.iterate(self.iterations)?;
                if self.refine_iterations > 0 {
                    grabcut.iterate(self.refine_iterations)?;
                }
                grabcut.foreground_mask()
            },
        };
        if mask.coverage(0.5) <= 0.0 {
            return Err(RetouchError::tier(
                SegmentationTier::GraphCut,
                "graph cut produced an empty foreground",
            ));
        }
        Ok(mask.resize(w, h))
    }
}

/// OpenCV's GrabCut, or `None` to run the built-in solver
#[cfg(feature = "opencv")]
fn external_grab_cut(work: &RgbImage, rect: Region, iterations: usize, refine_iterations: usize) -> Option<Mask> {
    match crate::backends::opencv::grab_cut(work, rect, iterations, refine_iterations) {
        Ok(mask) => Some(mask),
        Err(e) => {
            log::warn!("⚠️ OpenCV GrabCut failed, using built-in solver: {}", e);
            None
        },
    }
}

#[cfg(not(feature = "opencv"))]
fn external_grab_cut(_work: &RgbImage, _rect: Region, _iterations: usize, _refine_iterations: usize) -> Option<Mask> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn subject_on_blue(width: u32, height: u32) -> RgbImage {
        let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
        let (ax, ay) = (width as f32 * 0.2, height as f32 * 0.25);
        RgbImage::from_fn(width, height, |x, y| {
            let dx = (x as f32 - cx) / ax;
            let dy = (y as f32 - cy) / ay;
            if dx * dx + dy * dy <= 1.0 {
                Rgb([200, 60, 40])
            } else {
                Rgb([30, 60, 200])
            }
        })
    }

    #[test]
    fn test_seed_rect_margins() {
        let rect = GraphCutTier::seed_rect(100, 100);
        assert_eq!(rect, Region::new(20, 18, 60, 70));
    }

    #[test]
    fn test_separates_synthetic_subject() {
        let image = subject_on_blue(80, 100);
        let mask = GraphCutTier::default().try_run(&image).unwrap();
        assert_eq!(mask.dimensions(), (80, 100));
        assert!(mask.get(40, 50) > 0.5);
        assert!(mask.get(0, 0) < 0.5);
        // Inside the seed rectangle but off the subject
        assert!(mask.get(18, 24) < 0.5);
    }

    #[test]
    fn test_large_input_downscaled_and_restored() {
        let image = subject_on_blue(400, 300);
        let tier = GraphCutTier::default();
        assert_eq!(tier.working_copy(&image).dimensions(), (160, 120));
        let mask = tier.try_run(&image).unwrap();
        assert_eq!(mask.dimensions(), (400, 300));
        assert!(mask.get(200, 150) > 0.5);
    }

    #[test]
    fn test_tiny_image_fails() {
        let err = GraphCutTier::default().try_run(&RgbImage::new(5, 40)).unwrap_err();
        assert!(err.is_tier_failure());
    }

    #[test]
    fn test_kmeans_splits_two_clusters() {
        let samples: Vec<Color> = (0..20)
            .map(|i| if i < 10 { [0.0, 0.0, 0.0] } else { [255.0, 255.0, 255.0] })
            .collect();
        let assignment = kmeans(&samples, 2);
        assert_ne!(assignment[0], assignment[19]);
        assert!(assignment[..10].iter().all(|a| *a == assignment[0]));
    }

    #[test]
    fn test_model_prefers_its_own_colour() {
        let red: Vec<Color> = vec![[200.0, 60.0, 40.0]; 30];
        let blue: Vec<Color> = vec![[30.0, 60.0, 200.0]; 30];
        let fg = ColorModel::fit(&red, &kmeans(&red, COMPONENTS)).unwrap();
        let bg = ColorModel::fit(&blue, &kmeans(&blue, COMPONENTS)).unwrap();
        assert!(fg.likelihood(&red[0]) > bg.likelihood(&red[0]));
        assert!(bg.likelihood(&blue[0]) > fg.likelihood(&blue[0]));
    }
}
