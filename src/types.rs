//! Core types shared across retouching operations

use crate::{
    config::OutputFormat,
    error::{RetouchError, Result},
    mask::Mask,
    services::ImageIOService,
};
use chrono::{DateTime, Utc};
use image::{DynamicImage, GenericImageView};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Axis-aligned rectangle in source-buffer pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Region covering a whole `width` x `height` buffer
    #[must_use]
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Build a region from signed bounds, clipped to the buffer
    ///
    /// Returns `None` when nothing of the rectangle lies inside the buffer.
    #[must_use]
    pub fn clipped(
        x: i64,
        y: i64,
        width: i64,
        height: i64,
        bounds: (u32, u32),
    ) -> Option<Self> {
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + width).min(i64::from(bounds.0));
        let y1 = (y + height).min(i64::from(bounds.1));
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self::new(
            x0 as u32,
            y0 as u32,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
        ))
    }

    /// Grow by a fixed pixel margin on every side, clipped to the buffer
    ///
    /// `None` when the grown rectangle still lies entirely outside the buffer.
    #[must_use]
    pub fn expand(&self, margin: u32, bounds: (u32, u32)) -> Option<Self> {
        let m = i64::from(margin);
        Self::clipped(
            i64::from(self.x) - m,
            i64::from(self.y) - m,
            i64::from(self.width) + 2 * m,
            i64::from(self.height) + 2 * m,
            bounds,
        )
    }

    /// Grow by ratios of the current size: `left`/`top` shift the origin,
    /// `width_scale`/`height_scale` set the new size.
    #[must_use]
    pub fn expand_ratio(
        &self,
        left: f32,
        top: f32,
        width_scale: f32,
        height_scale: f32,
        bounds: (u32, u32),
    ) -> Option<Self> {
        let w = self.width as f32;
        let h = self.height as f32;
        Self::clipped(
            (self.x as f32 - left * w) as i64,
            (self.y as f32 - top * h) as i64,
            (w * width_scale) as i64,
            (h * height_scale) as i64,
            bounds,
        )
    }

    /// Intersection with a `bounds.0` x `bounds.1` buffer
    #[must_use]
    pub fn clip_to(&self, bounds: (u32, u32)) -> Option<Self> {
        Self::clipped(
            i64::from(self.x),
            i64::from(self.y),
            i64::from(self.width),
            i64::from(self.height),
            bounds,
        )
    }

    /// Lower half of the region (mouth search area)
    #[must_use]
    pub fn lower_half(&self) -> Self {
        let half = self.height / 2;
        Self::new(self.x, self.y + half, self.width, self.height - half)
    }

    /// Translate a region expressed relative to this one into absolute coordinates
    #[must_use]
    pub fn offset(&self, inner: Region) -> Self {
        Self::new(
            self.x + inner.x,
            self.y + inner.y,
            inner.width,
            inner.height,
        )
    }

    /// Integer centre point
    #[must_use]
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[must_use]
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Whether `other` lies fully inside this region
    #[must_use]
    pub fn contains(&self, other: &Region) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.x, self.y
        )
    }
}

/// A detected face plus the eye and mouth regions found inside it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub face: Region,
    pub eyes: Vec<Region>,
    pub mouths: Vec<Region>,
}

impl FaceRegion {
    #[must_use]
    pub fn new(face: Region) -> Self {
        Self {
            face,
            eyes: Vec::new(),
            mouths: Vec::new(),
        }
    }

    /// Eye and mouth regions, the parts of the face that whitening protects
    pub fn features(&self) -> impl Iterator<Item = &Region> {
        self.eyes.iter().chain(self.mouths.iter())
    }

    /// Clip the face to the buffer and its features to the face
    ///
    /// Returns `None` when the face does not overlap the buffer. Features
    /// left with no area are dropped.
    #[must_use]
    pub fn clip_to(&self, bounds: (u32, u32)) -> Option<Self> {
        let face = self.face.clip_to(bounds)?;
        let inside = |r: &Region| {
            Region::clipped(
                i64::from(r.x) - i64::from(face.x),
                i64::from(r.y) - i64::from(face.y),
                i64::from(r.width),
                i64::from(r.height),
                (face.width, face.height),
            )
            .map(|local| face.offset(local))
        };
        Some(Self {
            face,
            eyes: self.eyes.iter().filter_map(inside).collect(),
            mouths: self.mouths.iter().filter_map(inside).collect(),
        })
    }
}

/// Which cascade tier produced a segmentation mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentationTier {
    /// External neural segmentation model
    Neural,
    /// Rectangle-seeded graph cut
    GraphCut,
    /// Fixed centred ellipse
    GeometricFallback,
}

impl SegmentationTier {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neural => "neural",
            Self::GraphCut => "graph-cut",
            Self::GeometricFallback => "geometric-fallback",
        }
    }
}

impl std::fmt::Display for SegmentationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alpha mask plus the tier that produced it
#[derive(Debug, Clone)]
pub struct SegmentationResult {
    pub mask: Mask,
    pub tier: SegmentationTier,
}

/// Timing breakdown for one processing call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Decoding the input buffer
    pub image_decode_ms: u64,

    /// Region detection
    pub detection_ms: u64,

    /// Foreground segmentation
    pub segmentation_ms: u64,

    /// Filtering, blending and compositing
    pub processing_ms: u64,

    /// Final image encoding (if saving to file)
    pub image_encode_ms: Option<u64>,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Time not attributed to any measured phase
    #[must_use]
    pub fn other_overhead_ms(&self) -> u64 {
        let measured = self.image_decode_ms
            + self.detection_ms
            + self.segmentation_ms
            + self.processing_ms
            + self.image_encode_ms.unwrap_or(0);
        self.total_ms.saturating_sub(measured)
    }

    /// One-line summary for logs
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Total: {}ms | Decode: {}ms | Detect: {}ms | Segment: {}ms | Process: {}ms",
            self.total_ms,
            self.image_decode_ms,
            self.detection_ms,
            self.segmentation_ms,
            self.processing_ms
        );
        if let Some(encode_ms) = self.image_encode_ms {
            summary.push_str(&format!(" | Encode: {}ms", encode_ms));
        }
        summary
    }
}

/// Metadata about a processing call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    /// Operation name (`beauty`, `filter`, `remove-background`, ...)
    pub operation: String,

    /// Number of faces found by the region detector, if it ran
    pub faces_detected: Option<usize>,

    /// Beauty ran in whole-image mode, or segmentation fell below the neural tier
    pub degraded: bool,

    /// Cascade tier used for segmentation, if it ran
    pub segmentation_tier: Option<SegmentationTier>,

    /// Stage names actually executed, in order
    pub stages: Vec<String>,

    /// Detailed timing breakdown
    pub timings: ProcessingTimings,

    /// When processing finished
    pub processed_at: DateTime<Utc>,
}

impl ProcessingMetadata {
    #[must_use]
    pub fn new<S: Into<String>>(operation: S) -> Self {
        Self {
            operation: operation.into(),
            faces_detected: None,
            degraded: false,
            segmentation_tier: None,
            stages: Vec::new(),
            timings: ProcessingTimings::new(),
            processed_at: Utc::now(),
        }
    }
}

/// Result of a retouching operation
#[derive(Debug, Clone)]
pub struct RetouchResult {
    /// The processed image
    pub image: DynamicImage,

    /// Processing metadata
    pub metadata: ProcessingMetadata,

    /// Original input path (for logging purposes)
    pub input_path: Option<String>,
}

impl RetouchResult {
    #[must_use]
    pub fn new(image: DynamicImage, metadata: ProcessingMetadata) -> Self {
        Self {
            image,
            metadata,
            input_path: None,
        }
    }

    /// Save in the specified format
    pub fn save<P: AsRef<Path>>(&self, path: P, format: OutputFormat, quality: u8) -> Result<()> {
        ImageIOService::save_image(&self.image, path, format, quality)
    }

    /// Save and record the encode time in the metadata
    pub fn save_timed<P: AsRef<Path>>(
        &mut self,
        path: P,
        format: OutputFormat,
        quality: u8,
    ) -> Result<()> {
        let encode_start = instant::Instant::now();
        self.save(&path, format, quality)?;
        let encode_ms = encode_start.elapsed().as_millis() as u64;
        self.metadata.timings.image_encode_ms = Some(encode_ms);

        let input_path = self.input_path.as_deref().unwrap_or("input");
        info!(
            "Processed: {} -> {} ({})",
            input_path,
            path.as_ref().display(),
            self.metadata.timings.summary()
        );
        Ok(())
    }

    /// Get the image as encoded bytes in the specified format
    pub fn to_bytes(&self, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
        ImageIOService::encode(&self.image, format, quality)
    }

    /// Get image dimensions
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    #[must_use]
    pub fn timings(&self) -> &ProcessingTimings {
        &self.metadata.timings
    }

    /// Serialize the metadata for sidecar files or API responses
    pub fn metadata_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.metadata)
            .map_err(|e| RetouchError::internal(format!("Failed to serialize metadata: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_clipping() {
        let r = Region::clipped(-10, -5, 50, 40, (30, 30)).unwrap();
        assert_eq!(r, Region::new(0, 0, 30, 30));

        assert!(Region::clipped(40, 40, 10, 10, (30, 30)).is_none());
        assert!(Region::clipped(5, 5, 0, 10, (30, 30)).is_none());
    }

    #[test]
    fn test_region_expand_stays_in_bounds() {
        let r = Region::new(2, 3, 10, 10);
        let grown = r.expand(5, (20, 20)).unwrap();
        assert_eq!(grown, Region::new(0, 0, 17, 18));
        assert!(Region::full(20, 20).contains(&grown));
    }

    #[test]
    fn test_region_outside_frame_is_dropped() {
        let off_frame = Region::new(50, 50, 10, 10);
        assert_eq!(off_frame.expand(5, (40, 40)), None);
        assert_eq!(off_frame.expand_ratio(0.3, 0.15, 1.6, 1.3, (40, 40)), None);
        assert_eq!(off_frame.clip_to((40, 40)), None);

        let straddling = Region::new(35, 30, 10, 20);
        assert_eq!(straddling.clip_to((40, 40)), Some(Region::new(35, 30, 5, 10)));
    }

    #[test]
    fn test_face_clip_keeps_features_inside() {
        let mut face = FaceRegion::new(Region::new(20, 20, 30, 30));
        face.eyes = vec![Region::new(25, 25, 6, 4), Region::new(100, 100, 5, 5)];
        face.mouths = vec![Region::new(30, 36, 12, 6)];

        let clipped = face.clip_to((40, 40)).unwrap();
        assert_eq!(clipped.face, Region::new(20, 20, 20, 20));
        assert_eq!(clipped.eyes, vec![Region::new(25, 25, 6, 4)]);
        assert_eq!(clipped.mouths, vec![Region::new(30, 36, 10, 4)]);
        for feature in clipped.features() {
            assert!(clipped.face.contains(feature));
        }

        assert!(FaceRegion::new(Region::new(60, 0, 10, 10)).clip_to((40, 40)).is_none());
    }

    #[test]
    fn test_face_neck_expansion() {
        // 30% each side, 15% up, 1.6w x 1.3h
        let face = Region::new(100, 100, 100, 100);
        let grown = face.expand_ratio(0.3, 0.15, 1.6, 1.3, (1000, 1000)).unwrap();
        assert_eq!(grown, Region::new(70, 85, 160, 130));
    }

    #[test]
    fn test_lower_half_and_offset() {
        let face = Region::new(10, 20, 40, 41);
        let lower = face.lower_half();
        assert_eq!(lower, Region::new(10, 40, 40, 21));

        let inner = Region::new(3, 4, 5, 6);
        assert_eq!(face.offset(inner), Region::new(13, 24, 5, 6));
    }

    #[test]
    fn test_tier_names() {
        assert_eq!(SegmentationTier::Neural.to_string(), "neural");
        assert_eq!(SegmentationTier::GraphCut.to_string(), "graph-cut");
        assert_eq!(
            SegmentationTier::GeometricFallback.to_string(),
            "geometric-fallback"
        );
        let json = serde_json::to_string(&SegmentationTier::GeometricFallback).unwrap();
        assert_eq!(json, "\"geometric-fallback\"");
    }

    #[test]
    fn test_timings_overhead() {
        let timings = ProcessingTimings {
            image_decode_ms: 5,
            detection_ms: 10,
            segmentation_ms: 0,
            processing_ms: 20,
            image_encode_ms: Some(5),
            total_ms: 50,
        };
        assert_eq!(timings.other_overhead_ms(), 10);
        assert!(timings.summary().contains("Encode: 5ms"));
    }
}
