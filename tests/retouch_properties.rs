//! Behavioural properties of the public retouching API
//!
//! Collaborators are mocked locally or written to temporary files, so these
//! run without shipped cascades or model weights.

use image::{DynamicImage, Rgb, Rgb32FImage, RgbImage};
use photo_retouch::{
    blend::{blend_full, blend_into, extract},
    color::luma_statistics,
    compositing, BackgroundColor, BeautyParams, BeautyPipeline, CascadeRegionDetector,
    DetectorConfig, FaceRegion, GeometricTier, Mask, NeuralSegmenter, NeuralTier, Operation, Region,
    RegionDetector, RetouchConfig, RetouchError, RetouchProcessor, SegmentationCascade,
    SegmentationStrategy, SegmentationTier, SegmenterOutput,
};
use std::sync::Arc;

/// Detector that never finds a face
struct NoFaces;

impl RegionDetector for NoFaces {
    fn detect(&self, _image: &RgbImage) -> Vec<FaceRegion> {
        Vec::new()
    }
}

/// Segmenter marking the left half of the frame as foreground
struct LeftHalf;

impl NeuralSegmenter for LeftHalf {
    fn segment(&self, image: &RgbImage) -> photo_retouch::Result<SegmenterOutput> {
        let (w, h) = image.dimensions();
        Ok(SegmenterOutput::Probability(Mask::from_fn(w, h, |x, _| {
            if x < w / 2 {
                1.0
            } else {
                0.0
            }
        })))
    }
}

/// Tier that is always unavailable
struct Unavailable(SegmentationTier);

impl SegmentationStrategy for Unavailable {
    fn tier(&self) -> SegmentationTier {
        self.0
    }

    fn try_run(&self, _image: &RgbImage) -> photo_retouch::Result<Mask> {
        Err(RetouchError::tier(self.0, "forced unavailable"))
    }
}

fn gradient(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        Rgb([(x * 255 / w) as u8, (y * 255 / h) as u8, ((x + y) % 200) as u8])
    })
}

fn geometric_only_cascade() -> SegmentationCascade {
    SegmentationCascade::new(vec![
        Box::new(NeuralTier::new(None)),
        Box::new(Unavailable(SegmentationTier::GraphCut)),
        Box::new(GeometricTier),
    ])
}

#[test]
fn blending_identical_buffers_is_a_no_op() {
    let base = photo_retouch::color::to_float(&gradient(40, 30));
    let mask = Mask::from_fn(40, 30, |x, y| ((x + y) % 7) as f32 / 6.0);

    let full = blend_full(&base, &base, &mask, 0.8);
    for (a, b) in full.pixels().zip(base.pixels()) {
        for c in 0..3 {
            assert!((a.0[c] - b.0[c]).abs() < 1e-4);
        }
    }

    let region = Region::new(5, 4, 20, 12);
    let mut patched: Rgb32FImage = base.clone();
    let patch = extract(&base, region);
    blend_into(&mut patched, &patch, &mask.crop(region), region, 1.0);
    for (a, b) in patched.pixels().zip(base.pixels()) {
        for c in 0..3 {
            assert!((a.0[c] - b.0[c]).abs() < 1e-4);
        }
    }
}

#[test]
fn ellipse_mask_is_one_at_centre_and_zero_at_corners() {
    let mask = Mask::ellipse(120, 90, (10, 8), 15);
    assert!(mask.get(60, 45) > 0.99);
    for (x, y) in [(0, 0), (119, 0), (0, 89), (119, 89)] {
        assert!(mask.get(x, y) < 1e-3, "corner ({x},{y}) = {}", mask.get(x, y));
    }
}

#[test]
fn zero_strength_beauty_returns_input() {
    let image = gradient(64, 48);
    let outcome = BeautyPipeline::new(&NoFaces)
        .apply(&image, &BeautyParams::none())
        .unwrap();
    assert_eq!(outcome.image, image);
}

/// OpenCV-format cascade firing on a bright square centred in a dark window
const BLOB_CASCADE_XML: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier"><stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>12</height>
  <width>12</width>
  <stageParams>
    <maxWeakCount>1</maxWeakCount></stageParams>
  <featureParams>
    <maxCatCount>0</maxCatCount></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <!-- stage 0 -->
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>5.0000000000000000e-01</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 3.0000001192092896e-01</internalNodes>
          <leafValues>
            0. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 12 12 -1.</_>
        <_>
          4 4 4 4 9.</_></rects></_></features></cascade>
</opencv_storage>
"#;

#[test]
fn detector_on_faceless_content_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("haarcascade_blob.xml");
    std::fs::write(&path, BLOB_CASCADE_XML).unwrap();
    let config = DetectorConfig {
        face_cascade: Some(path),
        min_face_size: 12,
        face_min_neighbors: 1,
        ..DetectorConfig::default()
    };
    let detector = CascadeRegionDetector::from_config(&config);
    assert!(detector.has_face_cascade());

    let flat = RgbImage::from_pixel(80, 80, Rgb([30, 120, 200]));
    assert!(detector.detect(&flat).is_empty());
    assert!(detector.detect(&gradient(96, 72)).is_empty());

    // The same detector does fire on the pattern it was built for
    let blob = RgbImage::from_fn(90, 90, |x, y| {
        if (35..55).contains(&x) && (35..55).contains(&y) {
            Rgb([230, 230, 230])
        } else {
            Rgb([20, 20, 20])
        }
    });
    let faces = detector.detect(&blob);
    assert!(!faces.is_empty());
    let (cx, cy) = faces[0].face.center();
    assert!((35..=55).contains(&cx) && (35..=55).contains(&cy));
}

/// Saturated subject centred on a flat blue backdrop
fn subject_on_backdrop(width: u32, height: u32) -> RgbImage {
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
fn standard_cascade_uses_graph_cut_without_a_model() {
    let image = subject_on_backdrop(120, 160);
    let cascade = SegmentationCascade::standard(None, &RetouchConfig::default().segmentation);
    let (cutout, tier) = compositing::remove_background(&image, &cascade).unwrap();
    assert_eq!(tier, SegmentationTier::GraphCut);
    assert_eq!(cutout.get_pixel(60, 80).0[3], 255);
    for (x, y) in [(0, 0), (119, 0), (0, 159), (119, 159)] {
        assert_eq!(cutout.get_pixel(x, y).0[3], 0, "corner ({x},{y})");
    }
}

#[test]
fn cascade_without_neural_tier_still_segments() {
    let cascade = SegmentationCascade::standard(None, &RetouchConfig::default().segmentation);
    let result = cascade.segment(&gradient(48, 64)).unwrap();
    assert!(matches!(
        result.tier,
        SegmentationTier::GraphCut | SegmentationTier::GeometricFallback
    ));
    assert_eq!(result.mask.dimensions(), (48, 64));
}

#[test]
fn remove_background_alpha_is_zero_outside_fallback_ellipse() {
    let image = gradient(200, 200);
    let (cutout, tier) = compositing::remove_background(&image, &geometric_only_cascade()).unwrap();
    assert_eq!(tier, SegmentationTier::GeometricFallback);

    let (cx, cy) = GeometricTier::center(200, 200);
    let (ax, ay) = GeometricTier::axes(200, 200);
    assert_eq!((ax, ay), (33, 50));
    assert_eq!(cutout.get_pixel(cx, cy).0[3], 255);

    for (x, y, p) in cutout.enumerate_pixels() {
        let dx = (f64::from(x) - f64::from(cx)) / f64::from(ax + 3);
        let dy = (f64::from(y) - f64::from(cy)) / f64::from(ay + 3);
        if dx * dx + dy * dy > 1.0 {
            assert_eq!(p.0[3], 0, "alpha at ({x},{y})");
        }
        assert_eq!(&p.0[..3], &image.get_pixel(x, y).0);
    }
}

#[test]
fn replace_background_uses_colour_outside_and_source_inside() {
    let image = gradient(60, 40);
    let cascade = SegmentationCascade::standard(
        Some(Arc::new(LeftHalf)),
        &RetouchConfig::default().segmentation,
    );
    let color = BackgroundColor::rgb(10, 200, 30);
    let (out, tier) = compositing::replace_background(&image, color, &cascade).unwrap();
    assert_eq!(tier, SegmentationTier::Neural);

    assert_eq!(out.get_pixel(55, 20).0, [10, 200, 30]);
    assert_eq!(out.get_pixel(5, 20).0, image.get_pixel(5, 20).0);
}

#[test]
fn solid_red_beauty_brightens_without_adding_variation() {
    let image = RgbImage::from_pixel(100, 100, Rgb([255, 0, 0]));
    let params = BeautyParams {
        smoothing: 0.6,
        whitening: 0.5,
        eye_enhancement: 0.0,
        lip_enhancement: 0.0,
    };
    let outcome = BeautyPipeline::new(&NoFaces).apply(&image, &params).unwrap();
    assert!(outcome.degraded);
    assert_eq!(outcome.image.dimensions(), (100, 100));

    let (mean_in, var_in) = luma_statistics(&image);
    let (mean_out, var_out) = luma_statistics(&outcome.image);
    assert!(mean_out >= mean_in);
    assert!(var_out <= var_in + 1e-9);
}

#[test]
fn processor_reports_fallback_tier_and_degradation() {
    let processor =
        RetouchProcessor::with_components(RetouchConfig::default(), Arc::new(NoFaces), None).unwrap();
    let image = DynamicImage::ImageRgb8(gradient(64, 64));

    let result = processor.process_image(&image, &Operation::RemoveBackground).unwrap();
    assert!(result.metadata.degraded);
    assert_ne!(result.metadata.segmentation_tier, Some(SegmentationTier::Neural));
    assert!(result.image.color().has_alpha());

    let processor = RetouchProcessor::with_components(
        RetouchConfig::default(),
        Arc::new(NoFaces),
        Some(Arc::new(LeftHalf)),
    )
    .unwrap();
    let result = processor
        .process_image(&image, &Operation::ReplaceBackground { color: BackgroundColor::WHITE })
        .unwrap();
    assert!(!result.metadata.degraded);
    assert_eq!(result.metadata.segmentation_tier, Some(SegmentationTier::Neural));
}

#[test]
fn zero_sized_input_is_rejected_for_every_operation() {
    let processor =
        RetouchProcessor::with_components(RetouchConfig::default(), Arc::new(NoFaces), None).unwrap();
    let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
    for op in [
        Operation::Beauty(BeautyParams::default()),
        Operation::RemoveBackground,
        Operation::BlurBackground { radius: 5 },
    ] {
        let err = processor.process_image(&empty, &op).unwrap_err();
        assert!(matches!(err, RetouchError::InvalidInput(_)), "{op}: {err}");
    }
}
