//! ID photo generation: light beauty, 3:4 crop, standard size, flat background

use crate::color::{clamp_triple, hsv_to_rgb, map_pixels, rgb_to_hsv, to_float, to_rgb8};
use crate::compositing::replace_background;
use crate::config::IdPhotoParams;
use crate::error::Result;
use crate::filters::bilateral::bilateral_filter;
use crate::filters::enhance;
use crate::segmentation::SegmentationCascade;
use crate::types::{Region, SegmentationTier};
use crate::utils::{ImageValidator, NumericValidator};
use image::{imageops, Rgb32FImage, RgbImage};
use tracing::{debug, instrument};

/// Generated photo and the segmentation tier used for the background
#[derive(Debug, Clone)]
pub struct IdPhoto {
    pub image: RgbImage,
    pub tier: SegmentationTier,
}

/// Mild smoothing, brightening and sharpening suited to ID photos
#[must_use]
pub fn id_beauty(image: &Rgb32FImage, strength: f32) -> Rgb32FImage {
    let mut work = image.clone();
    if strength > 0.2 {
        let d = ((7.0 * strength) as u32).max(5);
        let sigma = (50.0 * strength).trunc().max(30.0);
        work = bilateral_filter(&work, d, sigma, sigma);
    }
    if strength > 0.1 {
        let lift = (15.0 * strength).trunc();
        work = map_pixels(&work, |p| {
            let [h, s, v] = rgb_to_hsv(clamp_triple(p));
            hsv_to_rgb([h, s, (v + lift).min(255.0)])
        });
    }
    enhance::unsharp_mask(&work, 0.5, 1.0, 2.0)
}

/// 3:4 crop: centred horizontally for input wider than 3:4, biased upwards
/// for taller input
#[must_use]
pub fn portrait_crop(width: u32, height: u32) -> Region {
    if u64::from(width) * 4 > u64::from(height) * 3 {
        let new_width = ((u64::from(height) * 3 / 4) as u32).clamp(1, width);
        Region::new((width - new_width) / 2, 0, new_width, height)
    } else {
        let new_height = (u64::from(width) * 4 / 3) as u32;
        let top = height.saturating_sub(new_height) / 4;
        let bottom = height.min(top.saturating_add(new_height));
        Region::new(0, top, width, bottom - top)
    }
}

/// Final sharpening and tone lift
#[must_use]
pub fn finish(image: &Rgb32FImage) -> Rgb32FImage {
    let sharpened = enhance::unsharp_mask(image, 1.0, 1.2, 3.0);
    let contrasted = enhance::contrast(&sharpened, 1.1);
    enhance::brightness(&contrasted, 1.05)
}

/// Build an ID photo of the requested size on a flat background
#[instrument(skip(image, cascade), fields(width = image.width(), height = image.height(), size = ?params.size))]
pub fn generate_id_photo(
    image: &RgbImage,
    params: &IdPhotoParams,
    cascade: &SegmentationCascade,
) -> Result<IdPhoto> {
    ImageValidator::validate_rgb(image)?;
    let strength = NumericValidator::validate_unit(params.beauty_strength, "beauty strength")?;

    let mut work = if strength > 0.0 {
        to_rgb8(&id_beauty(&to_float(image), strength))
    } else {
        image.clone()
    };

    if params.auto_crop {
        let crop = portrait_crop(work.width(), work.height());
        debug!(crop = %crop, "auto crop");
        work = imageops::crop_imm(&work, crop.x, crop.y, crop.width, crop.height).to_image();
    }

    let (tw, th) = params.size.dimensions();
    let resized = imageops::resize(&work, tw, th, imageops::FilterType::Lanczos3);
    let (composited, tier) = replace_background(&resized, params.background, cascade)?;
    let finished = to_rgb8(&finish(&to_float(&composited)));

    Ok(IdPhoto {
        image: finished,
        tier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{test_helpers::create_portrait, FailingStrategy};
    use crate::config::{BackgroundColor, PhotoSize};
    use crate::segmentation::{GeometricTier, SegmentationStrategy};

    #[test]
    fn test_crop_ratios() {
        assert_eq!(portrait_crop(400, 300), Region::new(87, 0, 225, 300));
        let tall = portrait_crop(300, 600);
        assert_eq!(tall, Region::new(0, 50, 300, 400));
        // Already close to 3:4 keeps the whole frame
        assert_eq!(portrait_crop(300, 400), Region::new(0, 0, 300, 400));
    }

    #[test]
    fn test_square_and_near_square_cropped_to_three_by_four() {
        assert_eq!(portrait_crop(400, 400), Region::new(50, 0, 300, 400));
        // Portrait, but wider than 3:4
        let near = portrait_crop(360, 400);
        assert_eq!(near, Region::new(30, 0, 300, 400));
        for (w, h) in [(400, 400), (360, 400), (301, 400), (500, 300), (200, 600)] {
            let crop = portrait_crop(w, h);
            assert!(Region::full(w, h).contains(&crop), "{crop} outside {w}x{h}");
            let ratio = crop.width as f32 / crop.height as f32;
            assert!((ratio - 0.75).abs() < 0.01, "{w}x{h} -> {crop}");
        }
    }

    #[test]
    fn test_generates_requested_size() {
        let cascade = SegmentationCascade::new(vec![
            Box::new(FailingStrategy(SegmentationTier::Neural)) as Box<dyn SegmentationStrategy>,
            Box::new(GeometricTier),
        ]);
        let (image, _) = create_portrait(200, 260);
        let params = IdPhotoParams {
            size: PhotoSize::Passport,
            background: BackgroundColor::rgb(67, 142, 219),
            ..IdPhotoParams::default()
        };
        let photo = generate_id_photo(&image, &params, &cascade).unwrap();
        assert_eq!(photo.image.dimensions(), (390, 567));
        assert_eq!(photo.tier, SegmentationTier::GeometricFallback);

        // Corner is background: the fill after the final tone lift
        let [r, g, b] = photo.image.get_pixel(0, 0).0;
        assert!(b > r && b > g, "corner {:?}", [r, g, b]);
    }

    #[test]
    fn test_invalid_strength_rejected() {
        let cascade = SegmentationCascade::new(vec![Box::new(GeometricTier)]);
        let params = IdPhotoParams {
            beauty_strength: 1.5,
            ..IdPhotoParams::default()
        };
        assert!(generate_id_photo(&RgbImage::new(30, 40), &params, &cascade).is_err());
    }

    #[test]
    fn test_beauty_brightens() {
        let (image, _) = create_portrait(40, 40);
        let before = crate::color::luma_statistics(&image).0;
        let after = crate::color::luma_statistics(&to_rgb8(&id_beauty(&to_float(&image), 0.8))).0;
        assert!(after > before);
    }
}
