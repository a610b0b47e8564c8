//! Grey-scale morphology on 8-bit planes and RGB images
//!
//! Thin layer over `imageproc::morphology`: structuring elements are turned
//! into footprints and colour images are processed one channel at a time.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::morphology::{grayscale_close, Mask as Footprint};

/// Neighbourhood used by the morphology operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuringElement {
    /// Full `(2r+1) x (2r+1)` square
    Square(u8),
    /// Plus-shaped element with arms of length `r`
    Cross(u8),
}

impl StructuringElement {
    #[must_use]
    pub fn footprint(self) -> Footprint {
        match self {
            Self::Square(r) => Footprint::square(r),
            Self::Cross(r) => {
                let side = 2 * u32::from(r) + 1;
                let centre = u32::from(r);
                let plus = GrayImage::from_fn(side, side, |x, y| {
                    Luma([if x == centre || y == centre { 255 } else { 0 }])
                });
                Footprint::from_image(&plus, r, r)
            }
        }
    }
}

/// Dilation followed by erosion; fills gaps narrower than the element
#[must_use]
pub fn close_gray(plane: &GrayImage, element: StructuringElement) -> GrayImage {
    grayscale_close(plane, &element.footprint())
}

/// Per-channel closing of an RGB image
#[must_use]
pub fn close_rgb(image: &RgbImage, element: StructuringElement) -> RgbImage {
    let (w, h) = image.dimensions();
    let footprint = element.footprint();
    let channels: Vec<GrayImage> = (0..3)
        .map(|c| {
            let plane = GrayImage::from_fn(w, h, |x, y| Luma([image.get_pixel(x, y).0[c]]));
            grayscale_close(&plane, &footprint)
        })
        .collect();
    RgbImage::from_fn(w, h, |x, y| {
        Rgb([
            channels[0].get_pixel(x, y).0[0],
            channels[1].get_pixel(x, y).0[0],
            channels[2].get_pixel(x, y).0[0],
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_fills_thin_dark_line() {
        // Bright field with a one-pixel dark scratch down column 3
        let plane = GrayImage::from_fn(7, 5, |x, _| Luma([if x == 3 { 0 } else { 200 }]));
        let out = close_gray(&plane, StructuringElement::Square(1));
        assert!(out.pixels().all(|p| p.0[0] == 200));
    }

    #[test]
    fn test_close_keeps_wide_regions() {
        let plane = GrayImage::from_fn(12, 4, |x, _| Luma([if x < 6 { 0 } else { 255 }]));
        let out = close_gray(&plane, StructuringElement::Cross(1));
        assert_eq!(out.get_pixel(2, 0).0[0], 0);
        assert_eq!(out.get_pixel(9, 0).0[0], 255);
    }

    #[test]
    fn test_cross_footprint_is_a_plus() {
        // Isolated dark pixel inside a bright field
        let mut plane = GrayImage::from_pixel(5, 5, Luma([255]));
        plane.put_pixel(2, 2, Luma([0]));
        assert_eq!(close_gray(&plane, StructuringElement::Cross(1)).get_pixel(2, 2).0[0], 255);
        assert_eq!(
            StructuringElement::Cross(1).footprint(),
            Footprint::diamond(1)
        );
        assert_ne!(
            StructuringElement::Cross(2).footprint(),
            Footprint::diamond(2)
        );
    }

    #[test]
    fn test_rgb_close_per_channel() {
        let image = RgbImage::from_fn(9, 9, |x, _| {
            if x == 4 {
                Rgb([10, 200, 10])
            } else {
                Rgb([180, 170, 160])
            }
        });
        let out = close_rgb(&image, StructuringElement::Cross(1));
        // Dark channels are filled, the brighter green stays
        assert_eq!(out.get_pixel(4, 4).0, [180, 200, 160]);
        assert_eq!(out.get_pixel(0, 0).0, [180, 170, 160]);
    }
}
