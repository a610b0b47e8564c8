//! Separable Gaussian blur for float images and single planes
//!
//! Kernels follow the OpenCV sizing rules; the convolution itself is
//! `imageproc::filter::separable_filter_equal`, which replicates edge pixels.

use image::{ImageBuffer, Luma, Rgb32FImage};
use imageproc::filter::separable_filter_equal;

/// Sigma implied by a kernel size when none is given
#[must_use]
pub fn sigma_for_kernel(ksize: usize) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Odd kernel size covering about three sigmas on each side
#[must_use]
pub fn kernel_for_sigma(sigma: f32) -> usize {
    let k = (sigma * 6.0 + 1.0).round().max(1.0) as usize;
    k | 1
}

/// Normalized 1-D Gaussian kernel of odd length `ksize`
///
/// A non-positive `sigma` is derived from the kernel size.
#[must_use]
pub fn gaussian_kernel(ksize: usize, sigma: f32) -> Vec<f32> {
    let ksize = ksize.max(1) | 1;
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        sigma_for_kernel(ksize)
    };
    let half = (ksize / 2) as f32;
    let mut kernel: Vec<f32> = (0..ksize)
        .map(|i| {
            let x = i as f32 - half;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }
    kernel
}

/// Blur one row-major plane with a separable Gaussian
#[must_use]
pub fn gaussian_blur_plane(
    plane: &[f32],
    width: usize,
    height: usize,
    ksize: usize,
    sigma: f32,
) -> Vec<f32> {
    if width == 0 || height == 0 {
        return plane.to_vec();
    }
    let Some(buffer) = ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(width as u32, height as u32, plane.to_vec())
    else {
        return plane.to_vec();
    };
    separable_filter_equal(&buffer, &gaussian_kernel(ksize, sigma)).into_raw()
}

/// Gaussian blur of an RGB float image, channel by channel
#[must_use]
pub fn gaussian_blur(image: &Rgb32FImage, ksize: usize, sigma: f32) -> Rgb32FImage {
    if image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    separable_filter_equal(image, &gaussian_kernel(ksize, sigma))
}
