//! Low-level raster kernels shared by the pipeline stages
//!
//! Kernels read a buffer and return a new one, so a uniform input always
//! yields a uniform output. Gaussian convolution and morphology delegate to
//! `imageproc` and replicate the edge pixel; the bilateral filter and CLAHE
//! reflect without repeating it.

pub mod bilateral;
pub mod clahe;
pub mod edge_preserving;
pub mod enhance;
pub mod gaussian;
pub mod morphology;

pub use bilateral::bilateral_filter;
pub use clahe::clahe;
pub use edge_preserving::edge_preserving_filter;
pub use gaussian::{gaussian_blur, gaussian_blur_plane, gaussian_kernel};

/// Mirror an out-of-range index back into `0..n` without repeating the edge
/// (`gfedcb|abcdefgh|gfedcba`).
#[inline]
#[must_use]
pub fn reflect101(i: i64, n: usize) -> usize {
    let n = n as i64;
    if n <= 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    i as usize
}
