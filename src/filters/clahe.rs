//! Contrast-limited adaptive histogram equalization on one 0-255 plane

use super::reflect101;

const BINS: usize = 256;

/// CLAHE through OpenCV when the `opencv` feature is enabled, falling back
/// to [`clahe`] if that call fails
#[cfg(feature = "opencv")]
#[must_use]
pub fn equalize(plane: &[f32], width: usize, height: usize, clip_limit: f32, tiles: (usize, usize)) -> Vec<f32> {
    crate::backends::opencv::clahe(plane, width, height, clip_limit, tiles).unwrap_or_else(|e| {
        log::warn!("⚠️ OpenCV CLAHE failed, using built-in equalizer: {}", e);
        clahe(plane, width, height, clip_limit, tiles)
    })
}

#[cfg(not(feature = "opencv"))]
#[must_use]
pub fn equalize(plane: &[f32], width: usize, height: usize, clip_limit: f32, tiles: (usize, usize)) -> Vec<f32> {
    clahe(plane, width, height, clip_limit, tiles)
}

/// Equalize `plane` tile by tile with clipped histograms.
///
/// The plane is padded by reflection until it divides evenly into
/// `tiles.0 x tiles.1` tiles. Per-tile lookup tables are interpolated
/// bilinearly between tile centres. Output stays on the 0-255 scale but is
/// not quantized.
#[must_use]
pub fn clahe(plane: &[f32], width: usize, height: usize, clip_limit: f32, tiles: (usize, usize)) -> Vec<f32> {
    if width == 0 || height == 0 {
        return plane.to_vec();
    }
    let tiles_x = tiles.0.max(1);
    let tiles_y = tiles.1.max(1);
    let tile_w = width.div_ceil(tiles_x);
    let tile_h = height.div_ceil(tiles_y);
    let tile_area = tile_w * tile_h;

    let bin_of = |v: f32| -> usize {
        if v.is_nan() {
            0
        } else {
            (v.round().clamp(0.0, 255.0)) as usize
        }
    };

    let clip = if clip_limit > 0.0 {
        ((clip_limit * tile_area as f32 / BINS as f32) as usize).max(1)
    } else {
        usize::MAX
    };
    let lut_scale = 255.0 / tile_area as f32;

    let mut luts = vec![[0.0f32; BINS]; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let mut hist = [0usize; BINS];
            for yy in 0..tile_h {
                let sy = reflect101((ty * tile_h + yy) as i64, height);
                for xx in 0..tile_w {
                    let sx = reflect101((tx * tile_w + xx) as i64, width);
                    hist[bin_of(plane[sy * width + sx])] += 1;
                }
            }

            if clip != usize::MAX {
                let mut excess = 0usize;
                for h in &mut hist {
                    if *h > clip {
                        excess += *h - clip;
                        *h = clip;
                    }
                }
                let batch = excess / BINS;
                let mut residual = excess - batch * BINS;
                for h in &mut hist {
                    *h += batch;
                }
                if residual > 0 {
                    let step = (BINS / residual).max(1);
                    let mut i = 0;
                    while i < BINS && residual > 0 {
                        hist[i] += 1;
                        residual -= 1;
                        i += step;
                    }
                }
            }

            let lut = &mut luts[ty * tiles_x + tx];
            let mut cumulative = 0usize;
            for (bin, count) in hist.iter().enumerate() {
                cumulative += count;
                lut[bin] = (cumulative as f32 * lut_scale).min(255.0);
            }
        }
    }

    let inv_tw = 1.0 / tile_w as f32;
    let inv_th = 1.0 / tile_h as f32;
    let mut out = vec![0.0f32; plane.len()];
    for y in 0..height {
        let gy = y as f32 * inv_th - 0.5;
        let ty1 = gy.floor() as i64;
        let fy = gy - ty1 as f32;
        let ty1c = ty1.clamp(0, tiles_y as i64 - 1) as usize;
        let ty2c = (ty1 + 1).clamp(0, tiles_y as i64 - 1) as usize;

        for x in 0..width {
            let gx = x as f32 * inv_tw - 0.5;
            let tx1 = gx.floor() as i64;
            let fx = gx - tx1 as f32;
            let tx1c = tx1.clamp(0, tiles_x as i64 - 1) as usize;
            let tx2c = (tx1 + 1).clamp(0, tiles_x as i64 - 1) as usize;

            let bin = bin_of(plane[y * width + x]);
            let v11 = luts[ty1c * tiles_x + tx1c][bin];
            let v12 = luts[ty1c * tiles_x + tx2c][bin];
            let v21 = luts[ty2c * tiles_x + tx1c][bin];
            let v22 = luts[ty2c * tiles_x + tx2c][bin];

            // Difference form keeps equal neighbours bit-exact
            let top = v11 + (v12 - v11) * fx;
            let bottom = v21 + (v22 - v21) * fx;
            out[y * width + x] = top + (bottom - top) * fy;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_plane_stays_uniform() {
        let plane = vec![136.0f32; 100 * 100];
        let out = clahe(&plane, 100, 100, 3.0, (8, 8));
        let first = out[0];
        assert!(out.iter().all(|v| *v == first));
        assert!(first >= 136.0);
    }

    #[test]
    fn test_stretches_low_contrast() {
        let plane: Vec<f32> = (0..64 * 64).map(|i| 100.0 + ((i % 64) / 8) as f32).collect();
        let out = clahe(&plane, 64, 64, 40.0, (2, 2));
        let (min_in, max_in) = (100.0, 107.0);
        let min_out = out.iter().copied().fold(f32::MAX, f32::min);
        let max_out = out.iter().copied().fold(f32::MIN, f32::max);
        assert!(max_out - min_out > max_in - min_in);
    }

    #[test]
    fn test_output_in_range() {
        let plane: Vec<f32> = (0..50 * 30).map(|i| ((i * 37) % 256) as f32).collect();
        let out = clahe(&plane, 50, 30, 2.0, (8, 8));
        assert!(out.iter().all(|v| (0.0..=255.0).contains(v)));
    }
}
