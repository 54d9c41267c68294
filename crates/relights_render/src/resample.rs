//! Separable resampling and blur
//!
//! Resizing uses the "magic kernel", a quadratic B-spline:
//!
//! ```text
//! k(x) = 0.75 - x²            |x| <= 0.5
//!        0.5 * (|x| - 1.5)²   0.5 < |x| <= 1.5
//!        0                    otherwise
//! ```
//!
//! Upsampling evaluates it at the three source texels around each
//! destination sample, giving weights `0.5(f-0.5)², 0.75-f², 0.5(f+0.5)²`
//! for fractional offset `f`. Downsampling stretches the kernel to a
//! half-width of `1.5 * step` and normalizes the weights. Edges clamp.

use rayon::prelude::*;

use crate::texture::{Texel, Texture2D};

/// Quadratic B-spline kernel
#[inline]
pub fn magic_kernel(x: f32) -> f32 {
    let x = x.abs();
    if x <= 0.5 {
        0.75 - x * x
    } else if x <= 1.5 {
        let t = x - 1.5;
        0.5 * t * t
    } else {
        0.0
    }
}

/// Upsampling weights for source texels at offsets -1, 0, +1
#[inline]
pub fn upsample_weights(f: f32) -> [f32; 3] {
    [
        0.5 * (f - 0.5) * (f - 0.5),
        0.75 - f * f,
        0.5 * (f + 0.5) * (f + 0.5),
    ]
}

#[derive(Clone, Debug)]
struct AxisTaps {
    first: i64,
    weights: Vec<f32>,
}

fn axis_taps(src_len: u32, dst_len: u32) -> Vec<AxisTaps> {
    if src_len == dst_len {
        return (0..dst_len)
            .map(|d| AxisTaps {
                first: d as i64,
                weights: vec![1.0],
            })
            .collect();
    }

    let scale = src_len as f32 / dst_len as f32;
    (0..dst_len)
        .map(|d| {
            let center = (d as f32 + 0.5) * scale - 0.5;
            if scale < 1.0 {
                let nearest = center.round();
                AxisTaps {
                    first: nearest as i64 - 1,
                    weights: upsample_weights(center - nearest).to_vec(),
                }
            } else {
                let radius = 1.5 * scale;
                let first = (center - radius).ceil() as i64;
                let last = (center + radius).floor() as i64;
                let mut weights: Vec<f32> = (first..=last)
                    .map(|s| magic_kernel((s as f32 - center) / scale))
                    .collect();
                let sum: f32 = weights.iter().sum();
                if sum > 0.0 {
                    weights.iter_mut().for_each(|w| *w /= sum);
                }
                AxisTaps { first, weights }
            }
        })
        .collect()
}

/// Resample `src` into `dst` at `dst`'s current dimensions
///
/// `scratch` holds the horizontal pass and is resized as needed.
pub fn resample<T: Texel>(src: &Texture2D<T>, dst: &mut Texture2D<T>, scratch: &mut Texture2D<T>) {
    let (src_w, src_h) = src.dimensions();
    let (dst_w, dst_h) = dst.dimensions();
    if dst_w == 0 || dst_h == 0 {
        return;
    }
    if src_w == 0 || src_h == 0 {
        dst.clear(T::default());
        return;
    }

    let taps_x = axis_taps(src_w, dst_w);
    let taps_y = axis_taps(src_h, dst_h);

    scratch.resize(dst_w, src_h, T::default());
    scratch
        .par_rows_mut()
        .enumerate()
        .for_each(|(y, row)| {
            let line = src.row(y as u32);
            let max = line.len() as i64 - 1;
            for (out, taps) in row.iter_mut().zip(&taps_x) {
                let mut sum = T::default();
                for (k, &w) in taps.weights.iter().enumerate() {
                    let s = (taps.first + k as i64).clamp(0, max) as usize;
                    sum = sum + line[s] * w;
                }
                *out = sum;
            }
        });

    let columns: &Texture2D<T> = scratch;
    dst.par_rows_mut().enumerate().for_each(|(y, row)| {
        let taps = &taps_y[y];
        for (x, out) in row.iter_mut().enumerate() {
            let mut sum = T::default();
            for (k, &w) in taps.weights.iter().enumerate() {
                sum = sum + columns.get_clamped(x as i64, taps.first + k as i64) * w;
            }
            *out = sum;
        }
    });
}

/// Binomial 5-tap weights (1 4 6 4 1) / 16
pub const BLUR_WEIGHTS: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Separable Gaussian blur in place, ping-ponging through `scratch`
pub fn gaussian_blur<T: Texel>(tex: &mut Texture2D<T>, scratch: &mut Texture2D<T>) {
    let (w, h) = tex.dimensions();
    if w == 0 || h == 0 {
        return;
    }

    scratch.resize(w, h, T::default());
    {
        let src: &Texture2D<T> = tex;
        scratch.par_rows_mut().enumerate().for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let mut sum = T::default();
                for (k, &weight) in BLUR_WEIGHTS.iter().enumerate() {
                    sum = sum + src.get_clamped(x as i64 + k as i64 - 2, y as i64) * weight;
                }
                *out = sum;
            }
        });
    }

    let src: &Texture2D<T> = scratch;
    tex.par_rows_mut().enumerate().for_each(|(y, row)| {
        for (x, out) in row.iter_mut().enumerate() {
            let mut sum = T::default();
            for (k, &weight) in BLUR_WEIGHTS.iter().enumerate() {
                sum = sum + src.get_clamped(x as i64, y as i64 + k as i64 - 2) * weight;
            }
            *out = sum;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use relights_math::Vec3;

    #[test]
    fn test_kernel_partition_of_unity() {
        for i in 0..=10 {
            let f = -0.5 + i as f32 * 0.1;
            let sum: f32 = upsample_weights(f).iter().sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_kernel_matches_weights() {
        let f = 0.2;
        let w = upsample_weights(f);
        assert_relative_eq!(w[0], magic_kernel(-1.0 - f));
        assert_relative_eq!(w[1], magic_kernel(-f));
        assert_relative_eq!(w[2], magic_kernel(1.0 - f));
        assert_eq!(magic_kernel(1.6), 0.0);
    }

    #[test]
    fn test_constant_preserved_up_and_down() {
        let src = Texture2D::filled(7, 5, Vec3::splat(0.25));
        let mut scratch = Texture2D::default();

        let mut up = Texture2D::new(20, 13);
        resample(&src, &mut up, &mut scratch);
        for v in up.data() {
            assert_relative_eq!(v.x, 0.25, epsilon = 1e-5);
        }

        let mut down = Texture2D::new(3, 2);
        resample(&src, &mut down, &mut scratch);
        for v in down.data() {
            assert_relative_eq!(v.z, 0.25, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_same_size_is_copy() {
        let src = Texture2D::from_fn(4, 4, |x, y| (x * 3 + y) as f32);
        let mut dst = Texture2D::new(4, 4);
        let mut scratch = Texture2D::default();
        resample(&src, &mut dst, &mut scratch);
        assert_eq!(dst, src);
    }

    #[test]
    fn test_upsample_is_smooth() {
        // Single bright texel spreads into a smooth bump
        let mut src = Texture2D::<f32>::new(4, 1);
        src.set(1, 0, 1.0);
        let mut dst = Texture2D::new(8, 1);
        let mut scratch = Texture2D::default();
        resample(&src, &mut dst, &mut scratch);

        let peak = dst.data().iter().cloned().fold(0.0, f32::max);
        assert!(peak < 1.0);
        assert!(dst.get(7, 0).unwrap() < 1e-6);
    }

    #[test]
    fn test_blur_preserves_energy_away_from_edges() {
        let mut tex = Texture2D::<f32>::new(9, 9);
        tex.set(4, 4, 1.0);
        let mut scratch = Texture2D::default();
        gaussian_blur(&mut tex, &mut scratch);

        let total: f32 = tex.data().iter().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-5);
        assert_relative_eq!(tex.get(4, 4).unwrap(), 36.0 / 256.0, epsilon = 1e-6);
    }
}
