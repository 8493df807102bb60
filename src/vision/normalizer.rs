//! Preprocessing that adapts a stylized batch to the perceptual
//! backbone's expected input statistics.

use crate::autograd::ops::{bilinear_resize, channel_standardize, spatial_minmax_rescale};
use crate::autograd::Tensor;

/// Per-channel mean the perceptual backbone was trained with.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per-channel standard deviation the perceptual backbone was trained with.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Rescales each spatial plane to `[0, 1]`, standardizes channels with
/// fixed statistics, and resizes to the backbone's input resolution.
///
/// The min-max step is deliberately unguarded: a constant plane has zero
/// range and produces NaN, which then surfaces in the content loss
/// instead of being silently hidden.
#[derive(Debug, Clone)]
pub struct BackboneNormalizer {
    mean: [f32; 3],
    std: [f32; 3],
    size: usize,
}

impl BackboneNormalizer {
    pub fn new() -> Self {
        Self {
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            size: 224,
        }
    }

    pub fn with_stats(mean: [f32; 3], std: [f32; 3], size: usize) -> Self {
        Self { mean, std, size }
    }

    /// Input resolution the backbone expects.
    pub fn input_size(&self) -> usize {
        self.size
    }

    /// Normalize a `(B, 3, H, W)` batch, keeping the gradient path.
    pub fn normalize(&self, batch: &Tensor) -> Tensor {
        let rescaled = spatial_minmax_rescale(batch);
        let standardized = channel_standardize(&rescaled, &self.mean, &self.std);
        bilinear_resize(&standardized, self.size, self.size)
    }
}

impl Default for BackboneNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normalize_shape_and_range() {
        let mut values = Vec::new();
        for i in 0..(2 * 3 * 8 * 8) {
            values.push((i % 17) as f32 / 16.0);
        }
        let batch = Tensor::from_shape_vec(&[2, 3, 8, 8], values, false);
        let norm = BackboneNormalizer::new();
        let out = norm.normalize(&batch);
        assert_eq!(out.shape(), vec![2, 3, 224, 224]);
    }

    #[test]
    fn test_normalize_full_range_channel_hits_standardized_extremes() {
        // One channel spanning [0, 1] exactly: after standardization the
        // minimum maps to -mean/std and the maximum to (1-mean)/std.
        let norm = BackboneNormalizer::with_stats([0.5, 0.5, 0.5], [0.25, 0.25, 0.25], 2);
        let mut values = vec![0.0; 3 * 2 * 2];
        values[0] = 0.0;
        values[1] = 1.0;
        values[2] = 0.25;
        values[3] = 0.75;
        for v in values.iter_mut().skip(4) {
            *v = 0.5;
        }
        let batch = Tensor::from_shape_vec(&[1, 3, 2, 2], values, false);
        let out = norm.normalize(&batch);
        let data = out.data();
        assert_relative_eq!(data[[0, 0, 0, 0]], -2.0, epsilon = 1e-5);
        assert_relative_eq!(data[[0, 0, 0, 1]], 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_constant_plane_propagates_nan() {
        let batch = Tensor::from_shape_vec(&[1, 3, 2, 2], vec![0.5; 12], false);
        let out = BackboneNormalizer::new().normalize(&batch);
        assert!(out.data().iter().all(|v| v.is_nan()));
    }
}
