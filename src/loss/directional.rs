//! Directional loss terms: the cosine complement between an image
//! direction and the text direction.

use crate::autograd::{add_scalar, mul, row_sum, scale, sum, threshold_zero, Tensor};

fn cosine_complement(image_dir: &Tensor, text_dir: &Tensor) -> Tensor {
    assert_eq!(
        image_dir.shape(),
        text_dir.shape(),
        "direction batches must align row for row"
    );
    // Rows are unit length, so the cosine is a plain row dot product.
    let cos = row_sum(&mul(image_dir, text_dir));
    add_scalar(&scale(&cos, -1.0), 1.0)
}

/// Patch loss: per-image cosine complement, values strictly below
/// `thresh` clamped to exactly zero (gradient masked there), mean over
/// the batch. NaN rows pass the clamp untouched.
pub fn patch_loss(patch_dir: &Tensor, text_dir: &Tensor, thresh: f32) -> Tensor {
    let rows = patch_dir.shape()[0];
    let clamped = threshold_zero(&cosine_complement(patch_dir, text_dir), thresh);
    scale(&sum(&clamped), 1.0 / rows as f32)
}

/// Global loss: the same complement without a threshold, mean over the
/// batch.
pub fn global_loss(global_dir: &Tensor, text_dir: &Tensor) -> Tensor {
    let rows = global_dir.shape()[0];
    scale(&sum(&cosine_complement(global_dir, text_dir)), 1.0 / rows as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_aligned_directions_give_zero_global_loss() {
        let dir = Tensor::from_shape_vec(&[2, 2], vec![1.0, 0.0, 0.0, 1.0], false);
        let text = Tensor::from_shape_vec(&[2, 2], vec![1.0, 0.0, 0.0, 1.0], false);
        assert_relative_eq!(global_loss(&dir, &text).item(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_opposed_directions_give_two() {
        let dir = Tensor::from_shape_vec(&[1, 2], vec![1.0, 0.0], false);
        let text = Tensor::from_shape_vec(&[1, 2], vec![-1.0, 0.0], false);
        assert_relative_eq!(global_loss(&dir, &text).item(), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_patch_loss_threshold_is_strict() {
        // Orthogonal rows: complement exactly 1.0.
        let dir = Tensor::from_shape_vec(&[2, 2], vec![1.0, 0.0, 1.0, 0.0], false);
        let text = Tensor::from_shape_vec(&[2, 2], vec![0.0, 1.0, 0.0, 1.0], false);
        // Exactly at the threshold: kept.
        assert_relative_eq!(patch_loss(&dir, &text, 1.0).item(), 1.0, epsilon = 1e-6);
        // Strictly above the values: clamped to zero.
        assert_relative_eq!(patch_loss(&dir, &text, 1.5).item(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_patch_loss_mixes_clamped_and_kept_rows() {
        let dir = Tensor::from_shape_vec(&[2, 2], vec![1.0, 0.0, 0.0, 1.0], false);
        // Row 0 aligned (complement 0, clamped), row 1 opposed (complement 2).
        let text = Tensor::from_shape_vec(&[2, 2], vec![1.0, 0.0, 0.0, -1.0], false);
        assert_relative_eq!(patch_loss(&dir, &text, 0.7).item(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_nan_direction_reaches_the_loss() {
        let dir = Tensor::from_shape_vec(&[1, 2], vec![f32::NAN, f32::NAN], false);
        let text = Tensor::from_shape_vec(&[1, 2], vec![1.0, 0.0], false);
        assert!(patch_loss(&dir, &text, 0.7).item().is_nan());
        assert!(global_loss(&dir, &text).item().is_nan());
    }

    #[test]
    fn test_clamped_rows_mask_gradient() {
        use crate::autograd::backward;
        let dir = Tensor::from_shape_vec(&[1, 2], vec![1.0, 0.0], true);
        let text = Tensor::from_shape_vec(&[1, 2], vec![1.0, 0.0], false);
        // Complement 0 < thresh: the whole loss is clamped.
        backward(&patch_loss(&dir, &text, 0.7));
        let grad = dir.grad().unwrap();
        assert!(grad.iter().all(|&g| g == 0.0));
    }
}
