//! Total-variation regularizer on the raw stylized batch.

use crate::autograd::{add, batch_item, frobenius_norm, offset_diff, Tensor};

const OFFSETS: [((usize, usize), (usize, usize)); 4] = [
    ((0, 0), (0, 1)), // horizontal
    ((0, 0), (1, 0)), // vertical
    ((1, 0), (0, 1)), // anti-diagonal
    ((0, 0), (1, 1)), // diagonal
];

/// Per image, the L2 norms of the four neighbor-difference maps, summed
/// over the batch.
pub fn total_variation_loss(batch: &Tensor) -> Tensor {
    let shape = batch.shape();
    assert_eq!(shape.len(), 4, "variation loss expects a (B, C, H, W) batch");
    assert!(shape[0] > 0, "variation loss needs at least one image");

    let mut total: Option<Tensor> = None;
    for i in 0..shape[0] {
        let image = batch_item(batch, i);
        for (a, b) in OFFSETS {
            let norm = frobenius_norm(&offset_diff(&image, a, b));
            total = Some(match total {
                Some(t) => add(&t, &norm),
                None => norm,
            });
        }
    }
    total.expect("checked non-empty above")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn test_constant_image_has_zero_variation() {
        let batch = Tensor::new(ArrayD::from_elem(IxDyn(&[2, 3, 4, 4]), 0.7), false);
        assert_eq!(total_variation_loss(&batch).item(), 0.0);
    }

    #[test]
    fn test_nonconstant_image_is_strictly_positive() {
        let batch = Tensor::from_shape_vec(
            &[1, 1, 2, 2],
            vec![0.0, 1.0, 0.0, 1.0],
            false,
        );
        assert!(total_variation_loss(&batch).item() > 0.0);
    }

    #[test]
    fn test_single_step_edge_value() {
        // One horizontal step of height 1 in a 1x1x1x2 image: only the
        // horizontal map is non-empty and its norm is 1.
        let batch = Tensor::from_shape_vec(&[1, 1, 1, 2], vec![0.0, 1.0], false);
        assert_relative_eq!(total_variation_loss(&batch).item(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_sums_over_images() {
        let one = Tensor::from_shape_vec(&[1, 1, 2, 2], vec![0.0, 1.0, 0.0, 1.0], false);
        let two = Tensor::from_shape_vec(
            &[2, 1, 2, 2],
            vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0],
            false,
        );
        assert_relative_eq!(
            total_variation_loss(&two).item(),
            2.0 * total_variation_loss(&one).item(),
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_gradient_reaches_the_batch() {
        use crate::autograd::backward;
        let batch = Tensor::from_shape_vec(
            &[1, 1, 2, 2],
            vec![0.0, 1.0, 2.0, 3.0],
            true,
        );
        backward(&total_variation_loss(&batch));
        assert!(batch.grad().is_some());
    }
}
