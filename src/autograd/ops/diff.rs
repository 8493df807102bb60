//! Neighbor finite differences for the total-variation loss

use crate::autograd::{BackwardOp, Tensor};
use ndarray::{Array3, ArrayD, Ix3};
use std::cell::RefCell;
use std::rc::Rc;

type GradCell = Rc<RefCell<Option<ArrayD<f32>>>>;

/// Difference of two shifted views of a `(C, H, W)` image:
/// `out[c, y, x] = in[c, y + a.0, x + a.1] - in[c, y + b.0, x + b.1]`
/// over the region where both offsets stay in bounds.
///
/// The four variation-loss maps are:
/// horizontal `(0,0)-(0,1)`, vertical `(0,0)-(1,0)`,
/// anti-diagonal `(1,0)-(0,1)`, diagonal `(0,0)-(1,1)`.
pub fn offset_diff(image: &Tensor, a: (usize, usize), b: (usize, usize)) -> Tensor {
    let shape = image.shape();
    assert_eq!(shape.len(), 3, "offset_diff expects a (C, H, W) image");
    let (c, h, w) = (shape[0], shape[1], shape[2]);
    let out_h = h - a.0.max(b.0);
    let out_w = w - a.1.max(b.1);

    let data = image.data();
    let img = data
        .view()
        .into_dimensionality::<Ix3>()
        .expect("checked 3-D above");
    let mut out = Array3::<f32>::zeros((c, out_h, out_w));
    for ch in 0..c {
        for y in 0..out_h {
            for x in 0..out_w {
                out[[ch, y, x]] =
                    img[[ch, y + a.0, x + a.1]] - img[[ch, y + b.0, x + b.1]];
            }
        }
    }
    drop(data);

    let requires_grad = image.requires_grad();
    let result = Tensor::new(out.into_dyn(), requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(OffsetDiffBackward {
            image: image.clone(),
            a,
            b,
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct OffsetDiffBackward {
    image: Tensor,
    a: (usize, usize),
    b: (usize, usize),
    result_grad: GradCell,
}

impl BackwardOp for OffsetDiffBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.image.requires_grad() {
                let g = grad
                    .view()
                    .into_dimensionality::<Ix3>()
                    .expect("offset_diff result gradient is 3-D");
                let mut back = ArrayD::zeros(self.image.data().raw_dim());
                let (c, out_h, out_w) = g.dim();
                for ch in 0..c {
                    for y in 0..out_h {
                        for x in 0..out_w {
                            let gv = g[[ch, y, x]];
                            back[[ch, y + self.a.0, x + self.a.1]] += gv;
                            back[[ch, y + self.b.0, x + self.b.1]] -= gv;
                        }
                    }
                }
                self.image.accumulate_grad(back);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.image.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_horizontal_diff() {
        let img = Tensor::from_shape_vec(&[1, 1, 3], vec![1.0, 3.0, 6.0], false);
        let d = offset_diff(&img, (0, 0), (0, 1));
        assert_eq!(d.shape(), vec![1, 1, 2]);
        assert_eq!(d.data().as_slice().unwrap(), &[-2.0, -3.0]);
    }

    #[test]
    fn test_diagonal_diff_shapes() {
        let img = Tensor::zeros(&[3, 5, 4], false);
        assert_eq!(offset_diff(&img, (1, 0), (0, 1)).shape(), vec![3, 4, 3]);
        assert_eq!(offset_diff(&img, (0, 0), (1, 1)).shape(), vec![3, 4, 3]);
    }

    #[test]
    fn test_constant_image_diffs_are_zero() {
        let img = Tensor::new(ndarray::ArrayD::from_elem(ndarray::IxDyn(&[2, 4, 4]), 0.5), false);
        for (a, b) in [((0, 0), (0, 1)), ((0, 0), (1, 0)), ((1, 0), (0, 1)), ((0, 0), (1, 1))] {
            let d = offset_diff(&img, a, b);
            assert!(d.data().iter().all(|&v| v == 0.0));
        }
    }
}
