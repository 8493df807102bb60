//! Dense matrix product for the embedding projection seams

use crate::autograd::{BackwardOp, Tensor};
use ndarray::{Array2, ArrayD, Ix2};
use std::cell::RefCell;
use std::rc::Rc;

type GradCell = Rc<RefCell<Option<ArrayD<f32>>>>;

fn as_2d(t: &Tensor) -> Array2<f32> {
    t.data()
        .clone()
        .into_dimensionality::<Ix2>()
        .expect("matmul operand must be 2-D")
}

/// Multiply `(N, K) × (K, D) -> (N, D)`.
pub fn matmul(a: &Tensor, b: &Tensor) -> Tensor {
    let lhs = as_2d(a);
    let rhs = as_2d(b);
    assert_eq!(
        lhs.ncols(),
        rhs.nrows(),
        "matmul inner dimensions must agree"
    );

    let data = lhs.dot(&rhs).into_dyn();
    let requires_grad = a.requires_grad() || b.requires_grad();
    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(MatmulBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct MatmulBackward {
    a: Tensor,
    b: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for MatmulBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let g = grad
                .clone()
                .into_dimensionality::<Ix2>()
                .expect("matmul result gradient is 2-D");
            if self.a.requires_grad() {
                // ∂L/∂a = g · bᵀ
                let gb = g.dot(&as_2d(&self.b).t());
                self.a.accumulate_grad(gb.into_dyn());
            }
            if self.b.requires_grad() {
                // ∂L/∂b = aᵀ · g
                let ga = as_2d(&self.a).t().dot(&g);
                self.b.accumulate_grad(ga.into_dyn());
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone(), self.b.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{backward, sum};

    #[test]
    fn test_matmul_forward() {
        let a = Tensor::from_shape_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0], false);
        let b = Tensor::from_shape_vec(&[2, 2], vec![1.0, 0.0, 0.0, 1.0], false);
        let c = matmul(&a, &b);
        assert_eq!(c.data().as_slice().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_matmul_gradient_into_lhs_only_when_rhs_frozen() {
        let a = Tensor::from_shape_vec(&[1, 2], vec![1.0, 2.0], true);
        let w = Tensor::from_shape_vec(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], false);
        let loss = sum(&matmul(&a, &w));
        backward(&loss);

        assert!(w.grad().is_none());
        // ∂L/∂a = row sums of w
        let grad = a.grad().unwrap();
        assert_eq!(grad.as_slice().unwrap(), &[6.0, 15.0]);
    }
}
