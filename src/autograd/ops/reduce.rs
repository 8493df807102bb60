//! Reduction operations: row sums, contiguous group sums, Frobenius norm

use crate::autograd::{BackwardOp, Tensor};
use ndarray::{Array1, Array2, ArrayD, Ix2, IxDyn};
use std::cell::RefCell;
use std::rc::Rc;

type GradCell = Rc<RefCell<Option<ArrayD<f32>>>>;

/// Sum each row of an `(N, D)` tensor into an `(N,)` tensor.
pub fn row_sum(a: &Tensor) -> Tensor {
    let shape = a.shape();
    assert_eq!(shape.len(), 2, "row_sum expects a 2-D tensor");
    let data = a.data();
    let m = data
        .view()
        .into_dimensionality::<Ix2>()
        .expect("checked 2-D above");
    let sums: Array1<f32> = m.rows().into_iter().map(|r| r.sum()).collect();
    drop(data);

    let requires_grad = a.requires_grad();
    let result = Tensor::new(sums.into_dyn(), requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(RowSumBackward {
            a: a.clone(),
            cols: shape[1],
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct RowSumBackward {
    a: Tensor,
    cols: usize,
    result_grad: GradCell,
}

impl BackwardOp for RowSumBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let rows = grad.len();
                let mut back = Array2::<f32>::zeros((rows, self.cols));
                for (i, mut row) in back.rows_mut().into_iter().enumerate() {
                    row.fill(grad[[i]]);
                }
                self.a.accumulate_grad(back.into_dyn());
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}

/// Sum contiguous blocks of `group` rows: `(N, D) -> (N / group, D)`.
///
/// The patch branch relies on this being a plain sum (not a mean): crop
/// embeddings of one source image are added before the direction is
/// formed.
pub fn group_sum(a: &Tensor, group: usize) -> Tensor {
    let shape = a.shape();
    assert_eq!(shape.len(), 2, "group_sum expects a 2-D tensor");
    assert!(group > 0 && shape[0] % group == 0, "rows must divide evenly into groups");

    let data = a.data();
    let m = data
        .view()
        .into_dimensionality::<Ix2>()
        .expect("checked 2-D above");
    let out_rows = shape[0] / group;
    let mut out = Array2::<f32>::zeros((out_rows, shape[1]));
    for (i, row) in m.rows().into_iter().enumerate() {
        let mut target = out.row_mut(i / group);
        target += &row;
    }
    drop(data);

    let requires_grad = a.requires_grad();
    let result = Tensor::new(out.into_dyn(), requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(GroupSumBackward {
            a: a.clone(),
            group,
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct GroupSumBackward {
    a: Tensor,
    group: usize,
    result_grad: GradCell,
}

impl BackwardOp for GroupSumBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let g = grad
                    .view()
                    .into_dimensionality::<Ix2>()
                    .expect("group_sum result gradient is 2-D");
                let rows = g.nrows() * self.group;
                let mut back = Array2::<f32>::zeros((rows, g.ncols()));
                for (i, mut row) in back.rows_mut().into_iter().enumerate() {
                    row.assign(&g.row(i / self.group));
                }
                self.a.accumulate_grad(back.into_dyn());
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}

/// L2 norm over all elements, as a scalar tensor.
///
/// Backward is `g · x / ‖x‖`, unguarded: the norm of an all-zero tensor
/// is 0 and its gradient is NaN.
pub fn frobenius_norm(a: &Tensor) -> Tensor {
    let norm = a.data().mapv(|v| v * v).sum().sqrt();
    let data = ArrayD::from_shape_vec(IxDyn(&[1]), vec![norm]).expect("scalar shape");
    let requires_grad = a.requires_grad();
    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(FrobeniusBackward {
            a: a.clone(),
            norm,
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct FrobeniusBackward {
    a: Tensor,
    norm: f32,
    result_grad: GradCell,
}

impl BackwardOp for FrobeniusBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let g = grad[[0]];
                let back = self.a.data().mapv(|v| g * v / self.norm);
                self.a.accumulate_grad(back);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}
