//! Basic autograd operations: arithmetic, reshape, threshold, batch slicing

use crate::autograd::{BackwardOp, Tensor};
use ndarray::{ArrayD, IxDyn};
use std::cell::RefCell;
use std::rc::Rc;

type GradCell = Rc<RefCell<Option<ArrayD<f32>>>>;

/// Add two tensors elementwise.
pub fn add(a: &Tensor, b: &Tensor) -> Tensor {
    assert_eq!(a.shape(), b.shape(), "add requires matching shapes");
    let data = &*a.data() + &*b.data();
    let requires_grad = a.requires_grad() || b.requires_grad();
    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(AddBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct AddBackward {
    a: Tensor,
    b: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for AddBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad.clone());
            }
            if self.b.requires_grad() {
                self.b.accumulate_grad(grad.clone());
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone(), self.b.clone()]
    }
}

/// Subtract `b` from `a` elementwise.
pub fn sub(a: &Tensor, b: &Tensor) -> Tensor {
    assert_eq!(a.shape(), b.shape(), "sub requires matching shapes");
    let data = &*a.data() - &*b.data();
    let requires_grad = a.requires_grad() || b.requires_grad();
    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(SubBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct SubBackward {
    a: Tensor,
    b: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for SubBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad.clone());
            }
            if self.b.requires_grad() {
                self.b.accumulate_grad(grad.mapv(|g| -g));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone(), self.b.clone()]
    }
}

/// Multiply two tensors elementwise.
pub fn mul(a: &Tensor, b: &Tensor) -> Tensor {
    assert_eq!(a.shape(), b.shape(), "mul requires matching shapes");
    let data = &*a.data() * &*b.data();
    let requires_grad = a.requires_grad() || b.requires_grad();
    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(MulBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct MulBackward {
    a: Tensor,
    b: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for MulBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad * &*self.b.data());
            }
            if self.b.requires_grad() {
                self.b.accumulate_grad(grad * &*self.a.data());
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone(), self.b.clone()]
    }
}

/// Scale a tensor by a constant factor.
pub fn scale(a: &Tensor, factor: f32) -> Tensor {
    let data = &*a.data() * factor;
    let requires_grad = a.requires_grad();
    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(ScaleBackward {
            a: a.clone(),
            factor,
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct ScaleBackward {
    a: Tensor,
    factor: f32,
    result_grad: GradCell,
}

impl BackwardOp for ScaleBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad * self.factor);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}

/// Add a constant to every element.
pub fn add_scalar(a: &Tensor, value: f32) -> Tensor {
    let data = &*a.data() + value;
    let requires_grad = a.requires_grad();
    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(AddScalarBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct AddScalarBackward {
    a: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for AddScalarBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad.clone());
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}

/// Sum all elements into a scalar tensor of shape `[1]`.
pub fn sum(a: &Tensor) -> Tensor {
    let total = a.data().sum();
    let data = ArrayD::from_shape_vec(IxDyn(&[1]), vec![total]).expect("scalar shape");
    let requires_grad = a.requires_grad();
    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(SumBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct SumBackward {
    a: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for SumBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let g = grad[[0]];
                let shape = self.a.data().raw_dim();
                self.a.accumulate_grad(ArrayD::from_elem(shape, g));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}

/// View the same elements under a new shape.
pub fn reshape(a: &Tensor, shape: &[usize]) -> Tensor {
    let count: usize = shape.iter().product();
    assert_eq!(a.len(), count, "reshape must preserve the element count");
    let data = a
        .data()
        .clone()
        .into_shape_with_order(IxDyn(shape))
        .expect("element count checked above");
    let requires_grad = a.requires_grad();
    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(ReshapeBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct ReshapeBackward {
    a: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for ReshapeBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let shape = self.a.data().raw_dim();
                let back = grad
                    .clone()
                    .into_shape_with_order(shape)
                    .expect("gradient matches result element count");
                self.a.accumulate_grad(back);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}

/// Zero every element strictly below `thresh`, keep the rest.
///
/// Gradient is masked on the zeroed elements, so clamped contributions
/// are rejected from the backward pass as well. NaN compares false and
/// therefore passes through untouched.
pub fn threshold_zero(a: &Tensor, thresh: f32) -> Tensor {
    let data = a.data().mapv(|v| if v < thresh { 0.0 } else { v });
    let mask = a.data().mapv(|v| if v < thresh { 0.0 } else { 1.0 });
    let requires_grad = a.requires_grad();
    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(ThresholdBackward {
            a: a.clone(),
            mask,
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct ThresholdBackward {
    a: Tensor,
    mask: ArrayD<f32>,
    result_grad: GradCell,
}

impl BackwardOp for ThresholdBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad * &self.mask);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}

/// Select image `index` from a batch tensor, dropping the batch axis.
pub fn batch_item(batch: &Tensor, index: usize) -> Tensor {
    let shape = batch.shape();
    assert!(!shape.is_empty() && index < shape[0], "batch index out of range");
    let data = batch.data().index_axis(ndarray::Axis(0), index).to_owned();
    let requires_grad = batch.requires_grad();
    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(BatchItemBackward {
            batch: batch.clone(),
            index,
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct BatchItemBackward {
    batch: Tensor,
    index: usize,
    result_grad: GradCell,
}

impl BackwardOp for BatchItemBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.batch.requires_grad() {
                let mut back = ArrayD::zeros(self.batch.data().raw_dim());
                back.index_axis_mut(ndarray::Axis(0), self.index).assign(grad);
                self.batch.accumulate_grad(back);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.batch.clone()]
    }
}
