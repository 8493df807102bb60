//! Shaped tensor with a shared gradient cell

use super::BackwardOp;
use ndarray::{ArrayD, IxDyn};
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

struct TensorInner {
    data: RefCell<ArrayD<f32>>,
    grad: Rc<RefCell<Option<ArrayD<f32>>>>,
    requires_grad: bool,
    backward_op: RefCell<Option<Rc<dyn BackwardOp>>>,
}

/// A shaped f32 tensor participating in the gradient tape.
///
/// Cloning is shallow: clones share storage, the gradient cell, and the
/// recorded backward op, so a parameter handle held by the optimizer and
/// the same parameter inside the network observe each other's updates.
#[derive(Clone)]
pub struct Tensor {
    inner: Rc<TensorInner>,
}

impl Tensor {
    /// Create a tensor from an ndarray value.
    pub fn new(data: ArrayD<f32>, requires_grad: bool) -> Self {
        Self {
            inner: Rc::new(TensorInner {
                data: RefCell::new(data),
                grad: Rc::new(RefCell::new(None)),
                requires_grad,
                backward_op: RefCell::new(None),
            }),
        }
    }

    /// Create a 1-D tensor from a vector.
    pub fn from_vec(values: Vec<f32>, requires_grad: bool) -> Self {
        let len = values.len();
        Self::new(
            ArrayD::from_shape_vec(IxDyn(&[len]), values).expect("shape matches length"),
            requires_grad,
        )
    }

    /// Create a tensor of the given shape from a flat vector.
    ///
    /// Panics if the element count does not match the shape; mismatched
    /// shapes are configuration errors, not recoverable conditions.
    pub fn from_shape_vec(shape: &[usize], values: Vec<f32>, requires_grad: bool) -> Self {
        let data = ArrayD::from_shape_vec(IxDyn(shape), values)
            .expect("element count must match the requested shape");
        Self::new(data, requires_grad)
    }

    /// Create a zero-filled tensor of the given shape.
    pub fn zeros(shape: &[usize], requires_grad: bool) -> Self {
        Self::new(ArrayD::zeros(IxDyn(shape)), requires_grad)
    }

    /// Borrow the tensor data.
    pub fn data(&self) -> Ref<'_, ArrayD<f32>> {
        self.inner.data.borrow()
    }

    /// Mutably borrow the tensor data.
    pub fn data_mut(&self) -> RefMut<'_, ArrayD<f32>> {
        self.inner.data.borrow_mut()
    }

    /// Extract the single element of a scalar tensor.
    pub fn item(&self) -> f32 {
        let data = self.data();
        assert_eq!(data.len(), 1, "item() requires a scalar tensor");
        data.iter().copied().next().expect("scalar tensor has one element")
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// Whether the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shape as an owned vector.
    pub fn shape(&self) -> Vec<usize> {
        self.data().shape().to_vec()
    }

    /// Whether gradients are requested for this tensor.
    pub fn requires_grad(&self) -> bool {
        self.inner.requires_grad
    }

    /// Current gradient, if any.
    pub fn grad(&self) -> Option<ArrayD<f32>> {
        self.inner.grad.borrow().clone()
    }

    /// Shared handle to the gradient cell, for backward ops.
    pub fn grad_cell(&self) -> Rc<RefCell<Option<ArrayD<f32>>>> {
        Rc::clone(&self.inner.grad)
    }

    /// Replace the gradient.
    pub fn set_grad(&self, grad: ArrayD<f32>) {
        *self.inner.grad.borrow_mut() = Some(grad);
    }

    /// Add into the gradient, initializing it on first accumulation.
    pub fn accumulate_grad(&self, grad: ArrayD<f32>) {
        let mut cell = self.inner.grad.borrow_mut();
        match cell.as_mut() {
            Some(existing) => *existing += &grad,
            None => *cell = Some(grad),
        }
    }

    /// Clear the gradient.
    pub fn zero_grad(&self) {
        *self.inner.grad.borrow_mut() = None;
    }

    /// Record the op that produced this tensor.
    pub fn set_backward_op(&self, op: Rc<dyn BackwardOp>) {
        *self.inner.backward_op.borrow_mut() = Some(op);
    }

    /// The op that produced this tensor, if it requires gradients.
    pub fn backward_op(&self) -> Option<Rc<dyn BackwardOp>> {
        self.inner.backward_op.borrow().clone()
    }

    /// Stable identity for graph traversal.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_clone_shares_storage() {
        let a = Tensor::from_vec(vec![1.0, 2.0], true);
        let b = a.clone();
        b.data_mut()[[0]] = 9.0;
        assert_eq!(a.data()[[0]], 9.0);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_accumulate_grad() {
        let t = Tensor::from_vec(vec![0.0, 0.0], true);
        t.accumulate_grad(arr1(&[1.0_f32, 2.0]).into_dyn());
        t.accumulate_grad(arr1(&[0.5_f32, 0.5]).into_dyn());
        let grad = t.grad().unwrap();
        assert_eq!(grad.as_slice().unwrap(), &[1.5, 2.5]);

        t.zero_grad();
        assert!(t.grad().is_none());
    }

    #[test]
    fn test_shaped_construction() {
        let t = Tensor::from_shape_vec(&[2, 3], vec![0.0; 6], false);
        assert_eq!(t.shape(), vec![2, 3]);
        assert_eq!(t.len(), 6);
        assert!(!t.requires_grad());
    }

    #[test]
    fn test_item() {
        let t = Tensor::from_vec(vec![4.25], false);
        assert_eq!(t.item(), 4.25);
    }

    #[test]
    #[should_panic(expected = "scalar tensor")]
    fn test_item_rejects_non_scalar() {
        Tensor::from_vec(vec![1.0, 2.0], false).item();
    }
}
