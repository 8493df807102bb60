//! Tape-based autograd engine over shaped tensors
//!
//! Reverse-mode differentiation with an explicit backward driver. Each
//! operation records a [`BackwardOp`] holding its input tensors and the
//! cached values its vector-Jacobian product needs. [`backward`] walks
//! the recorded graph once in reverse topological order, so a tensor
//! consumed by several branches (the stylized batch feeds four loss
//! terms) accumulates gradients exactly once per consumer.

mod backward;
pub mod ops;
mod tensor;

pub use backward::BackwardOp;
pub use ops::*;
pub use tensor::Tensor;

use ndarray::ArrayD;
use std::collections::HashSet;
use std::rc::Rc;

/// Compute gradients of `loss` with respect to every tensor in its graph
/// that requires them.
///
/// Seeds the loss gradient with ones (the loss is a scalar in practice),
/// orders the recorded ops so every op runs after all consumers of its
/// result, and applies each op's local vector-Jacobian product once.
pub fn backward(loss: &Tensor) {
    let seed = ArrayD::ones(loss.data().raw_dim());
    loss.set_grad(seed);

    let mut visited = HashSet::new();
    let mut order: Vec<Rc<dyn BackwardOp>> = Vec::new();
    visit(loss, &mut visited, &mut order);

    // Post-order puts producers before consumers; reversed, every op sees
    // its result gradient fully accumulated before it runs.
    for op in order.iter().rev() {
        op.backward();
    }
}

fn visit(tensor: &Tensor, visited: &mut HashSet<usize>, order: &mut Vec<Rc<dyn BackwardOp>>) {
    if !visited.insert(tensor.id()) {
        return;
    }
    if let Some(op) = tensor.backward_op() {
        for input in op.inputs() {
            visit(&input, visited, order);
        }
        order.push(op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backward_through_chain() {
        let x = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
        let y = scale(&x, 2.0);
        let loss = sum(&y);

        backward(&loss);

        let grad = x.grad().expect("gradient set");
        assert_eq!(grad.as_slice().unwrap(), &[2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_backward_diamond_accumulates_once_per_branch() {
        // x feeds two branches; d(2x + 3x)/dx = 5 exactly, not more.
        let x = Tensor::from_vec(vec![1.0, 1.0], true);
        let a = scale(&x, 2.0);
        let b = scale(&x, 3.0);
        let loss = sum(&add(&a, &b));

        backward(&loss);

        let grad = x.grad().expect("gradient set");
        assert_eq!(grad.as_slice().unwrap(), &[5.0, 5.0]);
    }

    #[test]
    fn test_backward_skips_frozen_inputs() {
        let x = Tensor::from_vec(vec![1.0, 2.0], true);
        let frozen = Tensor::from_vec(vec![4.0, 5.0], false);
        let loss = sum(&mul(&x, &frozen));

        backward(&loss);

        assert!(frozen.grad().is_none());
        let grad = x.grad().expect("gradient set");
        assert_eq!(grad.as_slice().unwrap(), &[4.0, 5.0]);
    }
}
