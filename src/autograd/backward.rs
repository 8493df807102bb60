//! Backward-op trait for the gradient tape

use super::Tensor;

/// One recorded operation of the computational graph.
///
/// `backward` applies the local vector-Jacobian product exactly once:
/// it reads the fully accumulated gradient of the op's result and
/// accumulates into the gradients of its inputs. Traversal order is the
/// driver's job ([`crate::autograd::backward`]); implementations must
/// not recurse into their inputs.
pub trait BackwardOp {
    /// Propagate the result gradient into the input gradients.
    fn backward(&self);

    /// Input tensors this op accumulates gradients into.
    fn inputs(&self) -> Vec<Tensor>;
}
