//! Normalization operations: spatial min-max rescale, channel statistics,
//! row-wise L2 normalization

use crate::autograd::{BackwardOp, Tensor};
use ndarray::{Array2, Array4, ArrayD, Ix2, Ix4};
use std::cell::RefCell;
use std::rc::Rc;

type GradCell = Rc<RefCell<Option<ArrayD<f32>>>>;

/// Rescale each image-channel plane of a `(B, C, H, W)` batch to [0, 1]
/// over its spatial extent: `y = (x - min) / (max - min)`.
///
/// A constant plane divides by zero and floods the plane with NaN; no
/// guard is applied. Backward routes
/// the min/max terms to the arg-extremum elements (subgradient) and the
/// affine term to every element.
pub fn spatial_minmax_rescale(batch: &Tensor) -> Tensor {
    let shape = batch.shape();
    assert_eq!(shape.len(), 4, "spatial_minmax_rescale expects (B, C, H, W)");
    let (b, c) = (shape[0], shape[1]);
    let plane = shape[2] * shape[3];

    let data = batch.data();
    let x = data
        .view()
        .into_dimensionality::<Ix4>()
        .expect("checked 4-D above");

    let mut out = Array4::<f32>::zeros(x.raw_dim());
    let mut ranges = Vec::with_capacity(b * c);
    let mut argmins = Vec::with_capacity(b * c);
    let mut argmaxs = Vec::with_capacity(b * c);

    for bi in 0..b {
        for ci in 0..c {
            let src = x.index_axis(ndarray::Axis(0), bi);
            let src = src.index_axis(ndarray::Axis(0), ci);
            let mut min = f32::INFINITY;
            let mut max = f32::NEG_INFINITY;
            let mut argmin = 0;
            let mut argmax = 0;
            for (i, &v) in src.iter().enumerate() {
                if v < min {
                    min = v;
                    argmin = i;
                }
                if v > max {
                    max = v;
                    argmax = i;
                }
            }
            let range = max - min;
            for (dst, &v) in out
                .index_axis_mut(ndarray::Axis(0), bi)
                .index_axis_mut(ndarray::Axis(0), ci)
                .iter_mut()
                .zip(src.iter())
            {
                *dst = (v - min) / range;
            }
            ranges.push(range);
            argmins.push(argmin);
            argmaxs.push(argmax);
        }
    }
    drop(data);

    let rescaled = out.clone();
    let requires_grad = batch.requires_grad();
    let result = Tensor::new(out.into_dyn(), requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(MinMaxBackward {
            batch: batch.clone(),
            rescaled,
            ranges,
            argmins,
            argmaxs,
            plane,
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct MinMaxBackward {
    batch: Tensor,
    rescaled: Array4<f32>,
    ranges: Vec<f32>,
    argmins: Vec<usize>,
    argmaxs: Vec<usize>,
    plane: usize,
    result_grad: GradCell,
}

impl BackwardOp for MinMaxBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.batch.requires_grad() {
                let g = grad
                    .view()
                    .into_dimensionality::<Ix4>()
                    .expect("rescale result gradient is 4-D");
                let (b, c, _, _) = g.dim();
                let mut back = Array4::<f32>::zeros(g.raw_dim());

                for bi in 0..b {
                    for ci in 0..c {
                        let idx = bi * c + ci;
                        let range = self.ranges[idx];
                        let gp = g.index_axis(ndarray::Axis(0), bi);
                        let gp = gp.index_axis(ndarray::Axis(0), ci);
                        let yp = self.rescaled.index_axis(ndarray::Axis(0), bi);
                        let yp = yp.index_axis(ndarray::Axis(0), ci);

                        // For y_i = (x_i - m) / M with m = x[argmin], M = x[argmax] - x[argmin]:
                        //   grad_j   = g_j / M
                        //   grad_min -= Σ g_i / M - Σ g_i·y_i / M
                        //   grad_max -= Σ g_i·y_i / M
                        let g_sum: f32 = gp.iter().sum();
                        let gy_sum: f32 = gp.iter().zip(yp.iter()).map(|(&gi, &yi)| gi * yi).sum();

                        let mut bp = back.index_axis_mut(ndarray::Axis(0), bi);
                        let mut bp = bp.index_axis_mut(ndarray::Axis(0), ci);
                        let flat = bp
                            .as_slice_mut()
                            .expect("plane view is contiguous");
                        for (dst, &gi) in flat.iter_mut().zip(gp.iter()) {
                            *dst = gi / range;
                        }
                        flat[self.argmins[idx]] += (gy_sum - g_sum) / range;
                        flat[self.argmaxs[idx]] -= gy_sum / range;
                        debug_assert_eq!(flat.len(), self.plane);
                    }
                }
                self.batch.accumulate_grad(back.into_dyn());
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.batch.clone()]
    }
}

/// Standardize a `(B, C, H, W)` batch with fixed per-channel statistics:
/// `y = (x - mean[c]) / std[c]`.
pub fn channel_standardize(batch: &Tensor, mean: &[f32], std: &[f32]) -> Tensor {
    let shape = batch.shape();
    assert_eq!(shape.len(), 4, "channel_standardize expects (B, C, H, W)");
    assert_eq!(shape[1], mean.len(), "one mean per channel");
    assert_eq!(shape[1], std.len(), "one std per channel");

    let data = batch.data();
    let x = data
        .view()
        .into_dimensionality::<Ix4>()
        .expect("checked 4-D above");
    let mut out = x.to_owned();
    for ci in 0..shape[1] {
        let mut ch = out.index_axis_mut(ndarray::Axis(1), ci);
        ch.mapv_inplace(|v| (v - mean[ci]) / std[ci]);
    }
    drop(data);

    let requires_grad = batch.requires_grad();
    let result = Tensor::new(out.into_dyn(), requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(StandardizeBackward {
            batch: batch.clone(),
            std: std.to_vec(),
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct StandardizeBackward {
    batch: Tensor,
    std: Vec<f32>,
    result_grad: GradCell,
}

impl BackwardOp for StandardizeBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.batch.requires_grad() {
                let g = grad
                    .view()
                    .into_dimensionality::<Ix4>()
                    .expect("standardize result gradient is 4-D");
                let mut back = g.to_owned();
                for (ci, &s) in self.std.iter().enumerate() {
                    let mut ch = back.index_axis_mut(ndarray::Axis(1), ci);
                    ch.mapv_inplace(|v| v / s);
                }
                self.batch.accumulate_grad(back.into_dyn());
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.batch.clone()]
    }
}

/// Learnable per-channel affine over a `(B, C, H, W)` batch:
/// `y = x · gain[c] + bias[c]`, with gradients into all three operands.
pub fn channel_affine(batch: &Tensor, gain: &Tensor, bias: &Tensor) -> Tensor {
    let shape = batch.shape();
    assert_eq!(shape.len(), 4, "channel_affine expects (B, C, H, W)");
    assert_eq!(gain.shape(), vec![shape[1]], "one gain per channel");
    assert_eq!(bias.shape(), vec![shape[1]], "one bias per channel");

    let data = batch.data();
    let x = data
        .view()
        .into_dimensionality::<Ix4>()
        .expect("checked 4-D above");
    let gain_data = gain.data();
    let bias_data = bias.data();
    let mut out = x.to_owned();
    for ci in 0..shape[1] {
        let (g, b) = (gain_data[[ci]], bias_data[[ci]]);
        let mut ch = out.index_axis_mut(ndarray::Axis(1), ci);
        ch.mapv_inplace(|v| v * g + b);
    }
    drop(data);
    drop(gain_data);
    drop(bias_data);

    let requires_grad = batch.requires_grad() || gain.requires_grad() || bias.requires_grad();
    let result = Tensor::new(out.into_dyn(), requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(ChannelAffineBackward {
            batch: batch.clone(),
            gain: gain.clone(),
            bias: bias.clone(),
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct ChannelAffineBackward {
    batch: Tensor,
    gain: Tensor,
    bias: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for ChannelAffineBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let g = grad
                .view()
                .into_dimensionality::<Ix4>()
                .expect("affine result gradient is 4-D");
            let channels = g.dim().1;

            if self.batch.requires_grad() {
                let gain_data = self.gain.data();
                let mut back = g.to_owned();
                for ci in 0..channels {
                    let gv = gain_data[[ci]];
                    let mut ch = back.index_axis_mut(ndarray::Axis(1), ci);
                    ch.mapv_inplace(|v| v * gv);
                }
                drop(gain_data);
                self.batch.accumulate_grad(back.into_dyn());
            }
            if self.gain.requires_grad() {
                let data = self.batch.data();
                let x = data
                    .view()
                    .into_dimensionality::<Ix4>()
                    .expect("affine input is 4-D");
                let mut gg = Vec::with_capacity(channels);
                for ci in 0..channels {
                    let prod: f32 = g
                        .index_axis(ndarray::Axis(1), ci)
                        .iter()
                        .zip(x.index_axis(ndarray::Axis(1), ci).iter())
                        .map(|(&gi, &xi)| gi * xi)
                        .sum();
                    gg.push(prod);
                }
                drop(data);
                self.gain
                    .accumulate_grad(ndarray::Array1::from(gg).into_dyn());
            }
            if self.bias.requires_grad() {
                let mut gb = Vec::with_capacity(channels);
                for ci in 0..channels {
                    gb.push(g.index_axis(ndarray::Axis(1), ci).sum());
                }
                self.bias
                    .accumulate_grad(ndarray::Array1::from(gb).into_dyn());
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.batch.clone(), self.gain.clone(), self.bias.clone()]
    }
}

/// Normalize each row of an `(N, D)` tensor to unit L2 norm.
///
/// No epsilon guard: a zero row divides by zero and yields NaN, so a
/// degenerate direction is visible in the loss instead of hidden.
pub fn l2_normalize_rows(a: &Tensor) -> Tensor {
    let shape = a.shape();
    assert_eq!(shape.len(), 2, "l2_normalize_rows expects (N, D)");

    let data = a.data();
    let x = data
        .view()
        .into_dimensionality::<Ix2>()
        .expect("checked 2-D above");
    let mut out = Array2::<f32>::zeros(x.raw_dim());
    let mut norms = Vec::with_capacity(shape[0]);
    for (i, row) in x.rows().into_iter().enumerate() {
        let norm = row.iter().map(|&v| v * v).sum::<f32>().sqrt();
        let mut dst = out.row_mut(i);
        for (d, &v) in dst.iter_mut().zip(row.iter()) {
            *d = v / norm;
        }
        norms.push(norm);
    }
    drop(data);

    let normalized = out.clone();
    let requires_grad = a.requires_grad();
    let result = Tensor::new(out.into_dyn(), requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(L2NormalizeBackward {
            a: a.clone(),
            normalized,
            norms,
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct L2NormalizeBackward {
    a: Tensor,
    normalized: Array2<f32>,
    norms: Vec<f32>,
    result_grad: GradCell,
}

impl BackwardOp for L2NormalizeBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let g = grad
                    .view()
                    .into_dimensionality::<Ix2>()
                    .expect("normalize result gradient is 2-D");
                let mut back = Array2::<f32>::zeros(g.raw_dim());
                for (i, grow) in g.rows().into_iter().enumerate() {
                    let y = self.normalized.row(i);
                    let dot: f32 = grow.iter().zip(y.iter()).map(|(&gi, &yi)| gi * yi).sum();
                    let mut dst = back.row_mut(i);
                    // ∂L/∂x = (g - y·(g·y)) / ‖x‖
                    for ((d, &gi), &yi) in dst.iter_mut().zip(grow.iter()).zip(y.iter()) {
                        *d = (gi - yi * dot) / self.norms[i];
                    }
                }
                self.a.accumulate_grad(back.into_dyn());
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{backward, mul, sum};
    use approx::assert_relative_eq;
    use ndarray::IxDyn;

    #[test]
    fn test_minmax_rescale_bounds() {
        let x = Tensor::from_shape_vec(&[1, 1, 2, 2], vec![2.0, 4.0, 6.0, 8.0], false);
        let y = spatial_minmax_rescale(&x);
        let data = y.data();
        assert_eq!(data[[0, 0, 0, 0]], 0.0);
        assert_eq!(data[[0, 0, 1, 1]], 1.0);
        assert_relative_eq!(data[[0, 0, 0, 1]], 1.0 / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_minmax_rescale_constant_plane_is_nan() {
        let x = Tensor::new(ArrayD::from_elem(IxDyn(&[1, 1, 2, 2]), 3.0), false);
        let y = spatial_minmax_rescale(&x);
        assert!(y.data().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_minmax_rescale_gradient_matches_finite_difference() {
        let values = vec![0.3, 0.9, 0.1, 0.7, 0.5, 0.2];
        let x = Tensor::from_shape_vec(&[1, 1, 2, 3], values.clone(), true);
        // Weighted sum so the gradient is not uniform.
        let w = Tensor::from_shape_vec(&[1, 1, 2, 3], vec![1.0, -2.0, 0.5, 3.0, 1.5, -1.0], false);
        let loss = sum(&mul(&spatial_minmax_rescale(&x), &w));
        backward(&loss);
        let grad = x.grad().unwrap();

        let f = |vals: &[f32]| -> f32 {
            let t = Tensor::from_shape_vec(&[1, 1, 2, 3], vals.to_vec(), false);
            let wt = Tensor::from_shape_vec(
                &[1, 1, 2, 3],
                vec![1.0, -2.0, 0.5, 3.0, 1.5, -1.0],
                false,
            );
            sum(&mul(&spatial_minmax_rescale(&t), &wt)).item()
        };
        let h = 1e-3;
        for i in 0..values.len() {
            let mut plus = values.clone();
            let mut minus = values.clone();
            plus[i] += h;
            minus[i] -= h;
            let numeric = (f(&plus) - f(&minus)) / (2.0 * h);
            let analytic = grad.as_slice().unwrap()[i];
            assert_relative_eq!(analytic, numeric, epsilon = 2e-2, max_relative = 2e-2);
        }
    }

    #[test]
    fn test_channel_standardize() {
        let x = Tensor::from_shape_vec(&[1, 2, 1, 1], vec![1.0, 2.0], true);
        let y = channel_standardize(&x, &[0.5, 1.0], &[0.5, 2.0]);
        assert_eq!(y.data().as_slice().unwrap(), &[1.0, 0.5]);

        backward(&sum(&y));
        assert_eq!(x.grad().unwrap().as_slice().unwrap(), &[2.0, 0.5]);
    }

    #[test]
    fn test_channel_affine_gradients() {
        let x = Tensor::from_shape_vec(&[1, 1, 1, 2], vec![2.0, 3.0], true);
        let gain = Tensor::from_vec(vec![4.0], true);
        let bias = Tensor::from_vec(vec![0.5], true);
        let y = channel_affine(&x, &gain, &bias);
        assert_eq!(y.data().as_slice().unwrap(), &[8.5, 12.5]);

        backward(&sum(&y));
        assert_eq!(x.grad().unwrap().as_slice().unwrap(), &[4.0, 4.0]);
        assert_eq!(gain.grad().unwrap().as_slice().unwrap(), &[5.0]);
        assert_eq!(bias.grad().unwrap().as_slice().unwrap(), &[2.0]);
    }

    #[test]
    fn test_l2_normalize_rows_unit_norm() {
        let x = Tensor::from_shape_vec(&[2, 3], vec![3.0, 4.0, 0.0, 1.0, 1.0, 1.0], false);
        let y = l2_normalize_rows(&x);
        let data = y.data();
        for i in 0..2 {
            let norm: f32 = (0..3).map(|j| data[[i, j]] * data[[i, j]]).sum::<f32>().sqrt();
            assert_relative_eq!(norm, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_l2_normalize_zero_row_is_nan() {
        let x = Tensor::from_shape_vec(&[1, 2], vec![0.0, 0.0], false);
        let y = l2_normalize_rows(&x);
        assert!(y.data().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_l2_normalize_gradient_matches_finite_difference() {
        let values = vec![0.6, -0.8, 0.3, 1.2];
        let x = Tensor::from_shape_vec(&[1, 4], values.clone(), true);
        let w = Tensor::from_shape_vec(&[1, 4], vec![1.0, 2.0, -1.0, 0.5], false);
        backward(&sum(&mul(&l2_normalize_rows(&x), &w)));
        let grad = x.grad().unwrap();

        let f = |vals: &[f32]| -> f32 {
            let t = Tensor::from_shape_vec(&[1, 4], vals.to_vec(), false);
            let wt = Tensor::from_shape_vec(&[1, 4], vec![1.0, 2.0, -1.0, 0.5], false);
            sum(&mul(&l2_normalize_rows(&t), &wt)).item()
        };
        let h = 1e-3;
        for i in 0..values.len() {
            let mut plus = values.clone();
            let mut minus = values.clone();
            plus[i] += h;
            minus[i] -= h;
            let numeric = (f(&plus) - f(&minus)) / (2.0 * h);
            assert_relative_eq!(
                grad.as_slice().unwrap()[i],
                numeric,
                epsilon = 2e-2,
                max_relative = 2e-2
            );
        }
    }
}
