//! Bilinear sample grids: resize, crop, and perspective warp as one
//! differentiable gather

use crate::autograd::{BackwardOp, Tensor};
use ndarray::{Array4, ArrayD, Ix4};
use std::cell::RefCell;
use std::rc::Rc;

type GradCell = Rc<RefCell<Option<ArrayD<f32>>>>;

/// Mapping from one output image to sampling coordinates inside a source
/// image of a batch.
///
/// Each output pixel carries either a fractional `(row, col)` source
/// coordinate (sampled bilinearly) or nothing (fill value zero). A crop,
/// a perspective warp, and a resize compose into a single grid, so the
/// whole patch pipeline is one gather with one scatter in backward.
#[derive(Clone)]
pub struct SampleGrid {
    src: usize,
    out_h: usize,
    out_w: usize,
    coords: Vec<Option<(f32, f32)>>,
}

impl SampleGrid {
    /// Build a grid from an arbitrary output-to-source pixel mapping.
    pub fn from_mapping<F>(src: usize, out_h: usize, out_w: usize, mapping: F) -> Self
    where
        F: Fn(usize, usize) -> Option<(f32, f32)>,
    {
        let mut coords = Vec::with_capacity(out_h * out_w);
        for y in 0..out_h {
            for x in 0..out_w {
                coords.push(mapping(y, x));
            }
        }
        Self { src, out_h, out_w, coords }
    }

    /// Deterministic bilinear resize grid using the half-pixel-center
    /// convention, coordinates clamped to the source extent.
    pub fn resize(src: usize, in_h: usize, in_w: usize, out_h: usize, out_w: usize) -> Self {
        let sy_scale = in_h as f32 / out_h as f32;
        let sx_scale = in_w as f32 / out_w as f32;
        Self::from_mapping(src, out_h, out_w, |y, x| {
            let sy = ((y as f32 + 0.5) * sy_scale - 0.5).clamp(0.0, in_h as f32 - 1.0);
            let sx = ((x as f32 + 0.5) * sx_scale - 0.5).clamp(0.0, in_w as f32 - 1.0);
            Some((sy, sx))
        })
    }

    /// Source image index inside the batch.
    pub fn source(&self) -> usize {
        self.src
    }

    /// Output height and width.
    pub fn output_size(&self) -> (usize, usize) {
        (self.out_h, self.out_w)
    }
}

/// Neighbor taps of one fractional coordinate; out-of-bounds taps
/// contribute the fill value zero.
fn taps(sy: f32, sx: f32) -> [(isize, isize, f32); 4] {
    let y0 = sy.floor();
    let x0 = sx.floor();
    let dy = sy - y0;
    let dx = sx - x0;
    let (y0, x0) = (y0 as isize, x0 as isize);
    [
        (y0, x0, (1.0 - dy) * (1.0 - dx)),
        (y0, x0 + 1, (1.0 - dy) * dx),
        (y0 + 1, x0, dy * (1.0 - dx)),
        (y0 + 1, x0 + 1, dy * dx),
    ]
}

/// Sample a `(B, C, H, W)` batch through a list of grids, producing a
/// `(len(grids), C, out_h, out_w)` batch. All grids must share one
/// output size.
pub fn warp(batch: &Tensor, grids: &[SampleGrid]) -> Tensor {
    let shape = batch.shape();
    assert_eq!(shape.len(), 4, "warp expects a (B, C, H, W) batch");
    assert!(!grids.is_empty(), "warp requires at least one grid");
    let (b, c, h, w) = (shape[0], shape[1], shape[2], shape[3]);
    let (out_h, out_w) = grids[0].output_size();
    for grid in grids {
        assert!(grid.src < b, "grid source index out of range");
        assert_eq!(grid.output_size(), (out_h, out_w), "grids must share an output size");
    }

    let data = batch.data();
    let x = data
        .view()
        .into_dimensionality::<Ix4>()
        .expect("checked 4-D above");
    let mut out = Array4::<f32>::zeros((grids.len(), c, out_h, out_w));
    for (gi, grid) in grids.iter().enumerate() {
        for (pixel, coord) in grid.coords.iter().enumerate() {
            let Some((sy, sx)) = *coord else { continue };
            let (oy, ox) = (pixel / out_w, pixel % out_w);
            for (ty, tx, weight) in taps(sy, sx) {
                if weight == 0.0 || ty < 0 || tx < 0 || ty >= h as isize || tx >= w as isize {
                    continue;
                }
                for ci in 0..c {
                    out[[gi, ci, oy, ox]] +=
                        weight * x[[grid.src, ci, ty as usize, tx as usize]];
                }
            }
        }
    }
    drop(data);

    let requires_grad = batch.requires_grad();
    let result = Tensor::new(out.into_dyn(), requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(WarpBackward {
            batch: batch.clone(),
            grids: grids.to_vec(),
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct WarpBackward {
    batch: Tensor,
    grids: Vec<SampleGrid>,
    result_grad: GradCell,
}

impl BackwardOp for WarpBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.batch.requires_grad() {
                let g = grad
                    .view()
                    .into_dimensionality::<Ix4>()
                    .expect("warp result gradient is 4-D");
                let shape = self.batch.shape();
                let (h, w) = (shape[2], shape[3]);
                let mut back = Array4::<f32>::zeros((shape[0], shape[1], h, w));
                let (_, c, _, out_w) = g.dim();

                for (gi, grid) in self.grids.iter().enumerate() {
                    for (pixel, coord) in grid.coords.iter().enumerate() {
                        let Some((sy, sx)) = *coord else { continue };
                        let (oy, ox) = (pixel / out_w, pixel % out_w);
                        for (ty, tx, weight) in taps(sy, sx) {
                            if weight == 0.0 || ty < 0 || tx < 0 || ty >= h as isize || tx >= w as isize {
                                continue;
                            }
                            for ci in 0..c {
                                back[[grid.src, ci, ty as usize, tx as usize]] +=
                                    weight * g[[gi, ci, oy, ox]];
                            }
                        }
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

/// Bilinear resize of a whole batch to `(out_h, out_w)`.
pub fn bilinear_resize(batch: &Tensor, out_h: usize, out_w: usize) -> Tensor {
    let shape = batch.shape();
    assert_eq!(shape.len(), 4, "bilinear_resize expects (B, C, H, W)");
    let grids: Vec<SampleGrid> = (0..shape[0])
        .map(|b| SampleGrid::resize(b, shape[2], shape[3], out_h, out_w))
        .collect();
    warp(batch, &grids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{backward, sum};
    use approx::assert_relative_eq;
    use ndarray::IxDyn;

    #[test]
    fn test_resize_constant_image_stays_constant() {
        let x = Tensor::new(ArrayD::from_elem(IxDyn(&[1, 3, 8, 8]), 0.25), false);
        let y = bilinear_resize(&x, 4, 4);
        assert_eq!(y.shape(), vec![1, 3, 4, 4]);
        for &v in y.data().iter() {
            assert_relative_eq!(v, 0.25, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_resize_identity() {
        let x = Tensor::from_shape_vec(&[1, 1, 2, 2], vec![1.0, 2.0, 3.0, 4.0], false);
        let y = bilinear_resize(&x, 2, 2);
        assert_eq!(y.data().as_slice().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_warp_fill_zero_outside() {
        let x = Tensor::new(ArrayD::from_elem(IxDyn(&[1, 1, 4, 4]), 1.0), false);
        let grid = SampleGrid::from_mapping(0, 1, 2, |_, x| {
            if x == 0 {
                Some((1.0, 1.0))
            } else {
                None
            }
        });
        let y = warp(&x, &[grid]);
        assert_eq!(y.data().as_slice().unwrap(), &[1.0, 0.0]);
    }

    #[test]
    fn test_warp_gradient_scatters_weights() {
        let x = Tensor::from_shape_vec(&[1, 1, 2, 2], vec![1.0, 2.0, 3.0, 4.0], true);
        // Sample the exact center: equal quarter weights on all pixels.
        let grid = SampleGrid::from_mapping(0, 1, 1, |_, _| Some((0.5, 0.5)));
        let y = warp(&x, &[grid]);
        assert_relative_eq!(y.item(), 2.5, epsilon = 1e-6);

        backward(&sum(&y));
        let grad = x.grad().unwrap();
        for &g in grad.iter() {
            assert_relative_eq!(g, 0.25, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_warp_selects_source_image() {
        let mut values = vec![0.0; 8];
        values[4..].fill(5.0); // second image all fives
        let x = Tensor::from_shape_vec(&[2, 1, 2, 2], values, false);
        let grid = SampleGrid::resize(1, 2, 2, 2, 2);
        let y = warp(&x, &[grid]);
        assert!(y.data().iter().all(|&v| (v - 5.0).abs() < 1e-6));
    }
}
