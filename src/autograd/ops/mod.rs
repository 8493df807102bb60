//! Differentiable operations of the loss pipeline
//!
//! Split by concern:
//! - [`basic`] — elementwise arithmetic, reshape, threshold, batch slicing
//! - [`matmul`] — dense projection for the embedding seams
//! - [`reduce`] — row/group sums and the Frobenius norm
//! - [`diff`] — neighbor finite differences for the variation loss
//! - [`normalize`] — min-max rescale, channel statistics, row L2 normalize
//! - [`sample`] — bilinear sample grids (resize, crop, perspective warp)

mod basic;
mod diff;
mod matmul;
mod normalize;
mod sample;
mod reduce;

pub use basic::{add, add_scalar, batch_item, mul, reshape, scale, sub, sum, threshold_zero};
pub use diff::offset_diff;
pub use matmul::matmul;
pub use normalize::{channel_affine, channel_standardize, l2_normalize_rows, spatial_minmax_rescale};
pub use reduce::{frobenius_norm, group_sum, row_sum};
pub use sample::{bilinear_resize, warp, SampleGrid};
