//! Random patch sampling for the patch-wise directional loss.
//!
//! Each source image contributes `num_crops` square crops at random
//! positions. Every crop is pushed through a random perspective warp
//! and resized to the encoder resolution. Crop, warp, and resize
//! compose into a single sample grid, so the whole augmentation is one
//! differentiable gather per crop.

use crate::autograd::ops::{warp, SampleGrid};
use crate::autograd::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Projective coefficients `[a, b, c, d, e, f, g, h]` mapping an output
/// point `(x, y)` to `((ax + by + c) / (gx + hy + 1), (dx + ey + f) / (gx + hy + 1))`.
type Homography = [f32; 8];

fn apply_homography(m: &Homography, x: f32, y: f32) -> (f32, f32) {
    let denom = m[6] * x + m[7] * y + 1.0;
    (
        (m[0] * x + m[1] * y + m[2]) / denom,
        (m[3] * x + m[4] * y + m[5]) / denom,
    )
}

/// Solve for the homography taking each `from` corner to the matching
/// `to` corner. Returns `None` when the correspondences are degenerate.
fn solve_homography(from: &[(f32, f32); 4], to: &[(f32, f32); 4]) -> Option<Homography> {
    // Two rows per correspondence, Gaussian elimination with partial
    // pivoting on the 8x9 augmented system.
    let mut m = [[0.0f32; 9]; 8];
    for (i, (&(fx, fy), &(tx, ty))) in from.iter().zip(to.iter()).enumerate() {
        m[2 * i] = [fx, fy, 1.0, 0.0, 0.0, 0.0, -fx * tx, -fy * tx, tx];
        m[2 * i + 1] = [0.0, 0.0, 0.0, fx, fy, 1.0, -fx * ty, -fy * ty, ty];
    }

    for col in 0..8 {
        let pivot = (col..8).max_by(|&a, &b| {
            m[a][col]
                .abs()
                .partial_cmp(&m[b][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if m[pivot][col].abs() < 1e-8 {
            return None;
        }
        m.swap(col, pivot);
        for row in 0..8 {
            if row == col {
                continue;
            }
            let factor = m[row][col] / m[col][col];
            for k in col..9 {
                m[row][k] -= factor * m[col][k];
            }
        }
    }

    let mut coeffs = [0.0f32; 8];
    for (i, c) in coeffs.iter_mut().enumerate() {
        *c = m[i][8] / m[i][i];
    }
    Some(coeffs)
}

/// Draws augmented patches from a stylized batch.
pub struct PatchSampler {
    crop_size: usize,
    num_crops: usize,
    out_size: usize,
    distortion: f32,
    rng: StdRng,
}

impl PatchSampler {
    pub fn new(crop_size: usize, num_crops: usize) -> Self {
        Self::from_seed(crop_size, num_crops, rand::random())
    }

    /// Seeded constructor so tests can pin the crop positions.
    pub fn from_seed(crop_size: usize, num_crops: usize, seed: u64) -> Self {
        assert!(crop_size > 1, "crop size must exceed one pixel");
        assert!(num_crops > 0, "at least one crop per image");
        Self {
            crop_size,
            num_crops,
            out_size: 224,
            distortion: 0.5,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn num_crops(&self) -> usize {
        self.num_crops
    }

    /// Corner displacements matching a perspective distortion of
    /// `self.distortion`: each corner moves inward by an independent
    /// integer amount of at most `distortion * half_extent`.
    fn perspective_corners(&mut self) -> [(f32, f32); 4] {
        let edge = (self.crop_size - 1) as f32;
        let half = self.crop_size / 2;
        let bound = (self.distortion * half as f32) as usize;
        let mut shift = |base: f32, sign: f32| {
            base + sign * self.rng.gen_range(0..=bound) as f32
        };
        [
            (shift(0.0, 1.0), shift(0.0, 1.0)),
            (shift(edge, -1.0), shift(0.0, 1.0)),
            (shift(edge, -1.0), shift(edge, -1.0)),
            (shift(0.0, 1.0), shift(edge, -1.0)),
        ]
    }

    fn crop_grid(&mut self, src: usize, img_h: usize, img_w: usize) -> SampleGrid {
        let cs = self.crop_size;
        assert!(cs <= img_h && cs <= img_w, "crop size exceeds image extent");
        let top = self.rng.gen_range(0..=img_h - cs) as f32;
        let left = self.rng.gen_range(0..=img_w - cs) as f32;

        let edge = (cs - 1) as f32;
        let corners = [(0.0, 0.0), (edge, 0.0), (edge, edge), (0.0, edge)];
        let displaced = self.perspective_corners();
        // Inverse map: output corners pull from the displaced points.
        let homography = solve_homography(&displaced, &corners);

        let scale = cs as f32 / self.out_size as f32;
        SampleGrid::from_mapping(src, self.out_size, self.out_size, move |y, x| {
            let cy = ((y as f32 + 0.5) * scale - 0.5).clamp(0.0, edge);
            let cx = ((x as f32 + 0.5) * scale - 0.5).clamp(0.0, edge);
            let (sx, sy) = match homography {
                Some(ref m) => apply_homography(m, cx, cy),
                None => (cx, cy),
            };
            if !sx.is_finite() || !sy.is_finite() {
                return None;
            }
            if sx < 0.0 || sx > edge || sy < 0.0 || sy > edge {
                return None;
            }
            Some((top + sy, left + sx))
        })
    }

    /// Sample `B * num_crops` augmented patches from a `(B, C, H, W)`
    /// batch, crops of one image contiguous in the output.
    pub fn sample(&mut self, images: &Tensor) -> Tensor {
        let shape = images.shape();
        assert_eq!(shape.len(), 4, "sample expects a (B, C, H, W) batch");
        let (b, h, w) = (shape[0], shape[2], shape[3]);

        let mut grids = Vec::with_capacity(b * self.num_crops);
        for src in 0..b {
            for _ in 0..self.num_crops {
                grids.push(self.crop_grid(src, h, w));
            }
        }
        warp(images, &grids)
    }
}
