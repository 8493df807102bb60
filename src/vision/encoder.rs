//! Joint-embedding encoder seams and the self-contained stand-ins used
//! when no pretrained weights are available.

use crate::autograd::ops::bilinear_resize;
use crate::autograd::{matmul, reshape, Tensor};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Maps a `(B, 3, H, W)` image batch to `(B, D)` embeddings in the
/// joint image-text space, keeping the gradient path through the batch.
pub trait ImageEncoder {
    fn embed_dim(&self) -> usize;
    fn encode(&self, images: &Tensor) -> Tensor;
}

/// Maps prompts to `(N, D)` embeddings. Text embeddings carry no
/// gradient; prompts are constants of the objective.
pub trait TextEncoder {
    fn embed_dim(&self) -> usize;
    fn encode(&self, prompts: &[String]) -> Tensor;
}

/// Image encoder that pools to a small fixed grid and projects through
/// a frozen random matrix.
///
/// The projection is seeded, so two encoders with the same dimensions
/// agree, and identical images always embed identically. That is the
/// property the directional losses actually depend on.
pub struct PoolingImageEncoder {
    dim: usize,
    pool: usize,
    projection: Tensor,
}

impl PoolingImageEncoder {
    pub fn new(dim: usize) -> Self {
        Self::with_pool(dim, 7)
    }

    pub fn with_pool(dim: usize, pool: usize) -> Self {
        let in_dim = 3 * pool * pool;
        let scale = 1.0 / (in_dim as f32).sqrt();
        let mut rng = StdRng::seed_from_u64(0x00C1_1F5E);
        let mut weights = Array2::<f32>::zeros((in_dim, dim));
        for v in weights.iter_mut() {
            *v = rng.gen_range(-scale..scale);
        }
        Self {
            dim,
            pool,
            // Frozen: the objective never trains the encoder.
            projection: Tensor::new(weights.into_dyn(), false),
        }
    }
}

impl ImageEncoder for PoolingImageEncoder {
    fn embed_dim(&self) -> usize {
        self.dim
    }

    fn encode(&self, images: &Tensor) -> Tensor {
        let shape = images.shape();
        assert_eq!(shape.len(), 4, "encode expects a (B, 3, H, W) batch");
        assert_eq!(shape[1], 3, "encoder projection is built for 3 channels");
        let pooled = bilinear_resize(images, self.pool, self.pool);
        let flat = reshape(&pooled, &[shape[0], 3 * self.pool * self.pool]);
        matmul(&flat, &self.projection)
    }
}

/// Text encoder built from token hashing.
///
/// Each whitespace token hashes to a deterministic pseudo-random vector
/// and a prompt embeds as the mean of its token vectors, so prompts
/// sharing words land near each other and equal prompts embed equally.
pub struct HashTextEncoder {
    dim: usize,
}

impl HashTextEncoder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn token_vector(&self, token: &str, out: &mut [f32]) {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        // xorshift64* stream seeded by the token hash
        let mut state = hasher.finish() | 1;
        for v in out.iter_mut() {
            state ^= state >> 12;
            state ^= state << 25;
            state ^= state >> 27;
            let bits = (state.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 32) as u32;
            *v += bits as f32 / u32::MAX as f32 * 2.0 - 1.0;
        }
    }
}

impl TextEncoder for HashTextEncoder {
    fn embed_dim(&self) -> usize {
        self.dim
    }

    fn encode(&self, prompts: &[String]) -> Tensor {
        let mut data = Array2::<f32>::zeros((prompts.len(), self.dim));
        for (i, prompt) in prompts.iter().enumerate() {
            let row = data.row_mut(i).into_slice().expect("row is contiguous");
            let mut count = 0usize;
            for token in prompt.split_whitespace() {
                self.token_vector(&token.to_lowercase(), row);
                count += 1;
            }
            if count > 0 {
                for v in row.iter_mut() {
                    *v /= count as f32;
                }
            }
        }
        Tensor::new(data.into_dyn(), false)
    }
}
