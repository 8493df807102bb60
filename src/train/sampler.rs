//! Infinite batch sources over finite datasets.

use crate::autograd::Tensor;
use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Endless supplier of training items; `next_batch` never runs dry.
pub trait BatchSource<T> {
    fn next_batch(&mut self, n: usize) -> Vec<T>;
}

/// Cycles over a finite set forever, reshuffling the visit order at the
/// start of every pass.
pub struct CyclicSampler<T: Clone> {
    items: Vec<T>,
    order: Vec<usize>,
    cursor: usize,
    rng: StdRng,
}

impl<T: Clone> CyclicSampler<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self::from_seed(items, rand::random())
    }

    pub fn from_seed(items: Vec<T>, seed: u64) -> Self {
        assert!(!items.is_empty(), "sampler needs at least one item");
        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..items.len()).collect();
        order.shuffle(&mut rng);
        Self {
            items,
            order,
            cursor: 0,
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Clone> BatchSource<T> for CyclicSampler<T> {
    fn next_batch(&mut self, n: usize) -> Vec<T> {
        let mut batch = Vec::with_capacity(n);
        for _ in 0..n {
            if self.cursor == self.order.len() {
                self.order.shuffle(&mut self.rng);
                self.cursor = 0;
            }
            batch.push(self.items[self.order[self.cursor]].clone());
            self.cursor += 1;
        }
        batch
    }
}

/// Stack `(3, H, W)` images into one `(B, 3, H, W)` batch tensor. The
/// batch carries no gradient; the stylized output does.
pub fn stack_images(images: &[Tensor]) -> Tensor {
    assert!(!images.is_empty(), "cannot stack an empty batch");
    let shape = images[0].shape();
    assert_eq!(shape.len(), 3, "images are (C, H, W)");

    let mut out_shape = vec![images.len()];
    out_shape.extend_from_slice(&shape);
    let mut out = ArrayD::<f32>::zeros(IxDyn(&out_shape));
    for (i, image) in images.iter().enumerate() {
        assert_eq!(image.shape(), shape, "all images must share one shape");
        out.index_axis_mut(ndarray::Axis(0), i)
            .assign(&image.data());
    }
    Tensor::new(out, false)
}
