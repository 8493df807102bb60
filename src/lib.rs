//! estilizar — text-guided style-transfer training objective
//!
//! Trains a stylization network against a multi-term objective:
//! a perceptual content loss over named backbone feature maps, a
//! patch-based directional loss over randomly augmented crops, a global
//! directional loss over whole images, and a total-variation regularizer.
//! The frozen backbone and the frozen vision-language encoders are
//! injected as read-only components; the stylization network's weights
//! are the only learned parameters.
//!
//! Module map:
//! - [`autograd`] — tape-based reverse-mode engine over shaped tensors
//! - [`vision`] — normalizer, feature-extractor adapter, patch sampler,
//!   vision-language encoder seams
//! - [`loss`] — the four loss terms and the composer
//! - [`optim`] — Adam and the warmup/decay learning-rate schedule
//! - [`train`] — configuration, infinite samplers, the training loop,
//!   checkpoints, and the metrics sink

pub mod autograd;
pub mod cli;
pub mod error;
pub mod loss;
pub mod optim;
pub mod train;
pub mod vision;

pub use autograd::Tensor;
pub use error::{Error, Result};
