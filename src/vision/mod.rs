//! Image-side collaborators of the training objective: backbone
//! normalization, feature-map extraction, embedding encoders, and the
//! random patch sampler.

mod encoder;
mod features;
mod normalizer;
mod patches;

pub use encoder::{HashTextEncoder, ImageEncoder, PoolingImageEncoder, TextEncoder};
pub use features::{FeatureExtractor, FeatureMaps, PyramidFeatures};
pub use normalizer::{BackboneNormalizer, IMAGENET_MEAN, IMAGENET_STD};
pub use patches::PatchSampler;
