//! Perceptual feature extraction seam.

use crate::autograd::ops::bilinear_resize;
use crate::autograd::{reshape, Tensor};

/// Feature maps of one image at the two layers the content loss
/// compares, each shaped `(C, H, W)`.
pub struct FeatureMaps {
    pub conv4_2: Tensor,
    pub conv5_2: Tensor,
}

impl FeatureMaps {
    pub fn new(conv4_2: Tensor, conv5_2: Tensor) -> Self {
        assert_eq!(conv4_2.shape().len(), 3, "feature maps are (C, H, W)");
        assert_eq!(conv5_2.shape().len(), 3, "feature maps are (C, H, W)");
        Self { conv4_2, conv5_2 }
    }
}

/// Produces the two feature maps for a single `(C, H, W)` image.
///
/// Implementations must keep the gradient path through the input so the
/// content loss can reach the stylization parameters.
pub trait FeatureExtractor {
    fn extract(&self, image: &Tensor) -> FeatureMaps;
}

/// Feature extractor built from differentiable downsampling alone.
///
/// Stands in for a pretrained convolutional backbone: conv4_2 is the
/// image at 1/8 scale and conv5_2 at 1/16 scale. Spatial structure and
/// the gradient path match the real thing; learned filters do not.
#[derive(Debug, Clone, Default)]
pub struct PyramidFeatures;

impl PyramidFeatures {
    pub fn new() -> Self {
        Self
    }

    fn downsample(image: &Tensor, factor: usize) -> Tensor {
        let shape = image.shape();
        let (c, h, w) = (shape[0], shape[1], shape[2]);
        let out_h = (h / factor).max(1);
        let out_w = (w / factor).max(1);
        let batched = reshape(image, &[1, c, h, w]);
        let small = bilinear_resize(&batched, out_h, out_w);
        reshape(&small, &[c, out_h, out_w])
    }
}

impl FeatureExtractor for PyramidFeatures {
    fn extract(&self, image: &Tensor) -> FeatureMaps {
        assert_eq!(image.shape().len(), 3, "extract expects a (C, H, W) image");
        FeatureMaps::new(
            Self::downsample(image, 8),
            Self::downsample(image, 16),
        )
    }
}
