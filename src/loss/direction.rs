//! Direction vectors in the joint embedding space.
//!
//! A direction is the row-normalized difference of two raw embeddings;
//! the endpoints themselves are never normalized. Normalization is
//! unguarded: equal endpoints produce a zero difference whose
//! normalization is NaN, and the NaN is allowed to reach the reported
//! loss.

use crate::autograd::{group_sum, l2_normalize_rows, sub, Tensor};
use crate::vision::{ImageEncoder, TextEncoder};

/// Style-minus-source text direction, one row per prompt pair.
pub fn text_direction(
    encoder: &dyn TextEncoder,
    style_prompts: &[String],
    source_prompts: &[String],
) -> Tensor {
    assert_eq!(
        style_prompts.len(),
        source_prompts.len(),
        "style and source prompts must pair up"
    );
    let style = encoder.encode(style_prompts);
    let source = encoder.encode(source_prompts);
    l2_normalize_rows(&sub(&style, &source))
}

/// Whole-image stylized-minus-content direction, one row per image.
/// Gradients flow through the stylized batch only.
pub fn global_direction(
    encoder: &dyn ImageEncoder,
    stylized: &Tensor,
    content: &Tensor,
) -> Tensor {
    let s = encoder.encode(stylized);
    let c = encoder.encode(content);
    l2_normalize_rows(&sub(&s, &c))
}

/// Patch direction: crop embeddings of one source image are summed over
/// its contiguous `num_crops` block (a plain sum, not a mean), then the
/// aggregate takes the same difference against the content embedding.
pub fn patch_direction(
    encoder: &dyn ImageEncoder,
    patches: &Tensor,
    content: &Tensor,
    num_crops: usize,
) -> Tensor {
    let pooled = group_sum(&encoder.encode(patches), num_crops);
    let c = encoder.encode(content);
    l2_normalize_rows(&sub(&pooled, &c))
}
