//! Perceptual content loss over named backbone feature maps.

use crate::autograd::{add, mul, scale, sub, sum, Tensor};
use crate::vision::FeatureMaps;

fn mse(a: &Tensor, b: &Tensor) -> Tensor {
    let n = a.len();
    let d = sub(a, b);
    scale(&sum(&mul(&d, &d)), 1.0 / n as f32)
}

/// Sum over the batch and over both feature layers of the mean squared
/// feature difference. Plain accumulation: the batch dimension is not
/// averaged out.
pub fn content_loss(stylized: &[FeatureMaps], content: &[FeatureMaps]) -> Tensor {
    assert_eq!(
        stylized.len(),
        content.len(),
        "feature sets must pair up one per image"
    );
    assert!(!stylized.is_empty(), "content loss needs at least one image");

    let mut total: Option<Tensor> = None;
    for (s, c) in stylized.iter().zip(content.iter()) {
        for term in [mse(&s.conv4_2, &c.conv4_2), mse(&s.conv5_2, &c.conv5_2)] {
            total = Some(match total {
                Some(t) => add(&t, &term),
                None => term,
            });
        }
    }
    total.expect("checked non-empty above")
}
