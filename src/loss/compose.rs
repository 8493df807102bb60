//! Weighted composition of the four loss terms.

use crate::autograd::{add, scale, Tensor};
use serde::{Deserialize, Serialize};

/// Scalar weights of the total objective.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LossWeights {
    pub lambda_patch: f32,
    pub content_weight: f32,
    pub lambda_tv: f32,
    pub lambda_dir: f32,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self {
            lambda_patch: 9000.0,
            content_weight: 7.0,
            lambda_tv: 2e-3,
            lambda_dir: 500.0,
        }
    }
}

/// The four scalar loss tensors of one iteration, pre-weighting.
pub struct LossTerms {
    pub content: Tensor,
    pub patch: Tensor,
    pub global: Tensor,
    pub variation: Tensor,
}

/// Host-side snapshot of the five reported values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LossBreakdown {
    pub content: f32,
    pub patch: f32,
    pub global: f32,
    pub variation: f32,
    pub total: f32,
}

/// Stateless weighted sum:
/// `lambda_patch·patch + content_weight·content + lambda_tv·variation + lambda_dir·global`.
///
/// Returns the total as a graph tensor (the backward entry point) plus
/// the detached breakdown for reporting.
pub fn compose(terms: &LossTerms, weights: &LossWeights) -> (Tensor, LossBreakdown) {
    let total = add(
        &add(
            &scale(&terms.patch, weights.lambda_patch),
            &scale(&terms.content, weights.content_weight),
        ),
        &add(
            &scale(&terms.variation, weights.lambda_tv),
            &scale(&terms.global, weights.lambda_dir),
        ),
    );
    let breakdown = LossBreakdown {
        content: terms.content.item(),
        patch: terms.patch.item(),
        global: terms.global.item(),
        variation: terms.variation.item(),
        total: total.item(),
    };
    (total, breakdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scalar(v: f32) -> Tensor {
        Tensor::from_vec(vec![v], false)
    }

    #[test]
    fn test_compose_weighted_sum() {
        let terms = LossTerms {
            content: scalar(2.0),
            patch: scalar(0.5),
            global: scalar(1.0),
            variation: scalar(100.0),
        };
        let weights = LossWeights {
            lambda_patch: 9000.0,
            content_weight: 7.0,
            lambda_tv: 2e-3,
            lambda_dir: 500.0,
        };
        let (total, breakdown) = compose(&terms, &weights);
        let expected = 9000.0 * 0.5 + 7.0 * 2.0 + 2e-3 * 100.0 + 500.0 * 1.0;
        assert_relative_eq!(total.item(), expected, epsilon = 1e-3);
        assert_relative_eq!(breakdown.total, expected, epsilon = 1e-3);
        assert_relative_eq!(breakdown.patch, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_nan_term_poisons_the_total() {
        let terms = LossTerms {
            content: scalar(1.0),
            patch: scalar(f32::NAN),
            global: scalar(0.0),
            variation: scalar(0.0),
        };
        let (total, breakdown) = compose(&terms, &LossWeights::default());
        assert!(total.item().is_nan());
        assert!(breakdown.total.is_nan());
    }

    #[test]
    fn test_total_keeps_gradient_path() {
        use crate::autograd::backward;
        let p = Tensor::from_vec(vec![1.0], true);
        let terms = LossTerms {
            content: scalar(0.0),
            patch: p.clone(),
            global: scalar(0.0),
            variation: scalar(0.0),
        };
        let (total, _) = compose(&terms, &LossWeights::default());
        backward(&total);
        assert_relative_eq!(p.grad().unwrap()[[0]], 9000.0, epsilon = 1e-3);
    }
}
