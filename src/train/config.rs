//! Training configuration

use crate::error::{Error, Result};
use crate::loss::LossWeights;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Full configuration of one training run.
///
/// Defaults are the hyperparameters the objective ships with; `validate` rejects
/// structurally broken configurations before any component is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Base learning rate for the warmup phase.
    pub lr: f32,
    /// Reciprocal-decay coefficient after warmup.
    pub lr_decay: f32,
    /// Total training iterations.
    pub max_iter: u64,
    /// Images per batch.
    pub batch_size: usize,
    /// Legacy style weight, kept on the surface for compatibility.
    pub style_weight: f32,
    /// Weight of the perceptual content term.
    pub content_weight: f32,
    /// Iterations between checkpoint writes.
    pub save_model_interval: u64,
    /// Width of the stylization network's internal representation.
    pub hidden_dim: usize,
    /// Identifier of the vision-language encoder pair.
    pub clip_model: String,
    /// Weight of the total-variation term.
    pub lambda_tv: f32,
    /// Weight of the patch directional term.
    pub lambda_patch: f32,
    /// Weight of the global directional term.
    pub lambda_dir: f32,
    /// Legacy content lambda, kept on the surface for compatibility.
    pub lambda_c: f32,
    /// Patch-loss rejection threshold.
    pub thresh: f32,
    /// Side length of the random square crops.
    pub crop_size: usize,
    /// Crops drawn per image per iteration.
    pub num_crops: usize,
    /// Compute device; only `cpu` is supported.
    pub device: String,
    /// Directory checkpoints are written into.
    pub save_dir: PathBuf,
    /// Iterations between metric reports.
    pub log_interval: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            lr: 5e-4,
            lr_decay: 1e-5,
            max_iter: 160_000,
            batch_size: 2,
            style_weight: 10.0,
            content_weight: 7.0,
            save_model_interval: 10_000,
            hidden_dim: 512,
            clip_model: "openai/clip-vit-base-patch16".to_string(),
            lambda_tv: 2e-3,
            lambda_patch: 9000.0,
            lambda_dir: 500.0,
            lambda_c: 150.0,
            thresh: 0.7,
            crop_size: 128,
            num_crops: 4,
            device: "cpu".to_string(),
            save_dir: PathBuf::from("./experiments"),
            log_interval: 50,
        }
    }
}

impl TrainConfig {
    /// Reject structurally broken configurations.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".to_string()));
        }
        if self.max_iter == 0 {
            return Err(Error::Config("max_iter must be positive".to_string()));
        }
        if self.lr <= 0.0 || !self.lr.is_finite() {
            return Err(Error::Config("lr must be positive and finite".to_string()));
        }
        if self.lr_decay < 0.0 || !self.lr_decay.is_finite() {
            return Err(Error::Config("lr_decay must be non-negative".to_string()));
        }
        for (name, value) in [
            ("content_weight", self.content_weight),
            ("lambda_tv", self.lambda_tv),
            ("lambda_patch", self.lambda_patch),
            ("lambda_dir", self.lambda_dir),
        ] {
            if value <= 0.0 || !value.is_finite() {
                return Err(Error::Config(format!("{name} must be positive")));
            }
        }
        if !self.thresh.is_finite() {
            return Err(Error::Config("thresh must be finite".to_string()));
        }
        if self.num_crops == 0 {
            return Err(Error::Config("num_crops must be positive".to_string()));
        }
        if self.crop_size < 2 || self.crop_size > 224 {
            return Err(Error::Config(
                "crop_size must lie within the 224x224 working resolution".to_string(),
            ));
        }
        if self.save_model_interval == 0 {
            return Err(Error::Config(
                "save_model_interval must be positive".to_string(),
            ));
        }
        if self.log_interval == 0 {
            return Err(Error::Config("log_interval must be positive".to_string()));
        }
        if self.device != "cpu" {
            return Err(Error::Config(format!(
                "unsupported device '{}', only 'cpu' is available",
                self.device
            )));
        }
        Ok(())
    }

    /// Weights of the loss composer.
    pub fn weights(&self) -> LossWeights {
        LossWeights {
            lambda_patch: self.lambda_patch,
            content_weight: self.content_weight,
            lambda_tv: self.lambda_tv,
            lambda_dir: self.lambda_dir,
        }
    }
}
