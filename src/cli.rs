//! Command-line interface

use crate::error::{Error, Result};
use crate::train::{
    ChannelMixStylizer, Components, ConsoleSink, CyclicSampler, TrainConfig, Trainer,
};
use crate::vision::{
    BackboneNormalizer, HashTextEncoder, PatchSampler, PoolingImageEncoder, PyramidFeatures,
};
use crate::Tensor;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Estilizar: text-guided style-transfer training
#[derive(Parser, Debug, Clone)]
#[command(name = "estilizar")]
#[command(version)]
#[command(about = "Train a stylization network against text prompts")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a training job
    Train(TrainArgs),
}

/// Arguments for the train command
#[derive(Parser, Debug, Clone)]
pub struct TrainArgs {
    /// Directory of content images as JSON tensor files
    #[arg(long, value_name = "DIR")]
    pub content_dir: Option<PathBuf>,

    /// Generate N deterministic synthetic content images instead of
    /// loading a directory (smoke runs)
    #[arg(long, value_name = "N", conflicts_with = "content_dir")]
    pub synthetic: Option<usize>,

    /// Style prompt; repeat the flag for a prompt set
    #[arg(long = "style-text", required = true, value_name = "TEXT")]
    pub style_texts: Vec<String>,

    /// Base learning rate
    #[arg(long, default_value_t = 5e-4)]
    pub lr: f32,

    /// Learning-rate decay coefficient
    #[arg(long, default_value_t = 1e-5)]
    pub lr_decay: f32,

    /// Total training iterations
    #[arg(long, default_value_t = 160_000)]
    pub max_iter: u64,

    /// Images per batch
    #[arg(long, default_value_t = 2)]
    pub batch_size: usize,

    /// Legacy style weight
    #[arg(long, default_value_t = 10.0)]
    pub style_weight: f32,

    /// Weight of the content term
    #[arg(long, default_value_t = 7.0)]
    pub content_weight: f32,

    /// Iterations between checkpoints
    #[arg(long, default_value_t = 10_000)]
    pub save_model_interval: u64,

    /// Embedding width of the encoder pair
    #[arg(long, default_value_t = 512)]
    pub hidden_dim: usize,

    /// Vision-language model identifier
    #[arg(long, default_value = "openai/clip-vit-base-patch16")]
    pub clip_model: String,

    /// Weight of the total-variation term
    #[arg(long, default_value_t = 2e-3)]
    pub lambda_tv: f32,

    /// Weight of the patch directional term
    #[arg(long, default_value_t = 9000.0)]
    pub lambda_patch: f32,

    /// Weight of the global directional term
    #[arg(long, default_value_t = 500.0)]
    pub lambda_dir: f32,

    /// Legacy content lambda
    #[arg(long, default_value_t = 150.0)]
    pub lambda_c: f32,

    /// Patch-loss rejection threshold
    #[arg(long, default_value_t = 0.7)]
    pub thresh: f32,

    /// Side length of random crops
    #[arg(long, default_value_t = 128)]
    pub crop_size: usize,

    /// Crops per image per iteration
    #[arg(long, default_value_t = 4)]
    pub num_crops: usize,

    /// Compute device
    #[arg(long, default_value = "cpu")]
    pub device: String,

    /// Checkpoint directory
    #[arg(long, default_value = "./experiments")]
    pub save_dir: PathBuf,

    /// Iterations between metric reports
    #[arg(long, default_value_t = 50)]
    pub log_interval: u64,
}

impl TrainArgs {
    fn to_config(&self) -> TrainConfig {
        TrainConfig {
            lr: self.lr,
            lr_decay: self.lr_decay,
            max_iter: self.max_iter,
            batch_size: self.batch_size,
            style_weight: self.style_weight,
            content_weight: self.content_weight,
            save_model_interval: self.save_model_interval,
            hidden_dim: self.hidden_dim,
            clip_model: self.clip_model.clone(),
            lambda_tv: self.lambda_tv,
            lambda_patch: self.lambda_patch,
            lambda_dir: self.lambda_dir,
            lambda_c: self.lambda_c,
            thresh: self.thresh,
            crop_size: self.crop_size,
            num_crops: self.num_crops,
            device: self.device.clone(),
            save_dir: self.save_dir.clone(),
            log_interval: self.log_interval,
        }
    }
}

/// Execute a CLI command based on the parsed arguments
pub fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Train(args) => run_train(&args),
    }
}

fn run_train(args: &TrainArgs) -> Result<()> {
    let config = args.to_config();
    config.validate()?;

    let content = match (&args.content_dir, args.synthetic) {
        (Some(dir), _) => load_content_images(dir)?,
        (None, Some(n)) => synthetic_images(n),
        (None, None) => {
            return Err(Error::Config(
                "provide --content-dir or --synthetic".to_string(),
            ))
        }
    };
    if content.is_empty() {
        return Err(Error::Config("no content images found".to_string()));
    }
    for image in &content {
        let shape = image.shape();
        if shape[1] < config.crop_size || shape[2] < config.crop_size {
            return Err(Error::Config(format!(
                "content image {}x{} is smaller than crop_size {}",
                shape[1], shape[2], config.crop_size
            )));
        }
    }

    let components = Components {
        network: Box::new(ChannelMixStylizer::new()),
        feature_extractor: Box::new(PyramidFeatures::new()),
        image_encoder: Box::new(PoolingImageEncoder::new(config.hidden_dim)),
        text_encoder: Box::new(HashTextEncoder::new(config.hidden_dim)),
        normalizer: BackboneNormalizer::new(),
        patch_sampler: PatchSampler::new(config.crop_size, config.num_crops),
        content_images: Box::new(CyclicSampler::new(content)),
        style_prompts: Box::new(CyclicSampler::new(args.style_texts.clone())),
        source_prompts: Box::new(CyclicSampler::new(vec!["a photo".to_string()])),
        metrics: Box::new(ConsoleSink),
    };

    let mut trainer = Trainer::new(config, components)?;
    trainer.run()
}

#[derive(Debug, Deserialize)]
struct ImageFile {
    shape: Vec<usize>,
    values: Vec<f32>,
}

/// Load every `.json` tensor file in `dir`, sorted by file name.
fn load_content_images(dir: &Path) -> Result<Vec<Tensor>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        let json = std::fs::read_to_string(&path)?;
        let file: ImageFile = serde_json::from_str(&json).map_err(|e| {
            Error::Serialization(format!("{}: {e}", path.display()))
        })?;
        if file.shape.len() != 3 || file.shape[0] != 3 {
            return Err(Error::Config(format!(
                "{}: content images must be (3, H, W)",
                path.display()
            )));
        }
        if file.shape.iter().product::<usize>() != file.values.len() {
            return Err(Error::Config(format!(
                "{}: shape does not match value count",
                path.display()
            )));
        }
        images.push(Tensor::from_shape_vec(&file.shape, file.values, false));
    }
    Ok(images)
}

/// Deterministic 256x256 content set for smoke runs.
fn synthetic_images(count: usize) -> Vec<Tensor> {
    const SIDE: usize = 256;
    (0..count)
        .map(|i| {
            let values: Vec<f32> = (0..3 * SIDE * SIDE)
                .map(|j| ((i * 7919 + j * 104_729) % 65_537) as f32 / 65_536.0)
                .collect();
            Tensor::from_shape_vec(&[3, SIDE, SIDE], values, false)
        })
        .collect()
}
