//! The training loop.

use crate::autograd::{backward, batch_item, Tensor};
use crate::error::{Error, Result};
use crate::loss::{
    compose, content_loss, global_direction, global_loss, patch_direction, patch_loss,
    text_direction, total_variation_loss, LossBreakdown, LossTerms,
};
use crate::optim::{Adam, LRScheduler, Optimizer, WarmupThenDecayLR};
use crate::train::{
    save_checkpoint, stack_images, BatchSource, MetricsSink, StylizationNetwork, TrainConfig,
};
use crate::vision::{BackboneNormalizer, FeatureExtractor, FeatureMaps, ImageEncoder, PatchSampler, TextEncoder};

/// Frozen collaborators and data sources of one run, injected rather
/// than constructed, so tests and the binary assemble them differently.
pub struct Components {
    pub network: Box<dyn StylizationNetwork>,
    pub feature_extractor: Box<dyn FeatureExtractor>,
    pub image_encoder: Box<dyn ImageEncoder>,
    pub text_encoder: Box<dyn TextEncoder>,
    pub normalizer: BackboneNormalizer,
    pub patch_sampler: PatchSampler,
    pub content_images: Box<dyn BatchSource<Tensor>>,
    pub style_prompts: Box<dyn BatchSource<String>>,
    pub source_prompts: Box<dyn BatchSource<String>>,
    pub metrics: Box<dyn MetricsSink>,
}

/// Runs the objective to `max_iter`, single-threaded.
pub struct Trainer {
    config: TrainConfig,
    components: Components,
    params: Vec<Tensor>,
    optimizer: Adam,
    scheduler: WarmupThenDecayLR,
    iteration: u64,
}

impl Trainer {
    pub fn new(config: TrainConfig, components: Components) -> Result<Self> {
        config.validate()?;
        if components.image_encoder.embed_dim() != components.text_encoder.embed_dim() {
            return Err(Error::Config(format!(
                "encoder embedding dimensions disagree: image {} vs text {}",
                components.image_encoder.embed_dim(),
                components.text_encoder.embed_dim()
            )));
        }
        let params = components.network.parameters();
        if params.is_empty() {
            return Err(Error::Config(
                "stylization network exposes no parameters".to_string(),
            ));
        }
        let optimizer = Adam::default_params(config.lr);
        let scheduler = WarmupThenDecayLR::new(config.lr, config.lr_decay);
        Ok(Self {
            config,
            components,
            params,
            optimizer,
            scheduler,
            iteration: 0,
        })
    }

    /// Iterations completed so far.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    fn extract_features(&self, batch: &Tensor) -> Vec<FeatureMaps> {
        (0..batch.shape()[0])
            .map(|i| {
                self.components
                    .feature_extractor
                    .extract(&batch_item(batch, i))
            })
            .collect()
    }

    /// One full iteration: schedule the learning rate, draw batches,
    /// forward, build the four terms, backward, step.
    pub fn train_iteration(&mut self) -> LossBreakdown {
        self.scheduler.apply(&mut self.optimizer);

        let b = self.config.batch_size;
        let content = stack_images(&self.components.content_images.next_batch(b));
        let style = self
            .components
            .style_prompts
            .next_batch(1)
            .pop()
            .expect("sampler yields requested count");
        let styles = vec![style.clone(); b];
        let sources = self.components.source_prompts.next_batch(b);

        let stylized = self.components.network.forward(&content, &style);

        // Content term: both batches through the backbone normalizer,
        // features compared image by image.
        let stylized_feats = self.extract_features(&self.components.normalizer.normalize(&stylized));
        let content_feats = self.extract_features(&self.components.normalizer.normalize(&content));
        let content_term = content_loss(&stylized_feats, &content_feats);

        // Directional terms share one text direction per iteration.
        let text_dir = text_direction(&*self.components.text_encoder, &styles, &sources);

        let patches = self.components.patch_sampler.sample(&stylized);
        let patch_dir = patch_direction(
            &*self.components.image_encoder,
            &patches,
            &content,
            self.components.patch_sampler.num_crops(),
        );
        let patch_term = patch_loss(&patch_dir, &text_dir, self.config.thresh);

        let global_dir = global_direction(&*self.components.image_encoder, &stylized, &content);
        let global_term = global_loss(&global_dir, &text_dir);

        // Regularizer sees the raw stylized batch.
        let variation_term = total_variation_loss(&stylized);

        let terms = LossTerms {
            content: content_term,
            patch: patch_term,
            global: global_term,
            variation: variation_term,
        };
        let (total, breakdown) = compose(&terms, &self.config.weights());

        self.optimizer.zero_grad(&mut self.params);
        backward(&total);
        self.optimizer.step(&mut self.params);

        self.scheduler.step();
        self.iteration += 1;
        breakdown
    }

    /// Run to `max_iter`, reporting every `log_interval` iterations and
    /// checkpointing every `save_model_interval` iterations plus at the
    /// final iteration.
    pub fn run(&mut self) -> Result<()> {
        while self.iteration < self.config.max_iter {
            let lr = self.scheduler.get_lr();
            let breakdown = self.train_iteration();
            let done = self.iteration; // one-based count of finished iterations

            if done % self.config.log_interval == 0 {
                self.components.metrics.report(done - 1, lr, &breakdown);
            }
            if done % self.config.save_model_interval == 0 || done == self.config.max_iter {
                save_checkpoint(
                    &self.config.save_dir,
                    done - 1,
                    &self.components.network.state_dict(),
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::{ChannelMixStylizer, CyclicSampler, MemorySink};
    use crate::vision::{HashTextEncoder, PoolingImageEncoder, PyramidFeatures};

    fn synthetic_images(count: usize, side: usize) -> Vec<Tensor> {
        (0..count)
            .map(|i| {
                let values: Vec<f32> = (0..3 * side * side)
                    .map(|j| ((i * 131 + j * 7) % 97) as f32 / 96.0)
                    .collect();
                Tensor::from_shape_vec(&[3, side, side], values, false)
            })
            .collect()
    }

    fn test_components(dim: usize) -> Components {
        Components {
            network: Box::new(ChannelMixStylizer::new()),
            feature_extractor: Box::new(PyramidFeatures::new()),
            image_encoder: Box::new(PoolingImageEncoder::with_pool(dim, 4)),
            text_encoder: Box::new(HashTextEncoder::new(dim)),
            normalizer: BackboneNormalizer::new(),
            patch_sampler: PatchSampler::from_seed(8, 2, 11),
            content_images: Box::new(CyclicSampler::from_seed(synthetic_images(3, 16), 1)),
            style_prompts: Box::new(CyclicSampler::from_seed(
                vec!["oil painting of flames".to_string()],
                2,
            )),
            source_prompts: Box::new(CyclicSampler::from_seed(vec!["a photo".to_string()], 3)),
            metrics: Box::new(MemorySink::new()),
        }
    }

    fn tiny_config() -> TrainConfig {
        TrainConfig {
            max_iter: 2,
            batch_size: 2,
            crop_size: 8,
            num_crops: 2,
            log_interval: 1,
            save_model_interval: 2,
            save_dir: tempfile::tempdir().unwrap().into_path(),
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_mismatched_encoder_dims_rejected() {
        let mut components = test_components(32);
        components.text_encoder = Box::new(HashTextEncoder::new(16));
        assert!(Trainer::new(tiny_config(), components).is_err());
    }

    #[test]
    fn test_iteration_produces_finite_breakdown_and_updates_params() {
        let components = test_components(32);
        let mut trainer = Trainer::new(tiny_config(), components).unwrap();
        let before: Vec<f32> = trainer.params[0].data().iter().copied().collect();

        let breakdown = trainer.train_iteration();
        assert!(breakdown.total.is_finite());
        assert!(breakdown.content >= 0.0);
        assert!(breakdown.variation >= 0.0);

        let after: Vec<f32> = trainer.params[0].data().iter().copied().collect();
        assert_ne!(before, after, "Adam step must move the parameters");
        assert_eq!(trainer.iteration(), 1);
    }

    #[test]
    fn test_stale_gradients_do_not_leak_into_the_next_step() {
        // Two trainers built from identical seeds run in lockstep.
        let mut clean = Trainer::new(tiny_config(), test_components(32)).unwrap();
        let mut poisoned = Trainer::new(tiny_config(), test_components(32)).unwrap();
        clean.train_iteration();
        poisoned.train_iteration();

        // Inject a huge gradient between iterations. The next iteration
        // zeroes all parameter gradients before its backward pass, so
        // the injected values must not reach the optimizer.
        for param in &poisoned.params {
            let shape = param.shape();
            param.set_grad(ndarray::ArrayD::from_elem(ndarray::IxDyn(&shape), 1e6));
        }

        clean.train_iteration();
        poisoned.train_iteration();

        for (a, b) in clean.params.iter().zip(poisoned.params.iter()) {
            assert_eq!(a.data().as_slice().unwrap(), b.data().as_slice().unwrap());
        }
    }

    #[test]
    fn test_run_reports_and_checkpoints() {
        let config = tiny_config();
        let save_dir = config.save_dir.clone();
        let mut trainer = Trainer::new(config, test_components(32)).unwrap();
        trainer.run().unwrap();

        // save_model_interval == max_iter == 2: exactly one checkpoint,
        // named after the final iteration.
        let entries: Vec<_> = std::fs::read_dir(&save_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert!(save_dir.join("iter_2.json").exists());
    }
}
