//! Training: configuration, infinite samplers, the stylization-network
//! seam, the iteration loop, checkpoints, and the metrics sink.

mod checkpoint;
mod config;
mod metrics;
mod network;
mod sampler;
mod trainer;

pub use checkpoint::{checkpoint_path, save_checkpoint, TensorRecord};
pub use config::TrainConfig;
pub use metrics::{ConsoleSink, MemorySink, MetricsSink};
pub use network::{ChannelMixStylizer, StylizationNetwork};
pub use sampler::{stack_images, BatchSource, CyclicSampler};
pub use trainer::{Components, Trainer};
