//! Optimization: Adam and the warmup/decay learning-rate schedule.

mod adam;
mod optimizer;
mod scheduler;

pub use adam::Adam;
pub use optimizer::Optimizer;
pub use scheduler::{LRScheduler, Phase, WarmupThenDecayLR, WARMUP_ITERATIONS};
