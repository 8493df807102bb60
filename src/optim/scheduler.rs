//! Learning-rate schedule: linear warmup, then reciprocal decay.

use super::Optimizer;

/// Iterations spent in the warmup phase before decay begins.
pub const WARMUP_ITERATIONS: u64 = 10_000;

/// Learning rate scheduler trait
pub trait LRScheduler {
    /// Get the current learning rate
    fn get_lr(&self) -> f32;

    /// Step the scheduler (called once per training iteration)
    fn step(&mut self);

    /// Apply the current learning rate to an optimizer
    fn apply(&self, optimizer: &mut dyn Optimizer) {
        optimizer.set_lr(self.get_lr());
    }
}

/// Which side of the warmup threshold the schedule is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Warmup,
    Decay,
}

/// Two-phase schedule, deterministic on the iteration count:
///
/// - warmup (`i < WARMUP_ITERATIONS`): `lr · 0.1 · (1 + 3e-4 · i)`
/// - decay: `2e-4 / (1 + lr_decay · (i − WARMUP_ITERATIONS))`
///
/// The decay numerator is a fixed constant, not the configured base
/// rate.
pub struct WarmupThenDecayLR {
    lr: f32,
    lr_decay: f32,
    iteration: u64,
}

impl WarmupThenDecayLR {
    pub fn new(lr: f32, lr_decay: f32) -> Self {
        Self {
            lr,
            lr_decay,
            iteration: 0,
        }
    }

    /// Current phase of the schedule.
    pub fn phase(&self) -> Phase {
        if self.iteration < WARMUP_ITERATIONS {
            Phase::Warmup
        } else {
            Phase::Decay
        }
    }

    /// Iteration the next `get_lr` call describes.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }
}

impl LRScheduler for WarmupThenDecayLR {
    fn get_lr(&self) -> f32 {
        match self.phase() {
            Phase::Warmup => self.lr * 0.1 * (1.0 + 3e-4 * self.iteration as f32),
            Phase::Decay => {
                2e-4 / (1.0 + self.lr_decay * (self.iteration - WARMUP_ITERATIONS) as f32)
            }
        }
    }

    fn step(&mut self) {
        self.iteration += 1;
    }
}
