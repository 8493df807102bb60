//! The four loss terms and their weighted composition.

mod compose;
mod content;
mod direction;
mod directional;
mod variation;

pub use compose::{compose, LossBreakdown, LossTerms, LossWeights};
pub use content::content_loss;
pub use direction::{global_direction, patch_direction, text_direction};
pub use directional::{global_loss, patch_loss};
pub use variation::total_variation_loss;
