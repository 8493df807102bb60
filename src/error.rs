//! Crate-wide error type

use thiserror::Error;

/// Errors surfaced by configuration, checkpoint I/O, and component wiring.
///
/// Numeric edge cases of the loss pipeline (constant-channel rescale,
/// zero-vector direction normalization) are deliberately not represented
/// here: they propagate as NaN/Inf through the tensors instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or inconsistent configuration
    #[error("config error: {0}")]
    Config(String),

    /// Checkpoint or content-tensor serialization failure
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Filesystem failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Crate result alias
pub type Result<T> = std::result::Result<T, Error>;
