//! Error types emitted when blocks are constructed.
//!
//! Forward passes report shape-contract violations through
//! `candle_core::Result`; everything that can be rejected before any tensor
//! work happens is captured here instead, so misconfiguration fails fast.

use thiserror::Error;

/// Construction-time failure category for set-attention blocks.
#[derive(Debug, Error)]
pub enum SetAttentionError {
    /// The attention dimension cannot be split evenly across heads.
    #[error("dim {dim} is not divisible by num_heads {num_heads}")]
    HeadDivisibility { dim: usize, num_heads: usize },

    /// A structural size that must be positive was zero.
    #[error("{name} must be greater than zero")]
    ZeroDimension { name: &'static str },

    /// Dropout probability outside the half-open unit interval.
    #[error("dropout probability must be in [0, 1), got {p}")]
    DropoutProbability { p: f32 },

    /// A stacked block sequence needs at least one block.
    #[error("stacked blocks require num_blocks >= 1")]
    EmptyStack,

    /// Tensor-engine failure while creating parameters.
    #[error(transparent)]
    Tensor(#[from] candle_core::Error),
}
