//! Configuration shared by all set-attention blocks.
//!
//! [`BlockOptions`] carries the knobs every block accepts; [`MabConfig`] adds
//! the three dimensionalities of a single attention block and validates the
//! structural invariants before any parameter is allocated.

use crate::errors::SetAttentionError;

/// Per-block options, shared by every component in the crate.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockOptions {
    /// Number of attention heads; must divide the attention dimension.
    pub num_heads: usize,
    /// Enable learned layer normalisation after each sub-block.
    pub layer_norm: bool,
    /// Dropout probability applied during training; `None` disables dropout.
    pub dropout_p: Option<f32>,
    /// Whether the projected queries are added back after attention.
    pub residual: bool,
}

impl Default for BlockOptions {
    fn default() -> Self {
        Self {
            num_heads: 4,
            layer_norm: false,
            dropout_p: None,
            residual: true,
        }
    }
}

/// Full configuration of a [`MultiHeadAttentionBlock`](crate::mab::MultiHeadAttentionBlock).
#[derive(Debug, Clone, PartialEq)]
pub struct MabConfig {
    /// Feature dimension of the query set.
    pub dim_x: usize,
    /// Feature dimension of the key/value set.
    pub dim_y: usize,
    /// Attention (and output) dimension.
    pub dim: usize,
    /// Shared block options.
    pub options: BlockOptions,
}

impl MabConfig {
    /// Creates a configuration with default options.
    pub fn new(dim_x: usize, dim_y: usize, dim: usize) -> Self {
        Self::with_options(dim_x, dim_y, dim, BlockOptions::default())
    }

    /// Creates a configuration with explicit options.
    pub fn with_options(dim_x: usize, dim_y: usize, dim: usize, options: BlockOptions) -> Self {
        Self {
            dim_x,
            dim_y,
            dim,
            options,
        }
    }

    /// Width of a single attention head.
    pub fn head_dim(&self) -> usize {
        self.dim / self.options.num_heads
    }

    /// Checks the structural invariants that must hold before construction.
    pub fn validate(&self) -> Result<(), SetAttentionError> {
        if self.dim_x == 0 {
            return Err(SetAttentionError::ZeroDimension { name: "dim_x" });
        }
        if self.dim_y == 0 {
            return Err(SetAttentionError::ZeroDimension { name: "dim_y" });
        }
        if self.dim == 0 {
            return Err(SetAttentionError::ZeroDimension { name: "dim" });
        }
        if self.options.num_heads == 0 {
            return Err(SetAttentionError::ZeroDimension { name: "num_heads" });
        }
        if self.dim % self.options.num_heads != 0 {
            return Err(SetAttentionError::HeadDivisibility {
                dim: self.dim,
                num_heads: self.options.num_heads,
            });
        }
        if let Some(p) = self.options.dropout_p {
            if !(0.0..1.0).contains(&p) {
                return Err(SetAttentionError::DropoutProbability { p });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_documented_values() {
        let options = BlockOptions::default();
        assert_eq!(options.num_heads, 4);
        assert!(!options.layer_norm);
        assert!(options.dropout_p.is_none());
        assert!(options.residual);
    }

    #[test]
    fn validate_accepts_divisible_heads() {
        let config = MabConfig::new(8, 8, 16);
        assert!(config.validate().is_ok());
        assert_eq!(config.head_dim(), 4);
    }

    #[test]
    fn validate_rejects_indivisible_heads() {
        let mut config = MabConfig::new(8, 8, 10);
        config.options.num_heads = 4;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            SetAttentionError::HeadDivisibility {
                dim: 10,
                num_heads: 4
            }
        ));
    }

    #[test]
    fn validate_rejects_zero_dimensions() {
        let config = MabConfig::new(0, 8, 16);
        assert!(matches!(
            config.validate().unwrap_err(),
            SetAttentionError::ZeroDimension { name: "dim_x" }
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_dropout() {
        let mut config = MabConfig::new(8, 8, 16);
        config.options.dropout_p = Some(1.0);
        assert!(matches!(
            config.validate().unwrap_err(),
            SetAttentionError::DropoutProbability { .. }
        ));
    }
}
