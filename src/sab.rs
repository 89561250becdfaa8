//! Self-attention over a set and its stacked composition.

use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;

use crate::config::{BlockOptions, MabConfig};
use crate::errors::SetAttentionError;
use crate::mab::MultiHeadAttentionBlock;

/// Self-attention block: every element attends to every element of its set.
///
/// Cost is quadratic in set size; use
/// [`InducedSetAttentionBlock`](crate::isab::InducedSetAttentionBlock) for
/// large sets.
#[derive(Debug)]
pub struct SetAttentionBlock {
    mab: MultiHeadAttentionBlock,
}

impl SetAttentionBlock {
    /// Creates a block mapping `[batch, n, dim_x]` to `[batch, n, dim]`.
    pub fn new(
        dim_x: usize,
        dim: usize,
        options: BlockOptions,
        vb: VarBuilder,
    ) -> std::result::Result<Self, SetAttentionError> {
        let config = MabConfig::with_options(dim_x, dim_x, dim, options);
        let mab = MultiHeadAttentionBlock::new(config, vb.pp("mab"))?;
        Ok(Self { mab })
    }

    pub fn config(&self) -> &MabConfig {
        self.mab.config()
    }

    /// Self-attention forward pass, subject to the optional validity mask.
    pub fn forward(&self, x: &Tensor, mask: Option<&Tensor>, train: bool) -> Result<Tensor> {
        self.mab.forward(x, x, mask, train)
    }
}

/// Ordered sequence of self-attention blocks.
///
/// The first block maps `dim_x` to `dim`; all subsequent blocks preserve
/// `dim`. The mask marks structurally invalid positions, which does not
/// change across depth, so it is reused unchanged at every block.
#[derive(Debug)]
pub struct StackedSetAttention {
    blocks: Vec<SetAttentionBlock>,
}

impl StackedSetAttention {
    pub fn new(
        dim_x: usize,
        dim: usize,
        num_blocks: usize,
        options: BlockOptions,
        vb: VarBuilder,
    ) -> std::result::Result<Self, SetAttentionError> {
        if num_blocks == 0 {
            return Err(SetAttentionError::EmptyStack);
        }
        let mut blocks = Vec::with_capacity(num_blocks);
        blocks.push(SetAttentionBlock::new(
            dim_x,
            dim,
            options.clone(),
            vb.pp("sab_0"),
        )?);
        for i in 1..num_blocks {
            blocks.push(SetAttentionBlock::new(
                dim,
                dim,
                options.clone(),
                vb.pp(format!("sab_{i}")),
            )?);
        }
        Ok(Self { blocks })
    }

    /// Number of blocks in the stack.
    pub fn depth(&self) -> usize {
        self.blocks.len()
    }

    /// Applies each block in order, passing `mask` unchanged to all of them.
    pub fn forward(&self, x: &Tensor, mask: Option<&Tensor>, train: bool) -> Result<Tensor> {
        let mut x = x.clone();
        for block in &self.blocks {
            x = block.forward(&x, mask, train)?;
        }
        Ok(x)
    }
}
