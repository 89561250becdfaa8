//! Induced set attention: pool to inducing points, then attend back.
//!
//! Full self-attention over a set of `n` elements costs `O(n^2)`. An induced
//! block first pools the set down to `num_inds` inducing points, then attends
//! the original set onto that small pooled set, which is linear in `n` at the
//! cost of an information bottleneck of width `num_inds`.

use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;

use crate::config::{BlockOptions, MabConfig};
use crate::errors::SetAttentionError;
use crate::mab::MultiHeadAttentionBlock;
use crate::pma::PoolingByMultiHeadAttention;

/// Two-stage attention block with learned inducing points.
#[derive(Debug)]
pub struct InducedSetAttentionBlock {
    pma: PoolingByMultiHeadAttention,
    mab: MultiHeadAttentionBlock,
}

impl InducedSetAttentionBlock {
    pub fn new(
        dim_x: usize,
        dim: usize,
        num_inds: usize,
        options: BlockOptions,
        vb: VarBuilder,
    ) -> std::result::Result<Self, SetAttentionError> {
        let pma =
            PoolingByMultiHeadAttention::new(dim_x, dim, num_inds, options.clone(), vb.pp("pma"))?;
        let config = MabConfig::with_options(dim_x, dim, dim, options);
        let mab = MultiHeadAttentionBlock::new(config, vb.pp("mab"))?;
        Ok(Self { pma, mab })
    }

    pub fn num_inducing_points(&self) -> usize {
        self.pma.num_seeds()
    }

    /// Pools `x` down to the inducing points, then attends the full set back
    /// onto them. The pooled set has no invalid positions by construction,
    /// so the second stage runs unmasked.
    pub fn forward(&self, x: &Tensor, mask: Option<&Tensor>, train: bool) -> Result<Tensor> {
        let pooled = self.pma.forward(x, mask, train)?;
        self.mab.forward(x, &pooled, None, train)
    }
}

/// Ordered sequence of induced blocks, chained like
/// [`StackedSetAttention`](crate::sab::StackedSetAttention).
#[derive(Debug)]
pub struct StackedInducedSetAttention {
    blocks: Vec<InducedSetAttentionBlock>,
}

impl StackedInducedSetAttention {
    pub fn new(
        dim_x: usize,
        dim: usize,
        num_inds: usize,
        num_blocks: usize,
        options: BlockOptions,
        vb: VarBuilder,
    ) -> std::result::Result<Self, SetAttentionError> {
        if num_blocks == 0 {
            return Err(SetAttentionError::EmptyStack);
        }
        let mut blocks = Vec::with_capacity(num_blocks);
        blocks.push(InducedSetAttentionBlock::new(
            dim_x,
            dim,
            num_inds,
            options.clone(),
            vb.pp("isab_0"),
        )?);
        for i in 1..num_blocks {
            blocks.push(InducedSetAttentionBlock::new(
                dim,
                dim,
                num_inds,
                options.clone(),
                vb.pp(format!("isab_{i}")),
            )?);
        }
        Ok(Self { blocks })
    }

    pub fn depth(&self) -> usize {
        self.blocks.len()
    }

    /// Applies each block in order; the mask feeds every block's pooling step.
    pub fn forward(&self, x: &Tensor, mask: Option<&Tensor>, train: bool) -> Result<Tensor> {
        let mut x = x.clone();
        for block in &self.blocks {
            x = block.forward(&x, mask, train)?;
        }
        Ok(x)
    }
}
