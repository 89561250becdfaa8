//! Pooling a variable-size set down to learned summary vectors.
//!
//! [`PoolingByMultiHeadAttention`] holds a fixed number of learned seed
//! queries; [`AdaptivePooling`] starts from a single seed and grows the
//! collection at call time, so the summary cardinality can be chosen per
//! forward pass.

use candle_core::{bail, Result, Shape, Tensor};
use candle_nn::{Init, VarBuilder};

use crate::checks;
use crate::config::{BlockOptions, MabConfig};
use crate::errors::SetAttentionError;
use crate::mab::MultiHeadAttentionBlock;

/// Xavier/Glorot uniform sample for a seed parameter with the given fan pair.
fn xavier_uniform_seed<S: Into<Shape>>(
    vb: &VarBuilder,
    name: &str,
    shape: S,
    fan_in: usize,
    fan_out: usize,
) -> Result<Tensor> {
    let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
    vb.get_with_hints(
        shape,
        name,
        Init::Uniform {
            lo: -bound,
            up: bound,
        },
    )
}

/// Pools a set onto `num_inds` learned seed vectors.
///
/// The seeds are parameters, not derived from the input: they persist across
/// calls and are updated only by the external optimizer. The output
/// `[batch, num_inds, dim]` is a permutation-invariant summary of the
/// (variable-size, possibly masked) input set.
#[derive(Debug)]
pub struct PoolingByMultiHeadAttention {
    seeds: Tensor,
    mab: MultiHeadAttentionBlock,
}

impl PoolingByMultiHeadAttention {
    pub fn new(
        dim_x: usize,
        dim: usize,
        num_inds: usize,
        options: BlockOptions,
        vb: VarBuilder,
    ) -> std::result::Result<Self, SetAttentionError> {
        if num_inds == 0 {
            return Err(SetAttentionError::ZeroDimension { name: "num_inds" });
        }
        let seeds = xavier_uniform_seed(&vb, "seeds", (num_inds, dim), dim, num_inds)?;
        // Seeds act as queries of width `dim`; the input set provides keys.
        let config = MabConfig::with_options(dim, dim_x, dim, options);
        let mab = MultiHeadAttentionBlock::new(config, vb.pp("mab"))?;
        Ok(Self { seeds, mab })
    }

    /// The learned `[num_inds, dim]` seed tensor.
    pub fn seeds(&self) -> &Tensor {
        &self.seeds
    }

    /// Number of summary vectors this pool produces.
    pub fn num_seeds(&self) -> usize {
        self.seeds.dims()[0]
    }

    /// Attends the seeds onto `x`, yielding `[batch, num_inds, dim]`.
    pub fn forward(&self, x: &Tensor, mask: Option<&Tensor>, train: bool) -> Result<Tensor> {
        let (batch, _) = checks::expect_set_tensor("pma.input", x, self.mab.config().dim_y)?;
        let seeds = self.seeds.unsqueeze(0)?.repeat((batch, 1, 1))?;
        self.mab.forward(&seeds, x, mask, train)
    }
}

/// Pooling whose summary count is chosen at call time.
///
/// A `[1, 1, dim]` initial seed is grown by `num_iters - 1` self-pooling
/// steps; each new summary vector is produced by attending the accumulated
/// seed collection onto itself, then the whole collection attends over the
/// input set once.
#[derive(Debug)]
pub struct AdaptivePooling {
    seed: Tensor,
    pma: PoolingByMultiHeadAttention,
    mab: MultiHeadAttentionBlock,
}

impl AdaptivePooling {
    pub fn new(
        dim_x: usize,
        dim: usize,
        options: BlockOptions,
        vb: VarBuilder,
    ) -> std::result::Result<Self, SetAttentionError> {
        let seed = xavier_uniform_seed(&vb, "seed", (1, 1, dim), dim, 1)?;
        let pma = PoolingByMultiHeadAttention::new(dim, dim, 1, options.clone(), vb.pp("pma"))?;
        let config = MabConfig::with_options(dim, dim_x, dim, options);
        let mab = MultiHeadAttentionBlock::new(config, vb.pp("mab"))?;
        Ok(Self { seed, pma, mab })
    }

    /// The learned `[1, 1, dim]` initial seed.
    pub fn seed(&self) -> &Tensor {
        &self.seed
    }

    /// Grows the summary collection to `num_iters` vectors, then attends it
    /// onto `x`, returning `[batch, num_iters, dim]`.
    ///
    /// Each grown seed depends on all previous ones, so the growth loop is
    /// inherently sequential.
    pub fn forward(&self, x: &Tensor, num_iters: usize, train: bool) -> Result<Tensor> {
        if num_iters == 0 {
            bail!("adaptive pooling requires num_iters >= 1");
        }
        let (batch, _) = checks::expect_set_tensor("apma.input", x, self.mab.config().dim_y)?;

        let mut grown = self.seed.clone();
        for _ in 1..num_iters {
            let next = self.pma.forward(&grown, None, train)?;
            grown = Tensor::cat(&[&grown, &next], 1)?;
        }

        self.mab.forward(&grown.repeat((batch, 1, 1))?, x, None, train)
    }
}
