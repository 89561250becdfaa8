//! The multi-head attention block every other component is built from.
//!
//! [`MultiHeadAttentionBlock::forward`] attends a query set
//! `[batch, nx, dim_x]` onto a key/value set `[batch, ny, dim_y]` and returns
//! `[batch, nx, dim]`. An optional `[batch, ny]` validity mask drops invalid
//! key positions; a row whose keys are all invalid contributes an
//! exactly-zero attention output instead of propagating NaN.

use candle_core::{bail, Result, Tensor, D};
use candle_nn::ops::softmax_last_dim;
use candle_nn::{Dropout, LayerNorm, Linear, Module, VarBuilder};

use crate::checks;
use crate::config::MabConfig;
use crate::errors::SetAttentionError;

/// Multi-head attention with optional masking, layer norm, and dropout.
#[derive(Debug)]
pub struct MultiHeadAttentionBlock {
    config: MabConfig,
    fc_q: Linear,
    fc_k: Linear,
    fc_v: Linear,
    fc_o: Linear,
    ln1: Option<LayerNorm>,
    ln2: Option<LayerNorm>,
    dropout1: Option<Dropout>,
    dropout2: Option<Dropout>,
}

fn norm(ln: &Option<LayerNorm>, tensor: &Tensor) -> Result<Tensor> {
    match ln {
        Some(ln) => ln.forward(tensor),
        None => Ok(tensor.clone()),
    }
}

fn apply_dropout(dropout: &Option<Dropout>, tensor: &Tensor, train: bool) -> Result<Tensor> {
    match dropout {
        Some(dropout) => dropout.forward(tensor, train),
        None => Ok(tensor.clone()),
    }
}

impl MultiHeadAttentionBlock {
    /// Creates the block and registers its parameters under `vb`.
    ///
    /// Fails fast when the configuration violates a structural invariant,
    /// most notably when `dim` is not divisible by `num_heads`.
    pub fn new(
        config: MabConfig,
        vb: VarBuilder,
    ) -> std::result::Result<Self, SetAttentionError> {
        config.validate()?;

        let fc_q = candle_nn::linear(config.dim_x, config.dim, vb.pp("fc_q"))?;
        let fc_k = candle_nn::linear(config.dim_y, config.dim, vb.pp("fc_k"))?;
        let fc_v = candle_nn::linear(config.dim_y, config.dim, vb.pp("fc_v"))?;
        let fc_o = candle_nn::linear(config.dim, config.dim, vb.pp("fc_o"))?;

        let (ln1, ln2) = if config.options.layer_norm {
            (
                Some(candle_nn::layer_norm(config.dim, 1e-5, vb.pp("ln1"))?),
                Some(candle_nn::layer_norm(config.dim, 1e-5, vb.pp("ln2"))?),
            )
        } else {
            (None, None)
        };
        let dropout1 = config.options.dropout_p.map(Dropout::new);
        let dropout2 = config.options.dropout_p.map(Dropout::new);

        log::debug!(
            "mab init dim_x={} dim_y={} dim={} heads={} layer_norm={} dropout_p={:?} residual={}",
            config.dim_x,
            config.dim_y,
            config.dim,
            config.options.num_heads,
            config.options.layer_norm,
            config.options.dropout_p,
            config.options.residual
        );

        Ok(Self {
            config,
            fc_q,
            fc_k,
            fc_v,
            fc_o,
            ln1,
            ln2,
            dropout1,
            dropout2,
        })
    }

    /// Returns the static configuration used to validate inputs.
    pub fn config(&self) -> &MabConfig {
        &self.config
    }

    /// Attends `x` onto `y`, returning `[batch, nx, dim]`.
    pub fn forward(
        &self,
        x: &Tensor,
        y: &Tensor,
        mask: Option<&Tensor>,
        train: bool,
    ) -> Result<Tensor> {
        let (batch, nx) = checks::expect_set_tensor("mab.queries", x, self.config.dim_x)?;
        let (batch_y, ny) = checks::expect_set_tensor("mab.keys", y, self.config.dim_y)?;
        if batch_y != batch {
            bail!("mab expects matching batch sizes, got {batch} queries and {batch_y} keys");
        }
        if let Some(mask) = mask {
            checks::expect_mask("mab.mask", mask, batch, ny)?;
        }

        let heads = self.config.options.num_heads;
        let q = self.fc_q.forward(x)?;
        let k = self.fc_k.forward(y)?;
        let v = self.fc_v.forward(y)?;

        // [batch, n, dim] -> [batch * heads, n, dim / heads]
        let q_heads = Tensor::cat(&q.chunk(heads, D::Minus1)?, 0)?;
        let k_heads = Tensor::cat(&k.chunk(heads, D::Minus1)?, 0)?;
        let v_heads = Tensor::cat(&v.chunk(heads, D::Minus1)?, 0)?;

        // Logits are scaled by the full attention dimension, not the head width.
        let scale = 1.0 / (self.config.dim as f64).sqrt();
        let logits = q_heads
            .matmul(&k_heads.transpose(D::Minus2, D::Minus1)?)?
            .affine(scale, 0.0)?;

        let weights = match mask {
            Some(mask) => {
                let expanded = mask
                    .unsqueeze(1)?
                    .broadcast_as((batch, nx, ny))?
                    .repeat((heads, 1, 1))?;
                let invalid = expanded.eq(0f64)?;
                let neg_inf = Tensor::full(f32::NEG_INFINITY, logits.shape(), logits.device())?
                    .to_dtype(logits.dtype())?;
                let probs = softmax_last_dim(&invalid.where_cond(&neg_inf, &logits)?)?;
                // Rows with no valid keys softmax to NaN; they must pool to zero.
                let nan = probs.ne(&probs)?;
                nan.where_cond(&probs.zeros_like()?, &probs)?
            }
            None => softmax_last_dim(&logits)?,
        };

        let attn = weights.matmul(&v_heads)?;
        let attn = Tensor::cat(&attn.chunk(heads, 0)?, D::Minus1)?;

        let attn = apply_dropout(&self.dropout1, &attn, train)?;
        // The residual base is the unsplit projected query, not the raw input.
        let first = if self.config.options.residual {
            q.add(&attn)?
        } else {
            attn
        };
        let first = norm(&self.ln1, &first)?;

        let gated = apply_dropout(&self.dropout2, &self.fc_o.forward(&first)?.relu()?, train)?;
        norm(&self.ln2, &first.add(&gated)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BlockOptions;
    use candle_core::{DType, Device};
    use candle_nn::{VarBuilder, VarMap};

    fn max_diff(a: &Tensor, b: &Tensor) -> Result<f32> {
        a.sub(b)?.abs()?.max_all()?.to_vec0::<f32>()
    }

    #[test]
    fn output_shape_covers_asymmetric_sets() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let mut config = MabConfig::new(6, 10, 8);
        config.options.num_heads = 2;
        let mab = MultiHeadAttentionBlock::new(config, vb).unwrap();

        let x = Tensor::randn(0f32, 1.0, (2, 3, 6), &device)?;
        let y = Tensor::randn(0f32, 1.0, (2, 7, 10), &device)?;
        let out = mab.forward(&x, &y, None, false)?;
        assert_eq!(out.dims(), &[2, 3, 8]);
        Ok(())
    }

    #[test]
    fn construction_rejects_indivisible_heads() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let mut config = MabConfig::new(8, 8, 10);
        config.options.num_heads = 4;
        let err = MultiHeadAttentionBlock::new(config, vb).unwrap_err();
        assert!(matches!(err, SetAttentionError::HeadDivisibility { .. }));
    }

    #[test]
    fn forward_rejects_mismatched_feature_dims() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let mab = MultiHeadAttentionBlock::new(MabConfig::new(8, 8, 16), vb).unwrap();
        let x = Tensor::randn(0f32, 1.0, (1, 4, 8), &device)?;
        let y = Tensor::randn(0f32, 1.0, (1, 4, 12), &device)?;
        assert!(mab.forward(&x, &y, None, false).is_err());
        Ok(())
    }

    #[test]
    fn key_order_does_not_change_output() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let mab = MultiHeadAttentionBlock::new(MabConfig::new(8, 8, 16), vb).unwrap();
        let x = Tensor::randn(0f32, 1.0, (1, 3, 8), &device)?;
        let y = Tensor::randn(0f32, 1.0, (1, 5, 8), &device)?;
        let order = Tensor::from_vec(vec![4u32, 2, 0, 3, 1], 5, &device)?;
        let y_shuffled = y.index_select(&order, 1)?;

        let out = mab.forward(&x, &y, None, false)?;
        let out_shuffled = mab.forward(&x, &y_shuffled, None, false)?;
        assert!(max_diff(&out, &out_shuffled)? < 1e-5);
        Ok(())
    }

    #[test]
    fn masked_key_content_never_leaks() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let mab = MultiHeadAttentionBlock::new(MabConfig::new(8, 8, 16), vb).unwrap();
        let x = Tensor::randn(0f32, 1.0, (1, 3, 8), &device)?;
        let mask = Tensor::from_vec(vec![1f32, 1.0, 1.0, 0.0, 0.0], (1, 5), &device)?;

        let valid = Tensor::randn(0f32, 1.0, (1, 3, 8), &device)?;
        let garbage = Tensor::full(1e6f32, (1, 2, 8), &device)?;
        let zeros = Tensor::zeros((1, 2, 8), DType::F32, &device)?;
        let y_garbage = Tensor::cat(&[&valid, &garbage], 1)?;
        let y_zeroed = Tensor::cat(&[&valid, &zeros], 1)?;

        let out_garbage = mab.forward(&x, &y_garbage, Some(&mask), false)?;
        let out_zeroed = mab.forward(&x, &y_zeroed, Some(&mask), false)?;
        assert!(max_diff(&out_garbage, &out_zeroed)? < 1e-5);
        Ok(())
    }

    #[test]
    fn fully_masked_keys_produce_finite_output() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let mab = MultiHeadAttentionBlock::new(MabConfig::new(8, 8, 16), vb).unwrap();
        let x = Tensor::randn(0f32, 1.0, (1, 3, 8), &device)?;
        let y = Tensor::randn(0f32, 1.0, (1, 4, 8), &device)?;
        let mask = Tensor::zeros((1, 4), DType::F32, &device)?;

        let out = mab.forward(&x, &y, Some(&mask), false)?;
        let values = out.flatten_all()?.to_vec1::<f32>()?;
        assert!(values.iter().all(|v| v.is_finite()));
        Ok(())
    }

    #[test]
    fn eval_mode_ignores_dropout() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let mut config = MabConfig::new(8, 8, 16);
        config.options.dropout_p = Some(0.5);
        let mab = MultiHeadAttentionBlock::new(config, vb).unwrap();

        let x = Tensor::randn(0f32, 1.0, (2, 4, 8), &device)?;
        let first = mab.forward(&x, &x, None, false)?;
        let second = mab.forward(&x, &x, None, false)?;
        assert!(max_diff(&first, &second)? < 1e-7);
        Ok(())
    }
}
