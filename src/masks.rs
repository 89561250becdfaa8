//! Builders for set validity masks.
//!
//! Masks are `[batch, n]` tensors of dtype `f32` holding `1.0` for valid and
//! `0.0` for padded positions. They guard the key/value operand of attention;
//! queries are never masked.

use candle_core::{DType, Device, Error, Result, Tensor};

/// Dtype shared by all validity masks.
pub const MASK_DTYPE: DType = DType::F32;

/// Builds a validity mask from per-batch element counts.
///
/// Lengths larger than `max_len` are clamped.
pub fn validity_mask_from_lengths(
    device: &Device,
    lengths: &[usize],
    max_len: usize,
) -> Result<Tensor> {
    let batch = lengths.len();
    let mut data = vec![0f32; batch * max_len];
    for (b, &valid) in lengths.iter().enumerate() {
        let valid = valid.min(max_len);
        for i in 0..valid {
            data[b * max_len + i] = 1.0;
        }
    }
    Tensor::from_vec(data, (batch, max_len), device)
}

/// Builds a validity mask from boolean rows (`true` marks a valid element).
///
/// All rows must share the same length.
pub fn validity_mask_from_booleans(device: &Device, valid: &[Vec<bool>]) -> Result<Tensor> {
    if valid.is_empty() {
        return Tensor::zeros((0, 0), MASK_DTYPE, device);
    }

    let n = valid[0].len();
    for row in valid.iter() {
        if row.len() != n {
            return Err(Error::Msg(format!(
                "validity rows must share one length, got {} and {n}",
                row.len()
            )));
        }
    }

    let mut data = Vec::with_capacity(valid.len() * n);
    for row in valid.iter() {
        for &flag in row {
            data.push(if flag { 1.0f32 } else { 0.0 });
        }
    }

    Tensor::from_vec(data, (valid.len(), n), device)
}
