//! Lightweight shape validation helpers shared across blocks.
//!
//! These routines return `candle_core::Result` so call sites can propagate
//! contract violations with `?` instead of panicking, and they report the
//! offending shapes alongside the expected layout.

use candle_core::{Error, Result, Tensor};

/// Validates the `[batch, n, features]` set-tensor convention and returns `(batch, n)`.
pub fn expect_set_tensor(name: &str, tensor: &Tensor, features: usize) -> Result<(usize, usize)> {
    match tensor.dims() {
        [batch, n, d] if *d == features => Ok((*batch, *n)),
        dims => Err(Error::Msg(format!(
            "{name} expects [batch, n, {features}], got {dims:?}"
        ))),
    }
}

/// Validates a `[batch, n]` validity mask against the key/value set it guards.
pub fn expect_mask(name: &str, mask: &Tensor, batch: usize, n: usize) -> Result<()> {
    match mask.dims() {
        [mb, mn] if *mb == batch && *mn == n => Ok(()),
        dims => Err(Error::Msg(format!(
            "{name} expects [{batch}, {n}], got {dims:?}"
        ))),
    }
}
