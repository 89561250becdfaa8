//! Attention-based, permutation-invariant layers for sets of feature vectors.
//!
//! A set is a `[batch, n, d]` tensor whose order along `n` carries no
//! meaning, optionally paired with a `[batch, n]` validity mask for padded
//! positions (see [`masks`]). [`MultiHeadAttentionBlock`] is the single
//! primitive; self-attention ([`SetAttentionBlock`]), pooling
//! ([`PoolingByMultiHeadAttention`], [`AdaptivePooling`]) and induced
//! attention ([`InducedSetAttentionBlock`]) are compositions of it.
//!
//! Parameters are registered through a [`candle_nn::VarBuilder`] at
//! construction and updated only by an external optimizer holding the
//! `VarMap`; forward passes never mutate state. Dropout is a train-only
//! concern controlled by the `train` flag every forward entry point takes.

pub mod checks;
pub mod config;
pub mod errors;
pub mod isab;
pub mod mab;
pub mod masks;
pub mod pma;
pub mod sab;

pub use config::{BlockOptions, MabConfig};
pub use errors::SetAttentionError;
pub use isab::{InducedSetAttentionBlock, StackedInducedSetAttention};
pub use mab::MultiHeadAttentionBlock;
pub use pma::{AdaptivePooling, PoolingByMultiHeadAttention};
pub use sab::{SetAttentionBlock, StackedSetAttention};
