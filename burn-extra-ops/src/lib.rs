//! Additional operations for the Burn deep learning framework
//!
//! This crate provides operations that are commonly used in segmentation models but are not
//! yet available in the core Burn framework.

use burn::prelude::*;

mod elu;
mod upsample;

// Convenient re-exports
pub use elu::{elu, Elu, EluConfig};
pub use upsample::{resize_to, upsample, Upsample, UpsampleConfig, UpsampleMode};

/// Additional operations for Burn tensors
pub trait TensorExtraOps<B: Backend, const D: usize> {
    /// Apply the exponential linear unit to the tensor
    fn elu(self, alpha: f64) -> Self;
}

impl<B: Backend, const D: usize> TensorExtraOps<B, D> for Tensor<B, D> {
    fn elu(self, alpha: f64) -> Self {
        elu(self, alpha)
    }
}
