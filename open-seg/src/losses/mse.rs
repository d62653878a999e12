//! Mean Squared Error (L2) loss.

use burn::prelude::*;

use super::probabilities;

/// Mean squared error between predicted probabilities and the target.
#[derive(Module, Debug)]
pub struct MseLoss<B: Backend> {
    _phantom: std::marker::PhantomData<B>,
}

impl<B: Backend> Default for MseLoss<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> MseLoss<B> {
    pub const fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }

    /// Calculate MSE loss.
    pub fn forward(&self, logits: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
        (probabilities(logits) - target).powi_scalar(2).mean()
    }
}
