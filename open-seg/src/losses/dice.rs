//! Soft Dice loss.

use burn::prelude::*;

use super::probabilities;

/// Configuration for Dice Loss.
#[derive(Config, Debug)]
pub struct DiceLossConfig {
    /// Added to numerator and denominator so empty masks give a defined loss.
    #[config(default = 1.0)]
    pub smooth: f64,
}

/// Soft Dice loss: `1 - (2 |P ∩ T| + s) / (|P| + |T| + s)`.
#[derive(Module, Debug)]
pub struct DiceLoss<B: Backend> {
    pub smooth: f64,
    _phantom: std::marker::PhantomData<B>,
}

impl DiceLossConfig {
    /// Initialize a new Dice loss with the given configuration.
    pub const fn init<B: Backend>(&self) -> DiceLoss<B> {
        DiceLoss {
            smooth: self.smooth,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<B: Backend> Default for DiceLoss<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> DiceLoss<B> {
    /// Create a new Dice loss with default configuration.
    pub fn new() -> Self {
        DiceLossConfig::new().init()
    }

    /// # Shapes
    /// - logits: `[batch_size, channels, height, width]`
    /// - target: same shape as `logits`, values in `[0, 1]`
    pub fn forward(&self, logits: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
        let probs = probabilities(logits);

        let intersection = (probs.clone() * target.clone()).sum();
        let cardinality = probs.sum() + target.sum();
        let dice = intersection.mul_scalar(2.0).add_scalar(self.smooth)
            / cardinality.add_scalar(self.smooth);

        dice.neg().add_scalar(1.0)
    }
}
