//! Binary cross-entropy on logits.

use burn::prelude::*;

/// Binary cross-entropy computed directly from logits.
///
/// Uses `max(x, 0) - x * y + log(1 + exp(-|x|))`, which stays finite for large logits.
#[derive(Module, Debug)]
pub struct BinaryCrossEntropyLoss<B: Backend> {
    _phantom: std::marker::PhantomData<B>,
}

impl<B: Backend> Default for BinaryCrossEntropyLoss<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> BinaryCrossEntropyLoss<B> {
    pub const fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }

    /// Mean BCE over every element.
    ///
    /// # Panics
    ///
    /// Panics if `logits` and `target` have different shapes.
    pub fn forward<const D: usize>(
        &self,
        logits: Tensor<B, D>,
        target: Tensor<B, D>,
    ) -> Tensor<B, 1> {
        assert_eq!(
            logits.dims(),
            target.dims(),
            "BCE logits and target shapes differ"
        );

        let positive = logits.clone().clamp_min(0.0);
        let log_term = logits.clone().abs().neg().exp().log1p();

        (positive - logits * target + log_term).mean()
    }
}
