//! Mean Absolute Error (L1) loss.

use burn::prelude::*;

use super::probabilities;

/// Mean absolute error between predicted probabilities and the target.
#[derive(Module, Debug)]
pub struct MaeLoss<B: Backend> {
    _phantom: std::marker::PhantomData<B>,
}

impl<B: Backend> Default for MaeLoss<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> MaeLoss<B> {
    pub const fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }

    /// Calculate MAE loss.
    pub fn forward(&self, logits: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
        (probabilities(logits) - target).abs().mean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::NdArray,
        tensor::{TensorData, Tolerance},
    };

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_mae_on_sigmoid_probabilities() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 4>::zeros([1, 1, 2, 2], &device);
        let target = Tensor::<TestBackend, 4>::zeros([1, 1, 2, 2], &device);

        let loss = MaeLoss::new().forward(logits, target);

        loss.into_data()
            .assert_approx_eq::<f32>(&TensorData::from([0.5]), Tolerance::default());
    }
}
