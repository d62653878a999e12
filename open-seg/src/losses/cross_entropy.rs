//! Per-pixel multi-class cross-entropy.

use burn::{
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig},
    prelude::*,
};

/// Cross-entropy over the channel axis of every pixel.
///
/// A single-channel target holds class indices. A multi-channel target is read as one-hot
/// (or soft) labels and reduced to indices with an argmax over channels.
#[derive(Module, Debug)]
pub struct PixelCrossEntropyLoss<B: Backend> {
    inner: CrossEntropyLoss<B>,
}

impl<B: Backend> PixelCrossEntropyLoss<B> {
    pub fn new(device: &B::Device) -> Self {
        Self {
            inner: CrossEntropyLossConfig::new().init(device),
        }
    }

    /// Mean cross-entropy over every pixel.
    ///
    /// # Shapes
    /// - logits: `[batch_size, num_classes, height, width]`
    /// - target: `[batch_size, 1 | num_classes, height, width]`
    pub fn forward(&self, logits: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
        let [batch_size, num_classes, height, width] = logits.dims();
        let pixels = batch_size * height * width;

        let classes = if target.dims()[1] == 1 {
            target.int().reshape([pixels])
        } else {
            target.argmax(1).reshape([pixels])
        };
        let logits = logits.permute([0, 2, 3, 1]).reshape([pixels, num_classes]);

        self.inner.forward(logits, classes)
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
    fn test_index_and_one_hot_targets_agree() {
        let device = Default::default();
        let loss = PixelCrossEntropyLoss::<TestBackend>::new(&device);
        // Two pixels, three classes.
        let logits = Tensor::<TestBackend, 4>::from_floats(
            [[[[2.0, 0.0]], [[0.0, 1.0]], [[-1.0, 0.5]]]],
            &device,
        );
        let indices = Tensor::<TestBackend, 4>::from_floats([[[[0.0, 2.0]]]], &device);
        let one_hot = Tensor::<TestBackend, 4>::from_floats(
            [[[[1.0, 0.0]], [[0.0, 0.0]], [[0.0, 1.0]]]],
            &device,
        );

        let from_indices = loss.forward(logits.clone(), indices);
        let from_one_hot = loss.forward(logits, one_hot);

        from_indices
            .into_data()
            .assert_approx_eq::<f32>(&from_one_hot.into_data(), Tolerance::default());
    }

    #[test]
    fn test_uniform_logits_give_log_num_classes() {
        let device = Default::default();
        let loss = PixelCrossEntropyLoss::<TestBackend>::new(&device);
        let logits = Tensor::<TestBackend, 4>::zeros([2, 4, 3, 3], &device);
        let target = Tensor::<TestBackend, 4>::ones([2, 1, 3, 3], &device);

        let value = loss.forward(logits, target);

        value
            .into_data()
            .assert_approx_eq::<f32>(&TensorData::from([4.0f32.ln()]), Tolerance::default());
    }
}
