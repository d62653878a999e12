//! Prediction head turning decoder features into per-class logits.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
};
use burn_extra_ops::{Upsample, UpsampleConfig, UpsampleMode};

/// Configuration for the `SegmentationHead` module.
#[derive(Config, Debug)]
pub struct SegmentationHeadConfig {
    /// Number of output channels, one logit map per class.
    #[config(default = "1")]
    pub num_classes: usize,
    /// Odd kernel size of the output convolution.
    #[config(default = "3")]
    pub kernel_size: usize,
    /// Integer factor the head upsamples by before the convolution.
    #[config(default = "1")]
    pub upsampling: usize,
}

impl SegmentationHeadConfig {
    /// Initializes a head reading `in_channels` feature channels.
    pub fn init<B: Backend>(&self, in_channels: usize, device: &B::Device) -> SegmentationHead<B> {
        let padding = self.kernel_size / 2;

        SegmentationHead {
            upsample: (self.upsampling > 1).then(|| {
                UpsampleConfig::new()
                    .with_scale_factor(self.upsampling)
                    .with_mode(UpsampleMode::Bilinear)
                    .init()
            }),
            conv: Conv2dConfig::new(
                [in_channels, self.num_classes],
                [self.kernel_size, self.kernel_size],
            )
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .init(device),
            num_classes: self.num_classes,
        }
    }
}

/// Optional bilinear upsampling followed by a convolution to class logits.
#[derive(Module, Debug)]
pub struct SegmentationHead<B: Backend> {
    upsample: Option<Upsample>,
    conv: Conv2d<B>,
    num_classes: usize,
}

impl<B: Backend> SegmentationHead<B> {
    /// # Shapes
    /// - input: `[batch_size, in_channels, height, width]`
    /// - output: `[batch_size, num_classes, height * upsampling, width * upsampling]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.upsample {
            Some(upsample) => upsample.forward(x),
            None => x,
        };
        self.conv.forward(x)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Spatial factor between the head's input and its logits.
    pub fn upsampling(&self) -> usize {
        self.upsample
            .as_ref()
            .map_or(1, |upsample| upsample.scale_factor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Distribution};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_head_keeps_resolution() {
        let device = Default::default();
        let head = SegmentationHeadConfig::new()
            .with_num_classes(3)
            .init::<TestBackend>(16, &device);
        let x = Tensor::random([2, 16, 10, 12], Distribution::Default, &device);

        let output = head.forward(x);

        assert_eq!(output.dims(), [2, 3, 10, 12]);
        assert_eq!(head.num_classes(), 3);
        assert_eq!(head.upsampling(), 1);
    }

    #[test]
    fn test_head_upsamples() {
        let device = Default::default();
        let head = SegmentationHeadConfig::new()
            .with_kernel_size(1)
            .with_upsampling(4)
            .init::<TestBackend>(8, &device);
        let x = Tensor::random([1, 8, 5, 5], Distribution::Default, &device);

        let output = head.forward(x);

        assert_eq!(output.dims(), [1, 1, 20, 20]);
        assert_eq!(head.upsampling(), 4);
    }
}
