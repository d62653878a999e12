//! ResNet block implementations.
//!
//! This module contains the building blocks for ResNet: BasicBlock, Bottleneck, and LayerBlock.
//! Field names follow torchvision so checkpoints map onto them with few key remaps.

use core::f64::consts::SQRT_2;

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
    },
    prelude::*,
};

const fn kaiming_normal() -> Initializer {
    Initializer::KaimingNormal {
        gain: SQRT_2,
        fan_out_only: true,
    }
}

#[derive(Module, Debug)]
pub enum ResidualBlock<B: Backend> {
    /// A bottleneck residual block.
    Bottleneck(Bottleneck<B>),
    /// A basic residual block.
    Basic(BasicBlock<B>),
}

impl<B: Backend> ResidualBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Self::Basic(block) => block.forward(input),
            Self::Bottleneck(block) => block.forward(input),
        }
    }
}

/// ResNet basic residual block implementation.
/// Derived from torchvision.models.resnet.BasicBlock
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    relu: Relu,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    downsample: Option<Downsample<B>>,
}

impl<B: Backend> BasicBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = input.clone();

        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);

        // Skip connection
        let out = match &self.downsample {
            Some(downsample) => out + downsample.forward(identity),
            None => out + identity,
        };

        self.relu.forward(out)
    }

    /// Create a new BasicBlock.
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &Device<B>) -> Self {
        // conv3x3
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .with_initializer(kaiming_normal())
            .init(device);
        let bn1 = BatchNormConfig::new(out_channels).init(device);

        // conv3x3
        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .with_initializer(kaiming_normal())
            .init(device);
        let bn2 = BatchNormConfig::new(out_channels).init(device);

        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1,
            bn1,
            relu: Relu::new(),
            conv2,
            bn2,
            downsample,
        }
    }
}

/// ResNet bottleneck residual block implementation.
/// Derived from torchvision.models.resnet.Bottleneck
///
/// **NOTE:** Following common practice, this bottleneck block places the stride for downsampling
/// to the second 3x3 convolution while the original paper places it to the first 1x1 convolution.
/// This variant improves the accuracy and is known as ResNet V1.5.
///
/// The 3x3 convolution is grouped for ResNeXt variants.
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    relu: Relu,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    conv3: Conv2d<B>,
    bn3: BatchNorm<B, 2>,
    downsample: Option<Downsample<B>>,
}

impl<B: Backend> Bottleneck<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = input.clone();

        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv3.forward(out);
        let out = self.bn3.forward(out);

        // Skip connection
        let out = match &self.downsample {
            Some(downsample) => out + downsample.forward(identity),
            None => out + identity,
        };

        self.relu.forward(out)
    }

    /// Create a new Bottleneck.
    ///
    /// `width` is the channel count of the inner 3x3 convolution and must be divisible by `groups`.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        groups: usize,
        width: usize,
        device: &Device<B>,
    ) -> Self {
        // conv1x1
        let conv1 = Conv2dConfig::new([in_channels, width], [1, 1])
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(0, 0))
            .with_bias(false)
            .with_initializer(kaiming_normal())
            .init(device);
        let bn1 = BatchNormConfig::new(width).init(device);

        // conv3x3
        let conv2 = Conv2dConfig::new([width, width], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_groups(groups)
            .with_bias(false)
            .with_initializer(kaiming_normal())
            .init(device);
        let bn2 = BatchNormConfig::new(width).init(device);

        // conv1x1
        let conv3 = Conv2dConfig::new([width, out_channels], [1, 1])
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(0, 0))
            .with_bias(false)
            .with_initializer(kaiming_normal())
            .init(device);
        let bn3 = BatchNormConfig::new(out_channels).init(device);

        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1,
            bn1,
            relu: Relu::new(),
            conv2,
            bn2,
            conv3,
            bn3,
            downsample,
        }
    }
}

/// Downsample layer applies a 1x1 conv to reduce the resolution (H, W) and adjust the number of channels.
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv.forward(input);
        self.bn.forward(out)
    }

    /// Create a new Downsample.
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &Device<B>) -> Self {
        // conv1x1
        let conv = Conv2dConfig::new([in_channels, out_channels], [1, 1])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(0, 0))
            .with_bias(false)
            .with_initializer(kaiming_normal())
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self { conv, bn }
    }
}

/// Shape of the residual blocks inside one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Two 3x3 convolutions, expansion 1.
    Basic,
    /// 1x1 reduce, grouped 3x3, 1x1 expand, expansion 4.
    Bottleneck {
        /// Number of groups in the 3x3 convolution.
        groups: usize,
        /// Channels per group at the narrowest layer.
        width_per_group: usize,
    },
}

impl BlockKind {
    /// Channel multiplier between a layer's planes and its output.
    pub const fn expansion(&self) -> usize {
        match self {
            Self::Basic => 1,
            Self::Bottleneck { .. } => 4,
        }
    }
}

/// Collection of sequential residual blocks.
#[derive(Module, Debug)]
pub struct LayerBlock<B: Backend> {
    blocks: Vec<ResidualBlock<B>>,
}

impl<B: Backend> LayerBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut out = input;
        for block in &self.blocks {
            out = block.forward(out);
        }
        out
    }

    /// Number of residual blocks in this layer.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether this layer has no residual blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Create a new LayerBlock with `planes * expansion` output channels.
    pub fn new(
        num_blocks: usize,
        in_channels: usize,
        planes: usize,
        stride: usize,
        kind: BlockKind,
        device: &Device<B>,
    ) -> Self {
        let out_channels = planes * kind.expansion();
        let blocks = (0..num_blocks)
            .map(|b| {
                // First block uses the specified stride and adapts the channel count
                let (block_in, block_stride) = if b == 0 {
                    (in_channels, stride)
                } else {
                    (out_channels, 1)
                };
                match kind {
                    BlockKind::Basic => ResidualBlock::Basic(BasicBlock::new(
                        block_in,
                        out_channels,
                        block_stride,
                        device,
                    )),
                    BlockKind::Bottleneck {
                        groups,
                        width_per_group,
                    } => {
                        let width = planes * width_per_group / 64 * groups;
                        ResidualBlock::Bottleneck(Bottleneck::new(
                            block_in,
                            out_channels,
                            block_stride,
                            groups,
                            width,
                            device,
                        ))
                    }
                }
            })
            .collect();

        Self { blocks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Distribution};

    type TestBackend = NdArray<f32>;

    #[test]
    fn basic_layer_downsamples_once() {
        let device = Default::default();
        let layer = LayerBlock::<TestBackend>::new(2, 16, 32, 2, BlockKind::Basic, &device);

        let input = Tensor::random([1, 16, 8, 8], Distribution::Normal(0.0, 1.0), &device);
        let output = layer.forward(input);

        assert_eq!(layer.len(), 2);
        assert_eq!(output.dims(), [1, 32, 4, 4]);
    }

    #[test]
    fn grouped_bottleneck_layer_expands_channels() {
        let device = Default::default();
        let kind = BlockKind::Bottleneck {
            groups: 4,
            width_per_group: 4,
        };
        let layer = LayerBlock::<TestBackend>::new(1, 16, 16, 1, kind, &device);

        let input = Tensor::random([1, 16, 6, 6], Distribution::Normal(0.0, 1.0), &device);
        let output = layer.forward(input);

        assert_eq!(output.dims(), [1, 64, 6, 6]);
    }
}
