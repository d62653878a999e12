//! # Decoder Blocks
//!
//! Building blocks of the decoder stages. Every block takes the running decoder tensor and an
//! optional skip tensor from the encoder. Blocks that upsample double the spatial size of the
//! running tensor first, so the skip must already be at the doubled resolution.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
    },
    prelude::*,
};
use burn_extra_ops::{resize_to, Upsample, UpsampleConfig, UpsampleMode};

use crate::config::DecoderBlockType;

/// Concatenates `skip` after `x` along the channel axis.
///
/// `x` is resized to the skip's spatial size first, which absorbs the off-by-one sizes that odd
/// encoder resolutions leave after upsampling.
fn concat_skip<B: Backend>(x: Tensor<B, 4>, skip: Option<Tensor<B, 4>>) -> Tensor<B, 4> {
    match skip {
        Some(skip) => {
            let [_, _, height, width] = skip.dims();
            let x = resize_to(x, [height, width], &UpsampleMode::Nearest);
            Tensor::cat(vec![x, skip], 1)
        }
        None => x,
    }
}

fn conv<B: Backend>(
    channels: [usize; 2],
    kernel_size: usize,
    initializer: &Initializer,
    device: &Device<B>,
) -> Conv2d<B> {
    let padding = kernel_size / 2;
    Conv2dConfig::new(channels, [kernel_size, kernel_size])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(false)
        .with_initializer(initializer.clone())
        .init(device)
}

/// Configuration for any decoder block. `block_type` picks the implementation.
#[derive(Config, Debug)]
pub struct DecoderBlockConfig {
    pub block_type: DecoderBlockType,
    /// Channels of the running decoder tensor.
    pub in_channels: usize,
    /// Channels of the skip tensor, zero when the stage has none.
    #[config(default = "0")]
    pub skip_channels: usize,
    pub out_channels: usize,
    #[config(default = "2")]
    pub scale_factor: usize,
    #[config(default = "UpsampleMode::Nearest")]
    pub mode: UpsampleMode,
    /// Only read by `Simple` blocks, the other blocks always upsample.
    #[config(default = "false")]
    pub apply_upsample: bool,
    #[config(default = "Initializer::KaimingNormal{gain: core::f64::consts::SQRT_2, fan_out_only: true}")]
    pub initializer: Initializer,
}

impl DecoderBlockConfig {
    /// Initializes the block selected by `block_type`.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> DecoderBlock<B> {
        let upsample = UpsampleConfig::new()
            .with_scale_factor(self.scale_factor)
            .with_mode(self.mode.clone());

        match self.block_type {
            DecoderBlockType::Simple => DecoderBlock::Simple(
                DecoderSimpleBlockConfig::new(self.in_channels, self.out_channels)
                    .with_upsample(self.apply_upsample.then_some(upsample))
                    .with_initializer(self.initializer.clone())
                    .init(device),
            ),
            DecoderBlockType::Basic => DecoderBlock::Basic(
                DecoderBasicBlockConfig::new(self.in_channels, self.out_channels)
                    .with_skip_channels(self.skip_channels)
                    .with_upsample(upsample)
                    .with_initializer(self.initializer.clone())
                    .init(device),
            ),
            DecoderBlockType::Bottleneck => DecoderBlock::Bottleneck(
                DecoderBottleneckBlockConfig::new(self.in_channels, self.out_channels)
                    .with_skip_channels(self.skip_channels)
                    .with_upsample(upsample)
                    .with_initializer(self.initializer.clone())
                    .init(device),
            ),
        }
    }
}

/// A decoder stage of any supported type.
#[derive(Module, Debug)]
pub enum DecoderBlock<B: Backend> {
    Simple(DecoderSimpleBlock<B>),
    Basic(DecoderBasicBlock<B>),
    Bottleneck(DecoderBottleneckBlock<B>),
}

impl<B: Backend> DecoderBlock<B> {
    /// # Shapes
    /// - x: `[batch_size, in_channels, height, width]`
    /// - skip: `[batch_size, skip_channels, height * scale, width * scale]`
    /// - output: `[batch_size, out_channels, height * scale, width * scale]`
    pub fn forward(&self, x: Tensor<B, 4>, skip: Option<Tensor<B, 4>>) -> Tensor<B, 4> {
        match self {
            Self::Simple(block) => block.forward(x, skip),
            Self::Basic(block) => block.forward(x, skip),
            Self::Bottleneck(block) => block.forward(x, skip),
        }
    }
}

/// Configuration for the `DecoderSimpleBlock` module.
#[derive(Config, Debug)]
pub struct DecoderSimpleBlockConfig {
    in_channels: usize,
    out_channels: usize,
    /// Upsampling applied before the convolution. `None` keeps the resolution.
    #[config(default = "None")]
    upsample: Option<UpsampleConfig>,
    #[config(default = "Initializer::KaimingNormal{gain: core::f64::consts::SQRT_2, fan_out_only: true}")]
    initializer: Initializer,
}

impl DecoderSimpleBlockConfig {
    /// Initializes a new `DecoderSimpleBlock` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> DecoderSimpleBlock<B> {
        DecoderSimpleBlock {
            upsample: self.upsample.as_ref().map(UpsampleConfig::init),
            conv: conv(
                [self.in_channels, self.out_channels],
                1,
                &self.initializer,
                device,
            ),
            bn: BatchNormConfig::new(self.out_channels).init(device),
            relu: Relu::new(),
        }
    }
}

/// Pointwise convolution block. The skip tensor is accepted and ignored.
#[derive(Module, Debug)]
pub struct DecoderSimpleBlock<B: Backend> {
    upsample: Option<Upsample>,
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> DecoderSimpleBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>, _skip: Option<Tensor<B, 4>>) -> Tensor<B, 4> {
        let x = match &self.upsample {
            Some(upsample) => upsample.forward(x),
            None => x,
        };
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        self.relu.forward(x)
    }
}

/// Configuration for the `DecoderBasicBlock` module.
#[derive(Config, Debug)]
pub struct DecoderBasicBlockConfig {
    in_channels: usize,
    out_channels: usize,
    #[config(default = "0")]
    skip_channels: usize,
    #[config(default = "UpsampleConfig::new()")]
    upsample: UpsampleConfig,
    #[config(default = "Initializer::KaimingNormal{gain: core::f64::consts::SQRT_2, fan_out_only: true}")]
    initializer: Initializer,
}

impl DecoderBasicBlockConfig {
    /// Initializes a new `DecoderBasicBlock` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> DecoderBasicBlock<B> {
        let fused_channels = self.in_channels + self.skip_channels;

        DecoderBasicBlock {
            upsample: self.upsample.init(),
            conv1: conv(
                [fused_channels, self.out_channels],
                3,
                &self.initializer,
                device,
            ),
            bn1: BatchNormConfig::new(self.out_channels).init(device),
            conv2: conv(
                [self.out_channels, self.out_channels],
                3,
                &self.initializer,
                device,
            ),
            bn2: BatchNormConfig::new(self.out_channels).init(device),
            relu: Relu::new(),
        }
    }
}

/// Upsample, concatenate the skip, then two conv-bn-relu stages.
#[derive(Module, Debug)]
pub struct DecoderBasicBlock<B: Backend> {
    upsample: Upsample,
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> DecoderBasicBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>, skip: Option<Tensor<B, 4>>) -> Tensor<B, 4> {
        let x = concat_skip(self.upsample.forward(x), skip);

        let x = self.conv1.forward(x);
        let x = self.bn1.forward(x);
        let x = self.relu.forward(x);
        let x = self.conv2.forward(x);
        let x = self.bn2.forward(x);
        self.relu.forward(x)
    }
}

/// Configuration for the `DecoderBottleneckBlock` module.
#[derive(Config, Debug)]
pub struct DecoderBottleneckBlockConfig {
    in_channels: usize,
    out_channels: usize,
    #[config(default = "0")]
    skip_channels: usize,
    #[config(default = "UpsampleConfig::new()")]
    upsample: UpsampleConfig,
    #[config(default = "Initializer::KaimingNormal{gain: core::f64::consts::SQRT_2, fan_out_only: true}")]
    initializer: Initializer,
}

impl DecoderBottleneckBlockConfig {
    /// Initializes a new `DecoderBottleneckBlock` module.
    ///
    /// A projection shortcut is inserted when the fused input width differs from `out_channels`.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> DecoderBottleneckBlock<B> {
        let fused_channels = self.in_channels + self.skip_channels;
        let inner_channels = (self.out_channels / 2).max(1);

        let shortcut = (fused_channels != self.out_channels).then(|| Projection {
            conv: conv(
                [fused_channels, self.out_channels],
                1,
                &self.initializer,
                device,
            ),
            bn: BatchNormConfig::new(self.out_channels).init(device),
        });

        DecoderBottleneckBlock {
            upsample: self.upsample.init(),
            conv1: conv(
                [fused_channels, inner_channels],
                1,
                &self.initializer,
                device,
            ),
            bn1: BatchNormConfig::new(inner_channels).init(device),
            conv2: conv(
                [inner_channels, inner_channels],
                3,
                &self.initializer,
                device,
            ),
            bn2: BatchNormConfig::new(inner_channels).init(device),
            conv3: conv(
                [inner_channels, self.out_channels],
                3,
                &self.initializer,
                device,
            ),
            bn3: BatchNormConfig::new(self.out_channels).init(device),
            shortcut,
            relu: Relu::new(),
        }
    }
}

/// 1x1 convolution and batch norm matching the residual to the block output.
#[derive(Module, Debug)]
pub struct Projection<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Projection<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Upsample, concatenate the skip, then a residual reduce-conv-expand stack.
#[derive(Module, Debug)]
pub struct DecoderBottleneckBlock<B: Backend> {
    upsample: Upsample,
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    conv3: Conv2d<B>,
    bn3: BatchNorm<B, 2>,
    shortcut: Option<Projection<B>>,
    relu: Relu,
}

impl<B: Backend> DecoderBottleneckBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>, skip: Option<Tensor<B, 4>>) -> Tensor<B, 4> {
        let x = concat_skip(self.upsample.forward(x), skip);
        let residual = match &self.shortcut {
            Some(shortcut) => shortcut.forward(x.clone()),
            None => x.clone(),
        };

        let out = self.conv1.forward(x);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv3.forward(out);
        let out = self.bn3.forward(out);

        self.relu.forward(out + residual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::NdArray,
        tensor::{Distribution, Tolerance},
    };
    use burn_extra_ops::upsample;

    type TestBackend = NdArray<f32>;

    fn random(shape: [usize; 4]) -> Tensor<TestBackend, 4> {
        Tensor::random(shape, Distribution::Normal(0.0, 1.0), &Default::default())
    }

    #[test]
    fn test_basic_block_upsamples_and_fuses_skip() {
        let device = Default::default();
        let block = DecoderBlockConfig::new(DecoderBlockType::Basic, 16, 8)
            .with_skip_channels(4)
            .init::<TestBackend>(&device);

        let output = block.forward(random([2, 16, 4, 4]), Some(random([2, 4, 8, 8])));

        assert_eq!(output.dims(), [2, 8, 8, 8]);
    }

    #[test]
    fn test_basic_block_without_skip() {
        let device = Default::default();
        let block = DecoderBlockConfig::new(DecoderBlockType::Basic, 16, 8)
            .init::<TestBackend>(&device);

        let output = block.forward(random([1, 16, 4, 4]), None);

        assert_eq!(output.dims(), [1, 8, 8, 8]);
    }

    #[test]
    fn test_simple_block_keeps_resolution_by_default() {
        let device = Default::default();
        let block = DecoderBlockConfig::new(DecoderBlockType::Simple, 16, 8)
            .init::<TestBackend>(&device);

        let output = block.forward(random([1, 16, 4, 4]), Some(random([1, 4, 8, 8])));

        assert_eq!(output.dims(), [1, 8, 4, 4]);
    }

    #[test]
    fn test_simple_block_with_upsampling() {
        let device = Default::default();
        let block = DecoderBlockConfig::new(DecoderBlockType::Simple, 16, 8)
            .with_apply_upsample(true)
            .init::<TestBackend>(&device);

        let output = block.forward(random([1, 16, 4, 4]), None);

        assert_eq!(output.dims(), [1, 8, 8, 8]);
    }

    #[test]
    fn test_bottleneck_with_projection_shortcut() {
        let device = Default::default();
        let block = DecoderBlockConfig::new(DecoderBlockType::Bottleneck, 32, 16)
            .with_skip_channels(8)
            .init::<TestBackend>(&device);

        let output = block.forward(random([1, 32, 4, 4]), Some(random([1, 8, 8, 8])));

        assert_eq!(output.dims(), [1, 16, 8, 8]);
    }

    #[test]
    fn test_bottleneck_with_zero_weights_is_relu_of_input() {
        let device = Default::default();
        // in + skip == out, so the residual is the identity.
        let block = DecoderBlockConfig::new(DecoderBlockType::Bottleneck, 4, 8)
            .with_skip_channels(4)
            .with_initializer(Initializer::Zeros)
            .init::<TestBackend>(&device);
        let x = random([1, 4, 3, 3]);
        let skip = random([1, 4, 6, 6]);

        let expected = Tensor::cat(
            vec![upsample(x.clone(), 2, &UpsampleMode::Nearest), skip.clone()],
            1,
        )
        .clamp_min(0.0);
        let output = block.forward(x, Some(skip));

        output
            .into_data()
            .assert_approx_eq::<f32>(&expected.into_data(), Tolerance::default());
    }

    #[test]
    fn test_block_type_parsing() {
        assert_eq!(
            "bottleneck".parse::<DecoderBlockType>().unwrap(),
            DecoderBlockType::Bottleneck
        );
        assert!(matches!(
            "transformer".parse::<DecoderBlockType>(),
            Err(crate::error::OpenSegError::UnknownBlockType { block_type }) if block_type == "transformer"
        ));
    }
}
