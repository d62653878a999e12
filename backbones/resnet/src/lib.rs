//! ResNet implementation for OpenSeg backbones.
//!
//! This module provides ResNet and ResNeXt models split into the conventional five stages
//! (`stem`, `layer1` .. `layer4`) so they can be used as multi-resolution feature extractors.
//! The implementation is based on the official torchvision ResNet implementation.

use burn::{
    module::Ignored,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
    },
    prelude::*,
};
use core::f64::consts::SQRT_2;

mod blocks;
mod error;
#[cfg(feature = "pretrained")]
mod weights;

pub use blocks::*;
pub use error::{ResNetError, ResNetResult};

/// Maximum number of stages a ResNet can be split into.
pub const MAX_STAGES: usize = 5;

/// Channels produced by the stem convolution.
const STEM_CHANNELS: usize = 64;

/// Planes of `layer1` .. `layer4` before expansion.
const LAYER_PLANES: [usize; 4] = [64, 128, 256, 512];

/// Supported ResNet and ResNeXt depths.
#[derive(Config, Debug, PartialEq, Eq, Hash)]
pub enum ResNetVariant {
    /// ResNet-18
    ResNet18,
    /// ResNet-34
    ResNet34,
    /// ResNet-50
    ResNet50,
    /// ResNet-101
    ResNet101,
    /// ResNet-152
    ResNet152,
    /// ResNeXt-50 32x4d
    ResNext50,
    /// ResNeXt-101 32x8d
    ResNext101,
}

impl ResNetVariant {
    /// Number of residual blocks in each of the four layers.
    pub const fn layers(&self) -> [usize; 4] {
        match self {
            Self::ResNet18 => [2, 2, 2, 2],
            Self::ResNet34 | Self::ResNet50 | Self::ResNext50 => [3, 4, 6, 3],
            Self::ResNet101 | Self::ResNext101 => [3, 4, 23, 3],
            Self::ResNet152 => [3, 8, 36, 3],
        }
    }

    /// Residual block shape used by every layer.
    pub const fn block_kind(&self) -> BlockKind {
        match self {
            Self::ResNet18 | Self::ResNet34 => BlockKind::Basic,
            Self::ResNet50 | Self::ResNet101 | Self::ResNet152 => BlockKind::Bottleneck {
                groups: 1,
                width_per_group: 64,
            },
            Self::ResNext50 => BlockKind::Bottleneck {
                groups: 32,
                width_per_group: 4,
            },
            Self::ResNext101 => BlockKind::Bottleneck {
                groups: 32,
                width_per_group: 8,
            },
        }
    }

    /// Output channels of all five stages.
    pub const fn stage_channels(&self) -> [usize; MAX_STAGES] {
        let expansion = self.block_kind().expansion();
        [
            STEM_CHANNELS,
            LAYER_PLANES[0] * expansion,
            LAYER_PLANES[1] * expansion,
            LAYER_PLANES[2] * expansion,
            LAYER_PLANES[3] * expansion,
        ]
    }
}

/// ResNet configuration
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Depth and block layout.
    pub variant: ResNetVariant,
    /// Number of stages to keep, from the stem onwards. Range: [1, 5].
    #[config(default = "5")]
    pub n_blocks: usize,
}

impl ResNetConfig {
    /// Initialize ResNet model
    ///
    /// # Errors
    ///
    /// Returns `ResNetError::InvalidStageCount` if `n_blocks` is outside `1..=5`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNetResult<ResNet<B>> {
        if !(1..=MAX_STAGES).contains(&self.n_blocks) {
            return Err(ResNetError::InvalidStageCount {
                n_blocks: self.n_blocks,
                max: MAX_STAGES,
            });
        }

        let kind = self.variant.block_kind();
        let layers = self.variant.layers();
        let channels = self.variant.stage_channels();

        // Stage `i + 1` holds layer `i`; stages past n_blocks are never built.
        let layer = |index: usize| {
            (index + 1 < self.n_blocks).then(|| {
                let stride = if index == 0 { 1 } else { 2 };
                LayerBlock::new(
                    layers[index],
                    channels[index],
                    LAYER_PLANES[index],
                    stride,
                    kind,
                    device,
                )
            })
        };

        Ok(ResNet {
            stem: Stem::new(3, STEM_CHANNELS, device),
            maxpool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            layer1: layer(0),
            layer2: layer(1),
            layer3: layer(2),
            layer4: layer(3),
            out_channels: Ignored(channels[..self.n_blocks].to_vec()),
        })
    }
}

/// ResNet backbone split into up to five sequential stages.
///
/// Stage 1 is `conv1 + bn1 + relu`, stage 2 is `maxpool + layer1`, stages 3-5 are
/// `layer2` .. `layer4`. Derived from torchvision.models.resnet.ResNet
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    stem: Stem<B>,
    maxpool: MaxPool2d,
    layer1: Option<LayerBlock<B>>,
    layer2: Option<LayerBlock<B>>,
    layer3: Option<LayerBlock<B>>,
    layer4: Option<LayerBlock<B>>,
    out_channels: Ignored<Vec<usize>>,
}

impl<B: Backend> ResNet<B> {
    /// Runs the input through every built stage.
    ///
    /// # Shapes
    /// - input: `[batch_size, 3, height, width]`
    /// - output: one tensor per stage, finest first; stage `i` has stride `2^(i + 1)`
    pub fn forward(&self, input: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        let mut x = self.stem.forward(input);
        let mut features = Vec::with_capacity(self.out_channels.len());
        features.push(x.clone());

        let layers = [&self.layer1, &self.layer2, &self.layer3, &self.layer4];
        for (index, layer) in layers.into_iter().enumerate() {
            let Some(layer) = layer else {
                break;
            };
            if index == 0 {
                x = self.maxpool.forward(x);
            }
            x = layer.forward(x);
            features.push(x.clone());
        }

        features
    }

    /// Output channels of each built stage, aligned with [`ResNet::forward`].
    pub fn out_channels(&self) -> Vec<usize> {
        self.out_channels.to_vec()
    }

    /// Number of built stages.
    pub fn n_blocks(&self) -> usize {
        self.out_channels.len()
    }
}

/// First stage: conv1 + bn1 + relu
#[derive(Module, Debug)]
pub struct Stem<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> Stem<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        self.relu.forward(out)
    }

    /// Create a new Stem.
    pub fn new(in_channels: usize, out_channels: usize, device: &Device<B>) -> Self {
        let initializer = Initializer::KaimingNormal {
            gain: SQRT_2,
            fan_out_only: true,
        };

        // 7x7 conv, stride=2, padding=3
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .with_initializer(initializer)
            .init(device);

        let bn1 = BatchNormConfig::new(out_channels).init(device);

        Self {
            conv1,
            bn1,
            relu: Relu::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Distribution};

    type TestBackend = NdArray<f32>;

    fn image(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 4> {
        Tensor::random([1, 3, 64, 64], Distribution::Normal(0.0, 1.0), device)
    }

    #[test]
    fn test_resnet_config() {
        let config = ResNetConfig::new(ResNetVariant::ResNet50);
        assert_eq!(config.n_blocks, 5);
        assert_eq!(config.variant.layers(), [3, 4, 6, 3]);
        assert_eq!(
            config.variant.stage_channels(),
            [64, 256, 512, 1024, 2048]
        );
    }

    #[test]
    fn test_resnet18_forward() {
        let device = Default::default();
        let model = ResNetConfig::new(ResNetVariant::ResNet18)
            .init::<TestBackend>(&device)
            .unwrap();

        let output = model.forward(image(&device));

        assert_eq!(output.len(), 5);
        assert_eq!(output[0].dims(), [1, 64, 32, 32]);
        assert_eq!(output[1].dims(), [1, 64, 16, 16]);
        assert_eq!(output[2].dims(), [1, 128, 8, 8]);
        assert_eq!(output[3].dims(), [1, 256, 4, 4]);
        assert_eq!(output[4].dims(), [1, 512, 2, 2]);
    }

    #[test]
    fn test_out_channels_match_features() {
        let device = Default::default();
        let model = ResNetConfig::new(ResNetVariant::ResNet50)
            .init::<TestBackend>(&device)
            .unwrap();

        let output = model.forward(image(&device));
        let channels: Vec<usize> = output.iter().map(|feature| feature.dims()[1]).collect();

        assert_eq!(model.out_channels(), channels);
        assert_eq!(channels, vec![64, 256, 512, 1024, 2048]);
    }

    #[test]
    fn test_truncated_stages() {
        let device = Default::default();
        let model = ResNetConfig::new(ResNetVariant::ResNet34)
            .with_n_blocks(3)
            .init::<TestBackend>(&device)
            .unwrap();

        let output = model.forward(image(&device));

        assert_eq!(model.n_blocks(), 3);
        assert_eq!(model.out_channels(), vec![64, 64, 128]);
        assert_eq!(output.len(), 3);
        assert_eq!(output[2].dims(), [1, 128, 8, 8]);
    }

    #[test]
    fn test_resnext_channels() {
        let device = Default::default();
        let model = ResNetConfig::new(ResNetVariant::ResNext50)
            .with_n_blocks(2)
            .init::<TestBackend>(&device)
            .unwrap();

        let output = model.forward(image(&device));

        assert_eq!(output[1].dims(), [1, 256, 16, 16]);
    }

    #[test]
    fn test_invalid_stage_count() {
        let device = Default::default();
        for n_blocks in [0, 6] {
            let result = ResNetConfig::new(ResNetVariant::ResNet18)
                .with_n_blocks(n_blocks)
                .init::<TestBackend>(&device);

            assert!(matches!(
                result,
                Err(ResNetError::InvalidStageCount { n_blocks: n, max: 5 }) if n == n_blocks
            ));
        }
    }
}
