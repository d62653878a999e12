//! Backbone implementations for OpenSeg
//!
//! This crate provides a unified interface over the feature-extracting networks an
//! encoder-decoder segmenter can be built on. Every backbone returns its feature pyramid
//! finest first, together with the channel count of each level.

use core::str::FromStr;

use burn::prelude::*;
use thiserror::Error;

pub use resnet::{ResNet, ResNetConfig, ResNetError, ResNetVariant};

/// Unified backbone trait for OpenSeg
pub trait Backbone<B: Backend> {
    /// Forward pass through the backbone
    ///
    /// # Arguments
    /// * `input` - Input tensor of shape `[batch_size, channels, height, width]`
    ///
    /// # Returns
    /// One feature map per stage, ordered from the highest to the lowest resolution
    fn forward(&self, input: Tensor<B, 4>) -> Vec<Tensor<B, 4>>;

    /// Get output channels for each stage, aligned with [`Backbone::forward`]
    fn out_channels(&self) -> Vec<usize>;
}

/// Implement Backbone trait for ResNet
impl<B: Backend> Backbone<B> for ResNet<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        self.forward(input)
    }

    fn out_channels(&self) -> Vec<usize> {
        self.out_channels()
    }
}

/// Errors raised while building a backbone.
#[derive(Error, Debug)]
pub enum BackboneError {
    /// The backbone name does not match any known architecture.
    #[error("Unsupported backbone: {name}")]
    UnsupportedBackbone {
        /// The requested name.
        name: String,
    },

    /// The ResNet family rejected the configuration or its weights.
    #[error(transparent)]
    ResNet(#[from] ResNetError),
}

/// A specialized `Result` type for backbone construction.
pub type BackboneResult<T> = Result<T, BackboneError>;

/// Enumeration of supported backbone types
#[derive(Config, Debug, PartialEq, Eq, Hash)]
pub enum BackboneType {
    /// ResNet / ResNeXt backbone
    ResNet(ResNetVariant),
}

impl BackboneType {
    /// Every supported backbone, in registration order.
    pub const ALL: [Self; 7] = [
        Self::ResNet(ResNetVariant::ResNet18),
        Self::ResNet(ResNetVariant::ResNet34),
        Self::ResNet(ResNetVariant::ResNet50),
        Self::ResNet(ResNetVariant::ResNet101),
        Self::ResNet(ResNetVariant::ResNet152),
        Self::ResNet(ResNetVariant::ResNext50),
        Self::ResNet(ResNetVariant::ResNext101),
    ];

    /// The torchvision-style name of this backbone.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ResNet(variant) => match variant {
                ResNetVariant::ResNet18 => "resnet18",
                ResNetVariant::ResNet34 => "resnet34",
                ResNetVariant::ResNet50 => "resnet50",
                ResNetVariant::ResNet101 => "resnet101",
                ResNetVariant::ResNet152 => "resnet152",
                ResNetVariant::ResNext50 => "resnext50_32x4d",
                ResNetVariant::ResNext101 => "resnext101_32x8d",
            },
        }
    }

    /// Output channels of every stage when all stages are built.
    pub const fn stage_channels(&self) -> [usize; resnet::MAX_STAGES] {
        match self {
            Self::ResNet(variant) => variant.stage_channels(),
        }
    }
}

impl FromStr for BackboneType {
    type Err = BackboneError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|backbone| backbone.name() == name)
            .ok_or_else(|| BackboneError::UnsupportedBackbone {
                name: name.to_string(),
            })
    }
}

/// Enum to wrap different backbone implementations
#[derive(Module, Debug)]
pub enum BackboneWrapper<B: Backend> {
    /// ResNet backbone
    ResNet(ResNet<B>),
}

impl<B: Backend> Backbone<B> for BackboneWrapper<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        match self {
            Self::ResNet(backbone) => backbone.forward(input),
        }
    }

    fn out_channels(&self) -> Vec<usize> {
        match self {
            Self::ResNet(backbone) => backbone.out_channels(),
        }
    }
}

#[cfg(feature = "pretrained")]
impl<B: Backend> BackboneWrapper<B> {
    /// Loads pretrained classifier weights into the wrapped backbone.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint cannot be read or does not fit the backbone.
    pub fn load_pretrained(
        self,
        path: impl Into<std::path::PathBuf>,
        device: &B::Device,
    ) -> BackboneResult<Self> {
        match self {
            Self::ResNet(backbone) => Ok(Self::ResNet(
                backbone.load_torchvision_weights(path, device)?,
            )),
        }
    }
}

/// Factory function to create backbones
///
/// # Errors
///
/// Returns an error if `n_blocks` is not a valid stage count for the backbone.
pub fn create_backbone<B: Backend>(
    backbone_type: &BackboneType,
    n_blocks: usize,
    device: &Device<B>,
) -> BackboneResult<BackboneWrapper<B>> {
    match backbone_type {
        BackboneType::ResNet(variant) => {
            let backbone = ResNetConfig::new(variant.clone())
                .with_n_blocks(n_blocks)
                .init(device)?;
            Ok(BackboneWrapper::ResNet(backbone))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_resnet_backbone() {
        let device = Default::default();
        let backbone_type: BackboneType = "resnet34".parse().unwrap();
        let backbone = create_backbone::<TestBackend>(&backbone_type, 5, &device).unwrap();

        let input = Tensor::<TestBackend, 4>::random(
            [1, 3, 64, 64],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );

        let output = backbone.forward(input);
        let channels = backbone.out_channels();

        assert_eq!(output.len(), 5);
        assert_eq!(channels.len(), 5);
        for (feature, channel) in output.iter().zip(&channels) {
            assert_eq!(feature.dims()[1], *channel);
        }
        assert_eq!(output[4].dims(), [1, 512, 2, 2]);
    }

    #[test]
    fn test_backbone_names_round_trip() {
        for backbone_type in BackboneType::ALL {
            let parsed: BackboneType = backbone_type.name().parse().unwrap();
            assert_eq!(parsed, backbone_type);
        }
    }

    #[test]
    fn test_unknown_backbone_name() {
        let result = "vgg16".parse::<BackboneType>();

        match result {
            Err(BackboneError::UnsupportedBackbone { name }) => assert_eq!(name, "vgg16"),
            _ => panic!("Expected UnsupportedBackbone error"),
        }
    }

    #[test]
    fn test_invalid_stage_count_is_forwarded() {
        let device = Default::default();
        let backbone_type = BackboneType::ResNet(ResNetVariant::ResNet18);

        let result = create_backbone::<TestBackend>(&backbone_type, 7, &device);

        assert!(matches!(
            result,
            Err(BackboneError::ResNet(ResNetError::InvalidStageCount { .. }))
        ));
    }
}
