//! Core configuration structures.

use std::{collections::HashSet, path::PathBuf};

use burn::prelude::*;
use burn_extra_ops::UpsampleMode;

use super::enums::{DecoderBlockType, LossKind};
use crate::{
    error::{OpenSegError, OpenSegResult},
    models::SegmentationHeadConfig,
};

/// Selects and shapes the backbone.
#[derive(Config, Debug)]
pub struct BackboneSpec {
    /// Registry name of the backbone.
    #[config(default = "String::from(\"resnet34\")")]
    pub name: String,
    /// Number of backbone stages to keep.
    #[config(default = "5")]
    pub n_blocks: usize,
    /// Optional torchvision checkpoint loaded after construction.
    #[config(default = "None")]
    pub pretrained: Option<PathBuf>,
}

/// Selects and shapes the decoder.
#[derive(Config, Debug)]
pub struct DecoderSpec {
    /// Registry name of the decoder.
    #[config(default = "String::from(\"unet_hypercolumn\")")]
    pub name: String,
    /// Channels of each encoder feature map, finest first.
    /// Left empty, it is taken from the backbone when the segmenter is built.
    #[config(default = "Vec::new()")]
    pub encoder_channels: Vec<usize>,
    /// Channels of the center convolution followed by every decoder stage.
    #[config(default = "vec![256, 128, 64, 32, 16]")]
    pub decoder_channels: Vec<usize>,
    /// Number of decoder stages.
    #[config(default = "4")]
    pub n_blocks: usize,
    #[config(default = "DecoderBlockType::Basic")]
    pub block_type: DecoderBlockType,
    /// Interpolation used by the decoder blocks.
    #[config(default = "UpsampleMode::Nearest")]
    pub upsample_mode: UpsampleMode,
    /// Interpolation used to bring decoder outputs to the output size.
    #[config(default = "UpsampleMode::Bilinear")]
    pub resize_mode: UpsampleMode,
    /// Whether `Simple` blocks upsample their input.
    #[config(default = "true")]
    pub apply_upsample: bool,
    /// Width of the hypercolumn projection.
    #[config(default = "128")]
    pub head_channels: usize,
    /// Channels of the hypercolumn projection output.
    #[config(default = "1")]
    pub out_channels: usize,
}

/// A loss function attached to a segmenter under a unique name.
#[derive(Config, Debug)]
pub struct LossSpec {
    /// Key of this loss in the per-loss report.
    pub name: String,
    pub kind: LossKind,
}

/// Full description of a segmentation model.
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// Registry name of the segmenter.
    #[config(default = "String::from(\"encoder_decoder\")")]
    pub segmenter: String,
    #[config(default = "BackboneSpec::new()")]
    pub backbone: BackboneSpec,
    #[config(default = "DecoderSpec::new()")]
    pub decoder: DecoderSpec,
    #[config(default = "SegmentationHeadConfig::new()")]
    pub head: SegmentationHeadConfig,
    #[config(default = "vec![LossSpec::new(String::from(\"bce\"), LossKind::BinaryCrossEntropy)]")]
    pub losses: Vec<LossSpec>,
}

impl ModelConfig {
    /// Checks the cross-field constraints that do not need a built backbone.
    ///
    /// # Errors
    ///
    /// Returns `OpenSegError::InvalidConfiguration` describing the first violated constraint.
    pub fn validate(&self) -> OpenSegResult<()> {
        let decoder = &self.decoder;

        if decoder.decoder_channels.len() != decoder.n_blocks + 1 {
            return Err(invalid(format!(
                "decoder has {} stages but {} channel entries, expected {}",
                decoder.n_blocks,
                decoder.decoder_channels.len(),
                decoder.n_blocks + 1
            )));
        }

        if !decoder.encoder_channels.is_empty()
            && decoder.encoder_channels.len() != self.backbone.n_blocks
        {
            return Err(invalid(format!(
                "decoder expects {} encoder feature maps but the backbone keeps {} stages",
                decoder.encoder_channels.len(),
                self.backbone.n_blocks
            )));
        }

        if self.head.num_classes == 0 {
            return Err(invalid("num_classes must be at least 1".to_string()));
        }

        if self.head.upsampling == 0 {
            return Err(invalid("head upsampling must be at least 1".to_string()));
        }

        if self.head.kernel_size % 2 == 0 {
            return Err(invalid(format!(
                "head kernel_size must be odd, got {}",
                self.head.kernel_size
            )));
        }

        if self.losses.is_empty() {
            return Err(invalid("at least one loss is required".to_string()));
        }

        let mut names = HashSet::new();
        for loss in &self.losses {
            if !names.insert(loss.name.as_str()) {
                return Err(invalid(format!("duplicate loss name: {}", loss.name)));
            }
            if loss.kind == LossKind::CrossEntropy && self.head.num_classes < 2 {
                return Err(invalid(format!(
                    "loss {} needs at least 2 classes, got {}",
                    loss.name, self.head.num_classes
                )));
            }
        }

        Ok(())
    }
}

fn invalid(reason: String) -> OpenSegError {
    OpenSegError::InvalidConfiguration { reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_invalid(config: &ModelConfig, fragment: &str) {
        match config.validate() {
            Err(OpenSegError::InvalidConfiguration { reason }) => {
                assert!(reason.contains(fragment), "unexpected reason: {reason}");
            }
            other => panic!("Expected InvalidConfiguration error, got {other:?}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ModelConfig::new();

        assert!(config.validate().is_ok());
        assert_eq!(config.backbone.name, "resnet34");
        assert_eq!(config.decoder.name, "unet_hypercolumn");
        assert_eq!(config.decoder.block_type, DecoderBlockType::Basic);
        assert_eq!(config.losses.len(), 1);
    }

    #[test]
    fn test_decoder_channels_must_cover_every_stage() {
        let config = ModelConfig::new()
            .with_decoder(DecoderSpec::new().with_decoder_channels(vec![64, 32, 16]));

        expect_invalid(&config, "channel entries");
    }

    #[test]
    fn test_encoder_channels_must_match_backbone_stages() {
        let config = ModelConfig::new()
            .with_decoder(DecoderSpec::new().with_encoder_channels(vec![3, 64, 64]));

        expect_invalid(&config, "encoder feature maps");
    }

    #[test]
    fn test_head_kernel_must_be_odd() {
        let config =
            ModelConfig::new().with_head(SegmentationHeadConfig::new().with_kernel_size(4));

        expect_invalid(&config, "odd");
    }

    #[test]
    fn test_losses_are_required_and_unique() {
        expect_invalid(&ModelConfig::new().with_losses(Vec::new()), "at least one loss");

        let duplicated = ModelConfig::new().with_losses(vec![
            LossSpec::new("main".to_string(), LossKind::Dice),
            LossSpec::new("main".to_string(), LossKind::Mse),
        ]);
        expect_invalid(&duplicated, "duplicate loss name");
    }

    #[test]
    fn test_cross_entropy_needs_two_classes() {
        let losses = vec![LossSpec::new("ce".to_string(), LossKind::CrossEntropy)];

        expect_invalid(&ModelConfig::new().with_losses(losses.clone()), "2 classes");

        let config = ModelConfig::new()
            .with_head(SegmentationHeadConfig::new().with_num_classes(2))
            .with_losses(losses);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = ModelConfig::new()
            .with_backbone(
                BackboneSpec::new()
                    .with_name("resnet50".to_string())
                    .with_pretrained(Some(PathBuf::from("weights/resnet50.pth"))),
            )
            .with_decoder(
                DecoderSpec::new()
                    .with_name("unet".to_string())
                    .with_block_type(DecoderBlockType::Bottleneck)
                    .with_resize_mode(UpsampleMode::Nearest),
            )
            .with_losses(vec![LossSpec::new("dice".to_string(), LossKind::Dice)]);

        let json = burn::config::config_to_json(&config);
        let restored = ModelConfig::load_binary(json.as_bytes()).unwrap();

        assert_eq!(restored.backbone.name, "resnet50");
        assert_eq!(
            restored.backbone.pretrained,
            Some(PathBuf::from("weights/resnet50.pth"))
        );
        assert_eq!(restored.decoder.name, "unet");
        assert_eq!(restored.decoder.block_type, DecoderBlockType::Bottleneck);
        assert_eq!(restored.decoder.resize_mode, UpsampleMode::Nearest);
        assert_eq!(restored.losses[0].kind, LossKind::Dice);
        assert_eq!(restored.head.num_classes, 1);
    }

    #[test]
    fn test_enums_are_stored_by_name() {
        let json = burn::config::config_to_json(&ModelConfig::new());

        assert!(json.contains("\"basic\""));
        assert!(json.contains("\"bce\""));
        assert!(!json.contains("BinaryCrossEntropy"));
    }

    #[test]
    fn test_unknown_block_type_in_json_is_rejected() {
        let json = burn::config::config_to_json(&ModelConfig::new()).replace("\"basic\"", "\"transformer\"");

        match ModelConfig::load_binary(json.as_bytes()) {
            Err(burn::config::ConfigError::InvalidFormat(message)) => {
                assert!(
                    message.contains("Unsupported decoder block type: transformer"),
                    "unexpected message: {message}"
                );
            }
            other => panic!("Expected InvalidFormat error, got {:?}", other.map(|_| ())),
        }
    }
}
