//! Plain U-Net decoder.

use burn::{
    module::Ignored,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
};
use burn_extra_ops::{resize_to, UpsampleMode};

use super::{check_stages, finest_size, Decoder};
use crate::{
    config::DecoderBlockType,
    error::{OpenSegError, OpenSegResult},
    models::modules::{DecoderBlock, DecoderBlockConfig},
};

/// Configuration for the `UnetDecoder` module.
#[derive(Config, Debug)]
pub struct UnetDecoderConfig {
    /// Channels of each encoder feature map, finest first.
    pub encoder_channels: Vec<usize>,
    /// Channels of the center convolution followed by every decoder stage.
    pub decoder_channels: Vec<usize>,
    #[config(default = "4")]
    pub n_blocks: usize,
    #[config(default = "DecoderBlockType::Basic")]
    pub block_type: DecoderBlockType,
    #[config(default = "UpsampleMode::Nearest")]
    pub upsample_mode: UpsampleMode,
    #[config(default = "UpsampleMode::Bilinear")]
    pub resize_mode: UpsampleMode,
}

impl UnetDecoderConfig {
    /// Initializes a new `UnetDecoder` module.
    ///
    /// # Errors
    ///
    /// Returns `OpenSegError::InvalidConfiguration` for an empty encoder, for `Simple` blocks
    /// (they cannot consume skip connections), or when the stage count does not cover every
    /// encoder level.
    pub fn init<B: Backend>(&self, device: &B::Device) -> OpenSegResult<UnetDecoder<B>> {
        if self.encoder_channels.is_empty() {
            return Err(OpenSegError::InvalidConfiguration {
                reason: "U-Net decoder needs at least one encoder level".to_string(),
            });
        }

        if !self.block_type.uses_skip() {
            return Err(OpenSegError::InvalidConfiguration {
                reason: "U-Net decoder stages need a block that consumes skip connections"
                    .to_string(),
            });
        }

        let skip_stages = self.encoder_channels.len() - 1;
        check_stages(
            &self.encoder_channels,
            &self.decoder_channels,
            self.n_blocks,
            skip_stages,
        )?;

        let encoder_rev: Vec<usize> = self.encoder_channels.iter().rev().copied().collect();

        let blocks = (0..self.n_blocks)
            .map(|index| {
                let skip = encoder_rev.get(index + 1).copied().unwrap_or(0);
                DecoderBlockConfig::new(
                    self.block_type.clone(),
                    self.decoder_channels[index],
                    self.decoder_channels[index + 1],
                )
                .with_skip_channels(skip)
                .with_mode(self.upsample_mode.clone())
                .init(device)
            })
            .collect();

        Ok(UnetDecoder {
            center: Conv2dConfig::new([encoder_rev[0], self.decoder_channels[0]], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            blocks,
            resize_mode: Ignored(self.resize_mode.clone()),
            n_levels: self.encoder_channels.len(),
            out_channels: self.decoder_channels[self.n_blocks],
        })
    }
}

/// U-Net decoder: each stage upsamples and fuses the next finer encoder level.
#[derive(Module, Debug)]
pub struct UnetDecoder<B: Backend> {
    center: Conv2d<B>,
    blocks: Vec<DecoderBlock<B>>,
    resize_mode: Ignored<UpsampleMode>,
    n_levels: usize,
    out_channels: usize,
}

impl<B: Backend> UnetDecoder<B> {
    /// # Shapes
    /// - features: `n_levels` maps, finest first, each level half the resolution of the previous
    /// - output: `[batch_size, decoder_channels.last(), output_size[0], output_size[1]]`
    ///
    /// # Panics
    ///
    /// Panics if the number of feature maps differs from the configured encoder levels.
    pub fn forward(
        &self,
        features: Vec<Tensor<B, 4>>,
        output_size: Option<[usize; 2]>,
    ) -> Tensor<B, 4> {
        assert_eq!(
            features.len(),
            self.n_levels,
            "U-Net decoder expects {} feature maps",
            self.n_levels
        );
        let output_size = output_size.unwrap_or_else(|| finest_size(&features));

        let mut levels = features.into_iter().rev();
        let Some(coarsest) = levels.next() else {
            panic!("U-Net decoder received no feature map");
        };

        let mut x = self.center.forward(coarsest);
        for block in &self.blocks {
            x = block.forward(x, levels.next());
        }

        resize_to(x, output_size, &self.resize_mode)
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
}

impl<B: Backend> Decoder<B> for UnetDecoder<B> {
    fn forward(
        &self,
        features: Vec<Tensor<B, 4>>,
        output_size: Option<[usize; 2]>,
    ) -> Tensor<B, 4> {
        self.forward(features, output_size)
    }

    fn out_channels(&self) -> usize {
        self.out_channels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Distribution};

    type TestBackend = NdArray<f32>;

    fn pyramid(channels: &[usize], finest: usize) -> Vec<Tensor<TestBackend, 4>> {
        channels
            .iter()
            .enumerate()
            .map(|(level, &c)| {
                let size = finest >> level;
                Tensor::random(
                    [2, c, size, size],
                    Distribution::Normal(0.0, 1.0),
                    &Default::default(),
                )
            })
            .collect()
    }

    #[test]
    fn test_unet_returns_last_stage_channels() {
        let device = Default::default();
        let encoder_channels = vec![64, 64, 128, 256, 512];
        let decoder = UnetDecoderConfig::new(encoder_channels.clone(), vec![64, 32, 16, 8, 4])
            .init::<TestBackend>(&device)
            .unwrap();

        let output = decoder.forward(pyramid(&encoder_channels, 32), None);

        assert_eq!(decoder.out_channels(), 4);
        assert_eq!(output.dims(), [2, 4, 32, 32]);
    }

    #[test]
    fn test_unet_resizes_to_requested_size() {
        let device = Default::default();
        let encoder_channels = vec![8, 16, 32];
        let decoder = UnetDecoderConfig::new(encoder_channels.clone(), vec![32, 16, 8])
            .with_n_blocks(2)
            .with_block_type(DecoderBlockType::Bottleneck)
            .with_resize_mode(UpsampleMode::Nearest)
            .init::<TestBackend>(&device)
            .unwrap();

        let output = decoder.forward(pyramid(&encoder_channels, 16), Some([64, 64]));

        assert_eq!(output.dims(), [2, 8, 64, 64]);
    }

    #[test]
    fn test_unet_fuses_odd_resolutions() {
        let device = Default::default();
        let encoder_channels = vec![8, 16, 32];
        let features = encoder_channels
            .iter()
            .zip([13, 7, 4])
            .map(|(&c, size)| {
                Tensor::random([2, c, size, size], Distribution::Normal(0.0, 1.0), &device)
            })
            .collect();
        let decoder = UnetDecoderConfig::new(encoder_channels, vec![32, 16, 8])
            .with_n_blocks(2)
            .init::<TestBackend>(&device)
            .unwrap();

        let output = decoder.forward(features, None);

        assert_eq!(output.dims(), [2, 8, 13, 13]);
    }

    #[test]
    fn test_unet_trailing_stage_upsamples_past_finest() {
        let device = Default::default();
        let encoder_channels = vec![8, 16];
        let decoder = UnetDecoderConfig::new(encoder_channels.clone(), vec![16, 8, 4])
            .with_n_blocks(2)
            .init::<TestBackend>(&device)
            .unwrap();

        // One skip stage at 8x8, then one stage without skip up to 16x16.
        let output = decoder.forward(pyramid(&encoder_channels, 8), Some([16, 16]));

        assert_eq!(output.dims(), [2, 4, 16, 16]);
    }

    #[test]
    fn test_unet_rejects_simple_blocks() {
        let device = Default::default();
        let result = UnetDecoderConfig::new(vec![8, 16, 32], vec![32, 16, 8])
            .with_n_blocks(2)
            .with_block_type(DecoderBlockType::Simple)
            .init::<TestBackend>(&device);

        assert!(matches!(
            result,
            Err(OpenSegError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_unet_needs_a_stage_per_skip() {
        let device = Default::default();
        let result = UnetDecoderConfig::new(vec![8, 16, 32, 64], vec![32, 16, 8])
            .with_n_blocks(2)
            .init::<TestBackend>(&device);

        assert!(matches!(
            result,
            Err(OpenSegError::InvalidConfiguration { .. })
        ));
    }
}
