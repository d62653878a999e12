//! U-Net decoder with a hypercolumn output.
//!
//! The two finest encoder levels are not fused. Starting from the coarsest level, every stage
//! concatenates an encoder map with the running decoder map at equal resolution and lets the
//! block upsample the result. Stages past the last encoder level run on the decoder map alone.
//! All stage outputs are then brought to one size and stacked along the channel axis.

use burn::{
    module::Ignored,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
};
use burn_extra_ops::{resize_to, Elu, UpsampleMode};

use super::{check_stages, finest_size, simple_blocks_upsample, Decoder};
use crate::{
    config::DecoderBlockType,
    error::{OpenSegError, OpenSegResult},
    models::modules::{DecoderBlock, DecoderBlockConfig},
};

/// Finest encoder levels left out of the decoder path.
pub const DROPPED_LEVELS: usize = 2;

/// Configuration for the `HypercolumnDecoder` module.
#[derive(Config, Debug)]
pub struct HypercolumnDecoderConfig {
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
    #[config(default = "true")]
    pub apply_upsample: bool,
    /// Width of the 3x3 projection over the hypercolumn.
    #[config(default = "128")]
    pub head_channels: usize,
    #[config(default = "1")]
    pub out_channels: usize,
}

impl HypercolumnDecoderConfig {
    /// Initializes a new `HypercolumnDecoder` module.
    ///
    /// # Errors
    ///
    /// Returns `OpenSegError::InvalidConfiguration` when fewer than three encoder levels are
    /// given, when the decoder channel list does not hold `n_blocks + 1` entries, or when the
    /// stages cannot consume every usable encoder level.
    pub fn init<B: Backend>(&self, device: &B::Device) -> OpenSegResult<HypercolumnDecoder<B>> {
        if self.encoder_channels.len() <= DROPPED_LEVELS {
            return Err(OpenSegError::InvalidConfiguration {
                reason: format!(
                    "hypercolumn decoder needs at least {} encoder levels, got {}",
                    DROPPED_LEVELS + 1,
                    self.encoder_channels.len()
                ),
            });
        }

        let skip_levels = self.encoder_channels.len() - DROPPED_LEVELS;
        // At least one stage past the skips upsamples to the finest kept level's resolution.
        check_stages(
            &self.encoder_channels,
            &self.decoder_channels,
            self.n_blocks,
            skip_levels + 1,
        )?;

        if skip_levels > 1 && !simple_blocks_upsample(&self.block_type, self.apply_upsample) {
            return Err(OpenSegError::InvalidConfiguration {
                reason: "simple blocks must upsample to fuse more than one encoder level"
                    .to_string(),
            });
        }

        let encoder_rev: Vec<usize> = self.encoder_channels.iter().rev().copied().collect();

        let blocks = (0..self.n_blocks)
            .map(|index| {
                let skip = encoder_rev[..skip_levels].get(index).copied().unwrap_or(0);
                DecoderBlockConfig::new(
                    self.block_type.clone(),
                    self.decoder_channels[index] + skip,
                    self.decoder_channels[index + 1],
                )
                .with_mode(self.upsample_mode.clone())
                .with_apply_upsample(self.apply_upsample)
                .init(device)
            })
            .collect();

        let center = Conv2dConfig::new([encoder_rev[0], self.decoder_channels[0]], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);

        let hypercolumn_channels = self.decoder_channels[1..].iter().sum();
        let head = HypercolumnHead {
            conv_in: Conv2dConfig::new([hypercolumn_channels, self.head_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            elu: Elu::new(),
            conv_out: Conv2dConfig::new([self.head_channels, self.out_channels], [1, 1])
                .init(device),
        };

        Ok(HypercolumnDecoder {
            center,
            blocks,
            head,
            resize_mode: Ignored(self.resize_mode.clone()),
            n_levels: self.encoder_channels.len(),
            out_channels: self.out_channels,
        })
    }
}

/// 3x3 convolution, ELU and 1x1 convolution over the stacked decoder outputs.
#[derive(Module, Debug)]
pub struct HypercolumnHead<B: Backend> {
    conv_in: Conv2d<B>,
    elu: Elu,
    conv_out: Conv2d<B>,
}

impl<B: Backend> HypercolumnHead<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv_in.forward(x);
        let x = self.elu.forward(x);
        self.conv_out.forward(x)
    }
}

/// U-Net decoder producing a projected hypercolumn.
#[derive(Module, Debug)]
pub struct HypercolumnDecoder<B: Backend> {
    center: Conv2d<B>,
    blocks: Vec<DecoderBlock<B>>,
    head: HypercolumnHead<B>,
    resize_mode: Ignored<UpsampleMode>,
    n_levels: usize,
    out_channels: usize,
}

impl<B: Backend> HypercolumnDecoder<B> {
    /// # Shapes
    /// - features: `n_levels` maps `[batch_size, encoder_channels[i], h_i, w_i]`, finest first,
    ///   each level half the resolution of the previous one
    /// - output: `[batch_size, out_channels, output_size[0], output_size[1]]`
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
            "hypercolumn decoder expects {} feature maps",
            self.n_levels
        );
        let output_size = output_size.unwrap_or_else(|| finest_size(&features));

        let mut skips = features.into_iter().skip(DROPPED_LEVELS).rev();
        let Some(coarsest) = skips.next() else {
            panic!("hypercolumn decoder received no usable feature map");
        };
        let mut decoded = self.center.forward(coarsest.clone());
        let mut skips = core::iter::once(coarsest).chain(skips);

        let mut hypercolumn = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let input = match skips.next() {
                Some(skip) => {
                    let [_, _, height, width] = skip.dims();
                    let decoded = resize_to(decoded, [height, width], &self.resize_mode);
                    Tensor::cat(vec![skip, decoded], 1)
                }
                None => decoded,
            };
            decoded = block.forward(input, None);
            hypercolumn.push(decoded.clone());
        }

        let hypercolumn = hypercolumn
            .into_iter()
            .map(|level| resize_to(level, output_size, &self.resize_mode))
            .collect();

        self.head.forward(Tensor::cat(hypercolumn, 1))
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
}

impl<B: Backend> Decoder<B> for HypercolumnDecoder<B> {
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
