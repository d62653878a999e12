//! # Decoders
//!
//! Decoders turn the backbone's feature pyramid into a dense feature map at a requested
//! output size. Two decoders are provided:
//!
//! - `unet`: a plain U-Net path returning the last decoder stage.
//! - `unet_hypercolumn`: a U-Net path whose stage outputs are all resized to the output size,
//!   stacked into a hypercolumn and projected by a small convolutional head.

mod hypercolumn;
mod unet;

use burn::prelude::*;

pub use hypercolumn::*;
pub use unet::*;

use crate::{
    config::{DecoderBlockType, DecoderSpec},
    error::{OpenSegError, OpenSegResult},
};

/// Unified decoder trait
pub trait Decoder<B: Backend> {
    /// Decodes a feature pyramid.
    ///
    /// # Arguments
    /// * `features` - Encoder feature maps ordered from the highest to the lowest resolution
    /// * `output_size` - `[height, width]` of the result, defaults to the finest feature map
    fn forward(&self, features: Vec<Tensor<B, 4>>, output_size: Option<[usize; 2]>)
        -> Tensor<B, 4>;

    /// Channels of the decoded map.
    fn out_channels(&self) -> usize;
}

/// Enum to wrap the available decoders
#[derive(Module, Debug)]
pub enum DecoderWrapper<B: Backend> {
    Unet(UnetDecoder<B>),
    UnetHypercolumn(HypercolumnDecoder<B>),
}

impl<B: Backend> Decoder<B> for DecoderWrapper<B> {
    fn forward(
        &self,
        features: Vec<Tensor<B, 4>>,
        output_size: Option<[usize; 2]>,
    ) -> Tensor<B, 4> {
        match self {
            Self::Unet(decoder) => decoder.forward(features, output_size),
            Self::UnetHypercolumn(decoder) => decoder.forward(features, output_size),
        }
    }

    fn out_channels(&self) -> usize {
        match self {
            Self::Unet(decoder) => decoder.out_channels(),
            Self::UnetHypercolumn(decoder) => decoder.out_channels(),
        }
    }
}

impl UnetDecoderConfig {
    /// Builds the decoder configuration described by `spec`.
    pub fn from_spec(spec: &DecoderSpec) -> Self {
        Self::new(spec.encoder_channels.clone(), spec.decoder_channels.clone())
            .with_n_blocks(spec.n_blocks)
            .with_block_type(spec.block_type.clone())
            .with_upsample_mode(spec.upsample_mode.clone())
            .with_resize_mode(spec.resize_mode.clone())
    }
}

impl HypercolumnDecoderConfig {
    /// Builds the decoder configuration described by `spec`.
    pub fn from_spec(spec: &DecoderSpec) -> Self {
        Self::new(spec.encoder_channels.clone(), spec.decoder_channels.clone())
            .with_n_blocks(spec.n_blocks)
            .with_block_type(spec.block_type.clone())
            .with_upsample_mode(spec.upsample_mode.clone())
            .with_resize_mode(spec.resize_mode.clone())
            .with_apply_upsample(spec.apply_upsample)
            .with_head_channels(spec.head_channels)
            .with_out_channels(spec.out_channels)
    }
}

/// Checks the channel bookkeeping shared by every decoder.
///
/// `skip_stages` is the number of decoder stages that consume an encoder feature map.
fn check_stages(
    encoder_channels: &[usize],
    decoder_channels: &[usize],
    n_blocks: usize,
    skip_stages: usize,
) -> OpenSegResult<()> {
    if decoder_channels.len() != n_blocks + 1 {
        return Err(OpenSegError::InvalidConfiguration {
            reason: format!(
                "{} decoder stages need {} decoder channels, got {}",
                n_blocks,
                n_blocks + 1,
                decoder_channels.len()
            ),
        });
    }

    if n_blocks < skip_stages {
        return Err(OpenSegError::InvalidConfiguration {
            reason: format!(
                "{} encoder levels are fused by {} stages, only {} configured",
                encoder_channels.len(),
                skip_stages,
                n_blocks
            ),
        });
    }

    if let Some(index) = decoder_channels.iter().position(|&channels| channels == 0) {
        return Err(OpenSegError::InvalidConfiguration {
            reason: format!("decoder stage {index} has zero channels"),
        });
    }

    Ok(())
}

/// Spatial size of the highest-resolution feature map.
fn finest_size<B: Backend>(features: &[Tensor<B, 4>]) -> [usize; 2] {
    let [_, _, height, width] = features[0].dims();
    [height, width]
}

/// `Simple` blocks only change resolution when they upsample.
fn simple_blocks_upsample(block_type: &DecoderBlockType, apply_upsample: bool) -> bool {
    *block_type != DecoderBlockType::Simple || apply_upsample
}
