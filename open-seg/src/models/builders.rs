//! # Component Builders
//!
//! Factories that construct backbones and decoders from their configuration specs. The
//! default [`crate::ModelRegistry`] registers these under their configuration names.

use backbones::{create_backbone, BackboneType, BackboneWrapper};
use burn::prelude::*;
use tracing::debug;

use super::decoders::{DecoderWrapper, HypercolumnDecoderConfig, UnetDecoderConfig};
use crate::{
    config::{BackboneSpec, DecoderSpec},
    error::OpenSegResult,
};

/// Constructs a backbone of the given type shaped by `spec`.
///
/// # Errors
///
/// Returns an error if `spec.n_blocks` is out of range, or if pretrained weights are
/// requested and cannot be loaded.
pub fn build_backbone<B: Backend>(
    backbone_type: &BackboneType,
    spec: &BackboneSpec,
    device: &Device<B>,
) -> OpenSegResult<BackboneWrapper<B>> {
    let backbone = create_backbone(backbone_type, spec.n_blocks, device)?;
    debug!(
        backbone = backbone_type.name(),
        n_blocks = spec.n_blocks,
        "built backbone"
    );

    match &spec.pretrained {
        Some(path) => load_pretrained(backbone, path, device),
        None => Ok(backbone),
    }
}

#[cfg(feature = "pretrained")]
fn load_pretrained<B: Backend>(
    backbone: BackboneWrapper<B>,
    path: &std::path::Path,
    device: &Device<B>,
) -> OpenSegResult<BackboneWrapper<B>> {
    debug!(path = %path.display(), "loading pretrained backbone weights");
    Ok(backbone.load_pretrained(path, device)?)
}

#[cfg(not(feature = "pretrained"))]
fn load_pretrained<B: Backend>(
    _backbone: BackboneWrapper<B>,
    path: &std::path::Path,
    _device: &Device<B>,
) -> OpenSegResult<BackboneWrapper<B>> {
    Err(crate::error::OpenSegError::WeightLoadingFailed {
        reason: format!(
            "{} requested but the `pretrained` feature is disabled",
            path.display()
        ),
    })
}

/// Constructs a plain U-Net decoder.
///
/// # Errors
///
/// Returns `OpenSegError::InvalidConfiguration` if the channel lists are inconsistent.
pub fn build_unet<B: Backend>(
    spec: &DecoderSpec,
    device: &Device<B>,
) -> OpenSegResult<DecoderWrapper<B>> {
    let decoder = UnetDecoderConfig::from_spec(spec).init(device)?;
    debug!(
        decoder = "unet",
        block_type = spec.block_type.name(),
        out_channels = decoder.out_channels(),
        "built decoder"
    );
    Ok(DecoderWrapper::Unet(decoder))
}

/// Constructs a U-Net decoder with a hypercolumn output.
///
/// # Errors
///
/// Returns `OpenSegError::InvalidConfiguration` if the channel lists are inconsistent.
pub fn build_unet_hypercolumn<B: Backend>(
    spec: &DecoderSpec,
    device: &Device<B>,
) -> OpenSegResult<DecoderWrapper<B>> {
    let decoder = HypercolumnDecoderConfig::from_spec(spec).init(device)?;
    debug!(
        decoder = "unet_hypercolumn",
        block_type = spec.block_type.name(),
        out_channels = decoder.out_channels(),
        "built decoder"
    );
    Ok(DecoderWrapper::UnetHypercolumn(decoder))
}
