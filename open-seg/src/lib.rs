//! # OpenSeg-Burn
//!
//! Encoder-decoder semantic segmentation built with the Burn deep learning framework.
//! A ResNet backbone produces a feature pyramid, a U-Net or hypercolumn decoder fuses it,
//! and a segmentation head maps the result to per-pixel class logits. Every configured
//! loss is evaluated against the target and reported by name.
//!
//! ## Modules
//!
//! - `config`: Serializable descriptions of the backbone, decoder, head and losses.
//! - `error`: Defines the custom error types used throughout the crate.
//! - `losses`: Pixel-wise loss functions and the named loss collection.
//! - `models`: Decoder blocks, decoders, the segmentation head and the `EncoderDecoder`.
//! - `registry`: Name-keyed factories that turn a `ModelConfig` into a model.
//! - `training`: `TrainStep`/`ValidStep` integration, behind the `train` feature.
//!
//! ## Key Components
//!
//! - `EncoderDecoder`: The segmenter struct, with `Segmenter` naming the ResNet-backed variant.
//! - `ModelConfig`: The primary configuration struct that drives the model's construction.
//! - `ModelRegistry`: Resolves the configured component names.
//! - `OpenSegError`: The enum for all possible errors.

mod config;
mod error;
pub mod losses;
pub mod models;
mod registry;

#[cfg(feature = "train")]
pub mod training;

#[doc(inline)]
pub use config::{BackboneSpec, DecoderBlockType, DecoderSpec, LossKind, LossSpec, ModelConfig};
#[doc(inline)]
pub use error::{OpenSegError, OpenSegResult};
#[doc(inline)]
pub use models::{
    Decoder, DecoderWrapper, EncoderDecoder, EncoderDecoderRecord, HypercolumnDecoder,
    HypercolumnDecoderConfig, SegmentationHead, SegmentationHeadConfig, Segmenter, TestOutput,
    UnetDecoder, UnetDecoderConfig,
};
#[doc(inline)]
pub use registry::{
    build_encoder_decoder, BackboneFactory, DecoderFactory, ModelRegistry, SegmenterFactory,
};
#[cfg(feature = "train")]
#[doc(inline)]
pub use training::{SegmentationBatch, SegmentationOutput};

pub use backbones;
pub use burn_extra_ops::UpsampleMode;
