//! # Model Architectures
//!
//! - `builders`: factories turning configuration specs into backbones and decoders.
//! - `decoders`: the U-Net and hypercolumn decoders.
//! - `encoder_decoder`: the `EncoderDecoder` segmenter tying everything together.
//! - `modules`: decoder blocks and the segmentation head.

pub mod builders;
pub mod decoders;
pub mod encoder_decoder;
pub mod modules;

pub use builders::*;
pub use decoders::*;
pub use encoder_decoder::*;
pub use modules::*;
