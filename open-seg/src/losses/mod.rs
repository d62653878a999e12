//! Loss functions for segmentation training.
//!
//! Every loss reads raw logits `[batch_size, channels, height, width]` and a float target of
//! the same spatial size. Losses that work on probabilities apply a sigmoid to single-channel
//! logits and a channel softmax otherwise.

pub mod bce;
pub mod collection;
pub mod cross_entropy;
pub mod dice;
pub mod mae;
pub mod mse;

pub use bce::BinaryCrossEntropyLoss;
pub use collection::{LossCollection, LossFunction, LossReport, NamedLoss};
pub use cross_entropy::PixelCrossEntropyLoss;
pub use dice::{DiceLoss, DiceLossConfig};
pub use mae::MaeLoss;
pub use mse::MseLoss;

use burn::{
    prelude::*,
    tensor::activation::{sigmoid, softmax},
};

/// Converts logits to probabilities along the channel axis.
pub(crate) fn probabilities<B: Backend>(logits: Tensor<B, 4>) -> Tensor<B, 4> {
    if logits.dims()[1] == 1 {
        sigmoid(logits)
    } else {
        softmax(logits, 1)
    }
}
