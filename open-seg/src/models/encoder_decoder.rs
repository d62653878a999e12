//! # Encoder-Decoder Segmenter
//!
//! Chains a backbone, a decoder and a segmentation head, and evaluates the configured losses.
//! Loss computation always runs in full precision: logits and targets are cast to `f32`
//! before any loss function sees them.

use std::collections::HashMap;

use backbones::{Backbone, BackboneWrapper};
use burn::{prelude::*, tensor::FloatDType};

use super::{
    decoders::{Decoder, DecoderWrapper},
    modules::{SegmentationHead, SegmentationHeadConfig},
};
use crate::losses::{LossCollection, LossReport};

/// The segmenter built from a [`crate::ModelConfig`].
pub type Segmenter<B> = EncoderDecoder<B, BackboneWrapper<B>>;

/// Validation result of [`EncoderDecoder::forward_test`].
#[derive(Debug, Clone)]
pub struct TestOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    pub logits: Tensor<B, 4>,
}

/// Backbone, decoder and segmentation head with a loss collection.
#[derive(Module, Debug)]
pub struct EncoderDecoder<B: Backend, E> {
    backbone: E,
    decoder: DecoderWrapper<B>,
    seg_head: SegmentationHead<B>,
    losses: LossCollection<B>,
}

impl<B: Backend, E: Backbone<B>> EncoderDecoder<B, E> {
    /// Assembles a segmenter. The head reads as many channels as the decoder produces.
    pub fn new(
        backbone: E,
        decoder: DecoderWrapper<B>,
        head: &SegmentationHeadConfig,
        losses: LossCollection<B>,
        device: &B::Device,
    ) -> Self {
        let seg_head = head.init(decoder.out_channels(), device);

        Self {
            backbone,
            decoder,
            seg_head,
            losses,
        }
    }

    /// Predicts class logits.
    ///
    /// # Shapes
    /// - image: `[batch_size, 3, height, width]`
    /// - output: `[batch_size, num_classes, height, width]` when `height` and `width` are
    ///   multiples of the head's upsampling factor
    pub fn forward(&self, image: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = image.dims();
        let upsampling = self.seg_head.upsampling();

        let features = self.backbone.forward(image);
        let decoded = self
            .decoder
            .forward(features, Some([height / upsampling, width / upsampling]));

        self.seg_head.forward(decoded)
    }

    /// Predicts logits and evaluates every loss against `target`.
    pub fn forward_loss(
        &self,
        image: Tensor<B, 4>,
        target: Tensor<B, 4>,
    ) -> (Tensor<B, 4>, LossReport<B>) {
        let logits = self.forward(image);
        let report = self.compute_losses(logits.clone(), target);
        (logits, report)
    }

    /// Total loss and the per-name breakdown for a training batch.
    pub fn forward_train(
        &self,
        image: Tensor<B, 4>,
        target: Tensor<B, 4>,
    ) -> (Tensor<B, 1>, HashMap<String, Tensor<B, 1>>) {
        let (_, report) = self.forward_loss(image, target);
        (report.total, report.losses)
    }

    /// Total loss and the logits for a validation batch.
    pub fn forward_test(&self, image: Tensor<B, 4>, target: Tensor<B, 4>) -> TestOutput<B> {
        let (logits, report) = self.forward_loss(image, target);
        TestOutput {
            loss: report.total,
            logits,
        }
    }

    fn compute_losses(&self, logits: Tensor<B, 4>, target: Tensor<B, 4>) -> LossReport<B> {
        self.losses
            .forward(logits.cast(FloatDType::F32), target.cast(FloatDType::F32))
    }

    pub const fn backbone(&self) -> &E {
        &self.backbone
    }

    pub const fn decoder(&self) -> &DecoderWrapper<B> {
        &self.decoder
    }

    pub const fn losses(&self) -> &LossCollection<B> {
        &self.losses
    }

    pub fn num_classes(&self) -> usize {
        self.seg_head.num_classes()
    }
}
