//! Training functionality for segmenters.
//!
//! This module implements the `TrainStep` and `ValidStep` traits for [`Segmenter`], enabling
//! integration with the Burn `Learner`.

use burn::{
    prelude::*,
    tensor::{backend::AutodiffBackend, Transaction},
    train::{
        metric::{Adaptor, ItemLazy, LossInput},
        TrainOutput, TrainStep, ValidStep,
    },
};

use crate::models::Segmenter;

/// A batch of images and their segmentation targets.
#[derive(Debug, Clone)]
pub struct SegmentationBatch<B: Backend> {
    /// Images with shape `[batch_size, 3, height, width]`.
    pub images: Tensor<B, 4>,
    /// Targets with shape `[batch_size, 1 | num_classes, height, width]`.
    pub targets: Tensor<B, 4>,
}

/// Output of a training or validation step.
#[derive(Debug, Clone)]
pub struct SegmentationOutput<B: Backend> {
    pub logits: Tensor<B, 4>,
    pub targets: Tensor<B, 4>,
    /// Total of every configured loss.
    pub loss: Tensor<B, 1>,
}

impl<B: Backend> ItemLazy for SegmentationOutput<B> {
    type ItemSync = Self;

    fn sync(self) -> Self::ItemSync {
        let transaction_result = Transaction::default()
            .register(self.logits)
            .register(self.targets)
            .register(self.loss)
            .execute();

        let [logits, targets, loss] = transaction_result.try_into().unwrap_or_else(|_| {
            panic!("Failed to extract exactly 3 tensors [logits, targets, loss] from transaction")
        });

        let device = &Default::default();

        Self {
            logits: Tensor::from_data(logits, device),
            targets: Tensor::from_data(targets, device),
            loss: Tensor::from_data(loss, device),
        }
    }
}

impl<B: Backend> Adaptor<LossInput<B>> for SegmentationOutput<B> {
    fn adapt(&self) -> LossInput<B> {
        LossInput::new(self.loss.clone())
    }
}

impl<B: Backend> Segmenter<B> {
    /// Runs the model and every loss on a batch.
    pub fn forward_segmentation(&self, batch: SegmentationBatch<B>) -> SegmentationOutput<B> {
        let (logits, report) = self.forward_loss(batch.images, batch.targets.clone());

        SegmentationOutput {
            logits,
            targets: batch.targets,
            loss: report.total,
        }
    }
}

impl<B: AutodiffBackend> TrainStep<SegmentationBatch<B>, SegmentationOutput<B>> for Segmenter<B> {
    fn step(&self, batch: SegmentationBatch<B>) -> TrainOutput<SegmentationOutput<B>> {
        let item = self.forward_segmentation(batch);
        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<SegmentationBatch<B>, SegmentationOutput<B>> for Segmenter<B> {
    fn step(&self, batch: SegmentationBatch<B>) -> SegmentationOutput<B> {
        self.forward_segmentation(batch)
    }
}
