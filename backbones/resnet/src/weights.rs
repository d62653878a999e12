//! Loading torchvision checkpoints into a [`ResNet`].

use std::path::PathBuf;

use burn::{
    prelude::*,
    record::{FullPrecisionSettings, Recorder},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

use crate::{ResNet, ResNetError, ResNetRecord, ResNetResult};

impl<B: Backend> ResNet<B> {
    /// Loads a torchvision `state_dict` (`.pth`) into this backbone.
    ///
    /// The classifier head and stages that were not built are ignored.
    ///
    /// # Errors
    ///
    /// Returns `ResNetError::WeightLoadingFailed` if the file cannot be read or does not
    /// match the backbone layout.
    pub fn load_torchvision_weights(
        self,
        path: impl Into<PathBuf>,
        device: &B::Device,
    ) -> ResNetResult<Self> {
        let load_args = LoadArgs::new(path.into())
            .with_key_remap("^conv1\\.(.+)", "stem.conv1.$1")
            .with_key_remap("^bn1\\.(.+)", "stem.bn1.$1")
            .with_key_remap("^(layer[1-4])\\.([0-9]+)\\.(.+)", "$1.blocks.$2.$3")
            .with_key_remap("(.+)\\.downsample\\.0\\.(.+)", "$1.downsample.conv.$2")
            .with_key_remap("(.+)\\.downsample\\.1\\.(.+)", "$1.downsample.bn.$2");

        let record: ResNetRecord<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
            .load(load_args, device)
            .map_err(|e| ResNetError::WeightLoadingFailed {
                reason: format!("PyTorch record loading failed: {e}"),
            })?;

        Ok(self.load_record(record))
    }
}
