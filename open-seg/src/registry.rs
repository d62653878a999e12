//! # Model Registry
//!
//! Maps configuration names to component factories. A registry is an ordinary value owned by
//! the application: build one with [`ModelRegistry::with_defaults`], register custom factories
//! on it and pass it to whatever builds models.

use std::collections::HashMap;

use backbones::{Backbone, BackboneType, BackboneWrapper};
use burn::prelude::*;
use tracing::{debug, info};

use crate::{
    config::{BackboneSpec, DecoderSpec, ModelConfig},
    error::{OpenSegError, OpenSegResult},
    losses::LossCollection,
    models::{
        build_backbone, build_unet, build_unet_hypercolumn, DecoderWrapper, EncoderDecoder,
        Segmenter,
    },
};

/// Builds a backbone from its spec.
pub type BackboneFactory<B> = Box<
    dyn Fn(&BackboneSpec, &<B as Backend>::Device) -> OpenSegResult<BackboneWrapper<B>>
        + Send
        + Sync,
>;

/// Builds a decoder from its spec.
pub type DecoderFactory<B> = Box<
    dyn Fn(&DecoderSpec, &<B as Backend>::Device) -> OpenSegResult<DecoderWrapper<B>>
        + Send
        + Sync,
>;

/// Builds a complete segmenter, resolving its components through the registry.
pub type SegmenterFactory<B> = Box<
    dyn Fn(&ModelConfig, &ModelRegistry<B>, &<B as Backend>::Device) -> OpenSegResult<Segmenter<B>>
        + Send
        + Sync,
>;

const BACKBONE: &str = "backbone";
const DECODER: &str = "decoder";
const SEGMENTER: &str = "segmenter";

/// Name-to-factory tables for backbones, decoders and segmenters.
pub struct ModelRegistry<B: Backend> {
    backbones: HashMap<String, BackboneFactory<B>>,
    decoders: HashMap<String, DecoderFactory<B>>,
    segmenters: HashMap<String, SegmenterFactory<B>>,
}

impl<B: Backend> Default for ModelRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> core::fmt::Debug for ModelRegistry<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("backbones", &sorted_names(&self.backbones))
            .field("decoders", &sorted_names(&self.decoders))
            .field("segmenters", &sorted_names(&self.segmenters))
            .finish()
    }
}

impl<B: Backend> ModelRegistry<B> {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            backbones: HashMap::new(),
            decoders: HashMap::new(),
            segmenters: HashMap::new(),
        }
    }

    /// A registry holding every built-in backbone, both decoders and the `encoder_decoder`
    /// segmenter.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        for backbone_type in BackboneType::ALL {
            registry.backbones.insert(
                backbone_type.name().to_string(),
                Box::new(move |spec: &BackboneSpec, device: &B::Device| {
                    build_backbone(&backbone_type, spec, device)
                }),
            );
        }
        registry
            .decoders
            .insert("unet".to_string(), Box::new(build_unet::<B>));
        registry.decoders.insert(
            "unet_hypercolumn".to_string(),
            Box::new(build_unet_hypercolumn::<B>),
        );
        registry.segmenters.insert(
            "encoder_decoder".to_string(),
            Box::new(build_encoder_decoder::<B>),
        );

        registry
    }

    /// # Errors
    ///
    /// Returns `OpenSegError::DuplicateComponent` if `name` is already taken.
    pub fn register_backbone<F>(&mut self, name: impl Into<String>, factory: F) -> OpenSegResult<()>
    where
        F: Fn(&BackboneSpec, &B::Device) -> OpenSegResult<BackboneWrapper<B>>
            + Send
            + Sync
            + 'static,
    {
        insert(&mut self.backbones, BACKBONE, name.into(), Box::new(factory))
    }

    /// # Errors
    ///
    /// Returns `OpenSegError::DuplicateComponent` if `name` is already taken.
    pub fn register_decoder<F>(&mut self, name: impl Into<String>, factory: F) -> OpenSegResult<()>
    where
        F: Fn(&DecoderSpec, &B::Device) -> OpenSegResult<DecoderWrapper<B>>
            + Send
            + Sync
            + 'static,
    {
        insert(&mut self.decoders, DECODER, name.into(), Box::new(factory))
    }

    /// # Errors
    ///
    /// Returns `OpenSegError::DuplicateComponent` if `name` is already taken.
    pub fn register_segmenter<F>(
        &mut self,
        name: impl Into<String>,
        factory: F,
    ) -> OpenSegResult<()>
    where
        F: Fn(&ModelConfig, &Self, &B::Device) -> OpenSegResult<Segmenter<B>>
            + Send
            + Sync
            + 'static,
    {
        insert(&mut self.segmenters, SEGMENTER, name.into(), Box::new(factory))
    }

    /// Builds the backbone registered under `spec.name`.
    ///
    /// # Errors
    ///
    /// Returns `OpenSegError::UnknownComponent` for an unregistered name, or the factory's error.
    pub fn build_backbone(
        &self,
        spec: &BackboneSpec,
        device: &B::Device,
    ) -> OpenSegResult<BackboneWrapper<B>> {
        let factory = lookup(&self.backbones, BACKBONE, &spec.name)?;
        factory(spec, device)
    }

    /// Builds the decoder registered under `spec.name`.
    ///
    /// # Errors
    ///
    /// Returns `OpenSegError::UnknownComponent` for an unregistered name, or the factory's error.
    pub fn build_decoder(
        &self,
        spec: &DecoderSpec,
        device: &B::Device,
    ) -> OpenSegResult<DecoderWrapper<B>> {
        let factory = lookup(&self.decoders, DECODER, &spec.name)?;
        factory(spec, device)
    }

    /// Validates `config` and builds the segmenter registered under `config.segmenter`.
    ///
    /// # Errors
    ///
    /// Returns the first validation, lookup or construction error.
    pub fn build_segmenter(
        &self,
        config: &ModelConfig,
        device: &B::Device,
    ) -> OpenSegResult<Segmenter<B>> {
        config.validate()?;
        let factory = lookup(&self.segmenters, SEGMENTER, &config.segmenter)?;
        let segmenter = factory(config, self, device)?;

        info!(
            segmenter = %config.segmenter,
            backbone = %config.backbone.name,
            decoder = %config.decoder.name,
            losses = config.losses.len(),
            "built segmenter"
        );
        Ok(segmenter)
    }

    /// Registered backbone names, sorted.
    pub fn backbone_names(&self) -> Vec<&str> {
        sorted_names(&self.backbones)
    }

    /// Registered decoder names, sorted.
    pub fn decoder_names(&self) -> Vec<&str> {
        sorted_names(&self.decoders)
    }

    /// Registered segmenter names, sorted.
    pub fn segmenter_names(&self) -> Vec<&str> {
        sorted_names(&self.segmenters)
    }
}

/// The `encoder_decoder` segmenter factory.
///
/// Empty decoder `encoder_channels` are filled from the built backbone. Explicit ones must
/// match it.
///
/// # Errors
///
/// Returns the first lookup or construction error, or `OpenSegError::InvalidConfiguration`
/// when explicit encoder channels disagree with the backbone.
pub fn build_encoder_decoder<B: Backend>(
    config: &ModelConfig,
    registry: &ModelRegistry<B>,
    device: &B::Device,
) -> OpenSegResult<Segmenter<B>> {
    let backbone = registry.build_backbone(&config.backbone, device)?;
    let backbone_channels = backbone.out_channels();

    let mut decoder_spec = config.decoder.clone();
    if decoder_spec.encoder_channels.is_empty() {
        decoder_spec.encoder_channels = backbone_channels;
    } else if decoder_spec.encoder_channels != backbone_channels {
        return Err(OpenSegError::InvalidConfiguration {
            reason: format!(
                "decoder expects encoder channels {:?} but backbone {} produces {:?}",
                decoder_spec.encoder_channels, config.backbone.name, backbone_channels
            ),
        });
    }

    let decoder = registry.build_decoder(&decoder_spec, device)?;
    let losses = LossCollection::from_specs(&config.losses, device)?;
    debug!(losses = ?losses.names(), "built loss collection");

    Ok(EncoderDecoder::new(
        backbone,
        decoder,
        &config.head,
        losses,
        device,
    ))
}

fn insert<T>(
    table: &mut HashMap<String, T>,
    kind: &'static str,
    name: String,
    factory: T,
) -> OpenSegResult<()> {
    if table.contains_key(&name) {
        return Err(OpenSegError::DuplicateComponent { kind, name });
    }
    debug!(kind, name = %name, "registered factory");
    table.insert(name, factory);
    Ok(())
}

fn lookup<'a, T>(
    table: &'a HashMap<String, T>,
    kind: &'static str,
    name: &str,
) -> OpenSegResult<&'a T> {
    table
        .get(name)
        .ok_or_else(|| OpenSegError::UnknownComponent {
            kind,
            name: name.to_string(),
        })
}

fn sorted_names<T>(table: &HashMap<String, T>) -> Vec<&str> {
    let mut names: Vec<&str> = table.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{DecoderBlockType, LossKind, LossSpec},
        models::SegmentationHeadConfig,
    };
    use backbones::{create_backbone, ResNetVariant};
    use burn::{backend::NdArray, tensor::Distribution};

    type TestBackend = NdArray<f32>;

    fn small_config() -> ModelConfig {
        ModelConfig::new()
            .with_backbone(BackboneSpec::new().with_name("resnet18".to_string()))
            .with_decoder(DecoderSpec::new().with_decoder_channels(vec![32, 16, 8, 8, 4]))
    }

    #[test]
    fn test_default_names() {
        let registry = ModelRegistry::<TestBackend>::with_defaults();

        assert_eq!(
            registry.backbone_names(),
            vec![
                "resnet101",
                "resnet152",
                "resnet18",
                "resnet34",
                "resnet50",
                "resnext101_32x8d",
                "resnext50_32x4d",
            ]
        );
        assert_eq!(registry.decoder_names(), vec!["unet", "unet_hypercolumn"]);
        assert_eq!(registry.segmenter_names(), vec!["encoder_decoder"]);
    }

    #[test]
    fn test_build_default_segmenter() {
        let device = Default::default();
        let registry = ModelRegistry::<TestBackend>::with_defaults();

        let model = registry.build_segmenter(&small_config(), &device).unwrap();
        let image = Tensor::random([1, 3, 64, 64], Distribution::Normal(0.0, 1.0), &device);

        assert_eq!(model.forward(image).dims(), [1, 1, 64, 64]);
        assert_eq!(model.backbone().out_channels(), vec![64, 64, 128, 256, 512]);
    }

    #[test]
    fn test_segmenter_accepts_sides_off_the_stride_grid() {
        let device = Default::default();
        let registry = ModelRegistry::<TestBackend>::with_defaults();

        let model = registry.build_segmenter(&small_config(), &device).unwrap();
        let image = Tensor::random([1, 3, 100, 100], Distribution::Normal(0.0, 1.0), &device);

        assert_eq!(model.forward(image).dims(), [1, 1, 100, 100]);
    }

    #[test]
    fn test_build_unet_segmenter() {
        let device = Default::default();
        let registry = ModelRegistry::<TestBackend>::with_defaults();
        let config = ModelConfig::new()
            .with_backbone(
                BackboneSpec::new()
                    .with_name("resnet18".to_string())
                    .with_n_blocks(4),
            )
            .with_decoder(
                DecoderSpec::new()
                    .with_name("unet".to_string())
                    .with_decoder_channels(vec![32, 16, 8, 8])
                    .with_n_blocks(3)
                    .with_block_type(DecoderBlockType::Bottleneck),
            )
            .with_head(SegmentationHeadConfig::new().with_num_classes(3))
            .with_losses(vec![LossSpec::new(
                "ce".to_string(),
                LossKind::CrossEntropy,
            )]);

        let model = registry.build_segmenter(&config, &device).unwrap();
        let image = Tensor::random([2, 3, 32, 32], Distribution::Normal(0.0, 1.0), &device);
        let target = Tensor::zeros([2, 1, 32, 32], &device);

        let (total, losses) = model.forward_train(image, target);

        assert_eq!(total.dims(), [1]);
        assert!(losses.contains_key("ce"));
        assert_eq!(model.num_classes(), 3);
    }

    #[test]
    fn test_unknown_names() {
        let device = Default::default();
        let registry = ModelRegistry::<TestBackend>::with_defaults();

        let result = registry.build_backbone(
            &BackboneSpec::new().with_name("vgg16".to_string()),
            &device,
        );
        match result {
            Err(OpenSegError::UnknownComponent { kind, name }) => {
                assert_eq!(kind, "backbone");
                assert_eq!(name, "vgg16");
            }
            _ => panic!("Expected UnknownComponent error"),
        }

        let config = small_config().with_segmenter("mask_rcnn".to_string());
        assert!(matches!(
            registry.build_segmenter(&config, &device),
            Err(OpenSegError::UnknownComponent { kind: "segmenter", .. })
        ));
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = ModelRegistry::<TestBackend>::with_defaults();

        let result = registry.register_decoder("unet", build_unet::<TestBackend>);

        assert!(matches!(
            result,
            Err(OpenSegError::DuplicateComponent { kind: "decoder", .. })
        ));
    }

    #[test]
    fn test_custom_backbone_factory() {
        let device = Default::default();
        let mut registry = ModelRegistry::<TestBackend>::with_defaults();
        registry
            .register_backbone("tiny", |spec, device| {
                let backbone_type = BackboneType::ResNet(ResNetVariant::ResNet18);
                Ok(create_backbone(&backbone_type, spec.n_blocks, device)?)
            })
            .unwrap();
        let config = small_config().with_backbone(
            BackboneSpec::new()
                .with_name("tiny".to_string())
                .with_n_blocks(3),
        );
        let config = config.with_decoder(
            DecoderSpec::new()
                .with_decoder_channels(vec![16, 8, 8])
                .with_n_blocks(2),
        );

        let model = registry.build_segmenter(&config, &device).unwrap();
        let image = Tensor::random([1, 3, 32, 32], Distribution::Normal(0.0, 1.0), &device);

        assert_eq!(model.forward(image).dims(), [1, 1, 32, 32]);
    }

    #[test]
    fn test_encoder_channel_mismatch_fails_at_construction() {
        let device = Default::default();
        let registry = ModelRegistry::<TestBackend>::with_defaults();
        let mut config = small_config();
        config.decoder.encoder_channels = vec![3, 16, 32, 64, 128];

        let result = registry.build_segmenter(&config, &device);

        assert!(matches!(
            result,
            Err(OpenSegError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_missing_pretrained_weights() {
        let device = Default::default();
        let registry = ModelRegistry::<TestBackend>::with_defaults();
        let spec = BackboneSpec::new()
            .with_name("resnet18".to_string())
            .with_pretrained(Some("missing/resnet18.pth".into()));

        let result = registry.build_backbone(&spec, &device);

        assert!(result.is_err());
    }
}
