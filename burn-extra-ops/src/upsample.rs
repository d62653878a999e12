//! # Scale-factor upsampling
//!
//! Burn's `interpolate` takes an explicit output size. Decoder stages are specified with an
//! integer scale factor instead, so these helpers derive the output size from the input.

use burn::{
    module::Ignored,
    prelude::*,
    tensor::{
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

/// Interpolation used when resizing feature maps.
#[derive(Config, Debug, PartialEq, Eq, Hash)]
pub enum UpsampleMode {
    /// Nearest-neighbour interpolation.
    Nearest,
    /// Bilinear interpolation with aligned corners.
    Bilinear,
}

impl Default for UpsampleMode {
    fn default() -> Self {
        Self::Nearest
    }
}

impl UpsampleMode {
    const fn interpolate_mode(&self) -> InterpolateMode {
        match self {
            Self::Nearest => InterpolateMode::Nearest,
            Self::Bilinear => InterpolateMode::Bilinear,
        }
    }
}

/// Resizes `tensor` to `size` (`[height, width]`).
///
/// Returns the input unchanged when it already has the requested size.
pub fn resize_to<B: Backend>(
    tensor: Tensor<B, 4>,
    size: [usize; 2],
    mode: &UpsampleMode,
) -> Tensor<B, 4> {
    let [_, _, h, w] = tensor.dims();
    if [h, w] == size {
        return tensor;
    }
    interpolate(
        tensor,
        size,
        InterpolateOptions::new(mode.interpolate_mode()),
    )
}

/// Upsamples `tensor` spatially by an integer `scale_factor`.
pub fn upsample<B: Backend>(
    tensor: Tensor<B, 4>,
    scale_factor: usize,
    mode: &UpsampleMode,
) -> Tensor<B, 4> {
    let [_, _, h, w] = tensor.dims();
    resize_to(tensor, [h * scale_factor, w * scale_factor], mode)
}

/// Configuration for the `Upsample` module.
#[derive(Config, Debug)]
pub struct UpsampleConfig {
    /// Spatial multiplier applied to height and width.
    #[config(default = "2")]
    pub scale_factor: usize,
    /// Interpolation mode.
    #[config(default = "UpsampleMode::Nearest")]
    pub mode: UpsampleMode,
}

impl UpsampleConfig {
    /// Initializes a new `Upsample` module.
    pub fn init(&self) -> Upsample {
        Upsample {
            scale_factor: self.scale_factor,
            mode: Ignored(self.mode.clone()),
        }
    }
}

/// Parameter-free upsampling layer.
///
/// # Shapes
/// - input: `[batch_size, channels, height, width]`
/// - output: `[batch_size, channels, height * scale_factor, width * scale_factor]`
#[derive(Module, Clone, Debug)]
pub struct Upsample {
    scale_factor: usize,
    mode: Ignored<UpsampleMode>,
}

impl Upsample {
    /// The configured spatial multiplier.
    pub const fn scale_factor(&self) -> usize {
        self.scale_factor
    }

    pub fn forward<B: Backend>(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        upsample(input, self.scale_factor, &self.mode)
    }
}
