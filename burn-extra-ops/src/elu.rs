//! Exponential linear unit.
//!
//! `elu(x) = x` for `x > 0` and `alpha * (exp(x) - 1)` otherwise.

use burn::prelude::*;

/// Applies the exponential linear unit element-wise.
pub fn elu<B: Backend, const D: usize>(x: Tensor<B, D>, alpha: f64) -> Tensor<B, D> {
    let positive = x.clone().clamp_min(0.0);
    let negative = (x.clamp_max(0.0).exp() - 1.0) * alpha;
    positive + negative
}

/// Configuration for the `Elu` module.
#[derive(Config, Debug)]
pub struct EluConfig {
    /// Scale of the negative saturation.
    #[config(default = "1.0")]
    pub alpha: f64,
}

impl EluConfig {
    /// Initializes a new `Elu` module.
    pub const fn init(&self) -> Elu {
        Elu { alpha: self.alpha }
    }
}

/// ELU activation layer.
#[derive(Module, Clone, Debug)]
pub struct Elu {
    alpha: f64,
}

impl Default for Elu {
    fn default() -> Self {
        EluConfig::new().init()
    }
}

impl Elu {
    /// Create a new ELU layer with `alpha = 1.0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward pass.
    ///
    /// # Shapes
    /// - input: `[..., any]`
    /// - output: `[..., any]`
    pub fn forward<B: Backend, const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        elu(input, self.alpha)
    }
}
