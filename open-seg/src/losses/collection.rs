//! Named loss functions evaluated together.

use std::collections::{HashMap, HashSet};

use burn::{module::Ignored, prelude::*};

use super::{BinaryCrossEntropyLoss, DiceLoss, MaeLoss, MseLoss, PixelCrossEntropyLoss};
use crate::{
    config::{LossKind, LossSpec},
    error::{OpenSegError, OpenSegResult},
};

/// Any of the built-in loss functions.
#[derive(Module, Debug)]
pub enum LossFunction<B: Backend> {
    BinaryCrossEntropy(BinaryCrossEntropyLoss<B>),
    CrossEntropy(PixelCrossEntropyLoss<B>),
    Dice(DiceLoss<B>),
    Mae(MaeLoss<B>),
    Mse(MseLoss<B>),
}

impl<B: Backend> LossFunction<B> {
    /// Creates the loss function of the given kind with default settings.
    pub fn new(kind: &LossKind, device: &B::Device) -> Self {
        match kind {
            LossKind::BinaryCrossEntropy => Self::BinaryCrossEntropy(BinaryCrossEntropyLoss::new()),
            LossKind::CrossEntropy => Self::CrossEntropy(PixelCrossEntropyLoss::new(device)),
            LossKind::Dice => Self::Dice(DiceLoss::new()),
            LossKind::Mae => Self::Mae(MaeLoss::new()),
            LossKind::Mse => Self::Mse(MseLoss::new()),
        }
    }

    pub const fn kind(&self) -> LossKind {
        match self {
            Self::BinaryCrossEntropy(_) => LossKind::BinaryCrossEntropy,
            Self::CrossEntropy(_) => LossKind::CrossEntropy,
            Self::Dice(_) => LossKind::Dice,
            Self::Mae(_) => LossKind::Mae,
            Self::Mse(_) => LossKind::Mse,
        }
    }

    pub fn forward(&self, logits: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
        match self {
            Self::BinaryCrossEntropy(loss) => loss.forward(logits, target),
            Self::CrossEntropy(loss) => loss.forward(logits, target),
            Self::Dice(loss) => loss.forward(logits, target),
            Self::Mae(loss) => loss.forward(logits, target),
            Self::Mse(loss) => loss.forward(logits, target),
        }
    }
}

/// A loss function and the key it is reported under.
#[derive(Module, Debug)]
pub struct NamedLoss<B: Backend> {
    name: Ignored<String>,
    loss: LossFunction<B>,
}

impl<B: Backend> NamedLoss<B> {
    pub fn new(name: impl Into<String>, loss: LossFunction<B>) -> Self {
        Self {
            name: Ignored(name.into()),
            loss,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn loss(&self) -> &LossFunction<B> {
        &self.loss
    }
}

/// Total loss and its per-name breakdown.
#[derive(Debug, Clone)]
pub struct LossReport<B: Backend> {
    /// Unweighted sum of every entry.
    pub total: Tensor<B, 1>,
    pub losses: HashMap<String, Tensor<B, 1>>,
}

/// Ordered set of uniquely named losses.
#[derive(Module, Debug)]
pub struct LossCollection<B: Backend> {
    losses: Vec<NamedLoss<B>>,
}

impl<B: Backend> LossCollection<B> {
    /// # Errors
    ///
    /// Returns `OpenSegError::InvalidConfiguration` if two losses share a name.
    pub fn new(losses: Vec<NamedLoss<B>>) -> OpenSegResult<Self> {
        let mut names = HashSet::new();
        for loss in &losses {
            if !names.insert(loss.name()) {
                return Err(OpenSegError::InvalidConfiguration {
                    reason: format!("duplicate loss name: {}", loss.name()),
                });
            }
        }

        Ok(Self { losses })
    }

    /// Builds one loss per spec, in order.
    ///
    /// # Errors
    ///
    /// Returns `OpenSegError::InvalidConfiguration` if two specs share a name.
    pub fn from_specs(specs: &[LossSpec], device: &B::Device) -> OpenSegResult<Self> {
        Self::new(
            specs
                .iter()
                .map(|spec| NamedLoss::new(spec.name.clone(), LossFunction::new(&spec.kind, device)))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.losses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.losses.is_empty()
    }

    /// Names in evaluation order.
    pub fn names(&self) -> Vec<&str> {
        self.losses.iter().map(NamedLoss::name).collect()
    }

    /// Evaluates every loss on the same logits and target.
    pub fn forward(&self, logits: Tensor<B, 4>, target: Tensor<B, 4>) -> LossReport<B> {
        let mut total = Tensor::zeros([1], &logits.device());
        let mut losses = HashMap::with_capacity(self.losses.len());

        for named in &self.losses {
            let value = named.loss.forward(logits.clone(), target.clone());
            total = total + value.clone();
            losses.insert(named.name().to_string(), value);
        }

        LossReport { total, losses }
    }
}
