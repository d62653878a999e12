//! Enumeration types for model configuration.

//!
//! Both enums are written to configuration files by their lowercase names (`"basic"`, `"bce"`)
//! and read back through `FromStr`, so an unknown name is reported with the matching
//! `OpenSegError` message.

use core::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::OpenSegError;

/// Defines the block used at every decoder stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecoderBlockType {
    /// 1x1 convolution, batch norm and ReLU. Optionally upsamples first.
    Simple,
    /// Upsample, skip concatenation, then two 3x3 convolutions.
    Basic,
    /// Upsample, skip concatenation, then a residual 1x1-3x3-3x3 stack.
    Bottleneck,
}

impl DecoderBlockType {
    /// The configuration name of this block type.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Basic => "basic",
            Self::Bottleneck => "bottleneck",
        }
    }

    /// Whether blocks of this type fuse a skip tensor into their input.
    pub const fn uses_skip(&self) -> bool {
        !matches!(self, Self::Simple)
    }
}

impl FromStr for DecoderBlockType {
    type Err = OpenSegError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "simple" => Ok(Self::Simple),
            "basic" => Ok(Self::Basic),
            "bottleneck" => Ok(Self::Bottleneck),
            _ => Err(OpenSegError::UnknownBlockType {
                block_type: name.to_string(),
            }),
        }
    }
}

/// Defines the loss functions that can be attached to a segmenter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LossKind {
    /// Binary cross-entropy on logits, one independent label per channel.
    BinaryCrossEntropy,
    /// Multi-class cross-entropy over the channel axis.
    CrossEntropy,
    /// Soft Dice loss on probabilities.
    Dice,
    /// Mean absolute error on probabilities.
    Mae,
    /// Mean squared error on probabilities.
    Mse,
}

impl LossKind {
    /// The configuration name of this loss.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BinaryCrossEntropy => "bce",
            Self::CrossEntropy => "cross_entropy",
            Self::Dice => "dice",
            Self::Mae => "mae",
            Self::Mse => "mse",
        }
    }
}

impl FromStr for LossKind {
    type Err = OpenSegError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "bce" => Ok(Self::BinaryCrossEntropy),
            "cross_entropy" => Ok(Self::CrossEntropy),
            "dice" => Ok(Self::Dice),
            "mae" => Ok(Self::Mae),
            "mse" => Ok(Self::Mse),
            _ => Err(OpenSegError::UnknownLoss {
                loss: name.to_string(),
            }),
        }
    }
}

macro_rules! named_serde {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.name())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let name = String::deserialize(deserializer)?;
                name.parse().map_err(de::Error::custom)
            }
        }
    };
}

named_serde!(DecoderBlockType);
named_serde!(LossKind);
