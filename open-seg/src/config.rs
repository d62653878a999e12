//! # Model Configuration
//!
//! Declarative description of a segmenter and the losses it reports. Every struct derives
//! Burn's `Config`, so a full model description can be saved to and loaded from JSON.

mod core;
mod enums;

pub use self::core::*;
pub use self::enums::*;
