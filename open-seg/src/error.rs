use backbones::BackboneError;
use thiserror::Error;

/// The error type for `OpenSeg-Burn` operations.
///
/// Every variant is raised while a model is being configured or assembled. Failures inside a
/// forward pass are tensor shape errors reported by Burn itself.
#[derive(Error, Debug)]
pub enum OpenSegError {
    /// Error for when a registry lookup finds no factory under the requested name.
    #[error("Unknown {kind}: {name}")]
    UnknownComponent {
        /// The registry section that was searched (backbone, decoder, segmenter).
        kind: &'static str,
        /// The requested name.
        name: String,
    },

    /// Error for when a factory is registered twice under the same name.
    #[error("{kind} already registered: {name}")]
    DuplicateComponent {
        /// The registry section.
        kind: &'static str,
        /// The conflicting name.
        name: String,
    },

    /// Error for when a decoder block type name is not recognized.
    #[error("Unsupported decoder block type: {block_type}")]
    UnknownBlockType {
        /// The name of the unsupported block type.
        block_type: String,
    },

    /// Error for when a loss function name is not recognized.
    #[error("Unsupported loss function: {loss}")]
    UnknownLoss {
        /// The name of the unsupported loss.
        loss: String,
    },

    /// Error for when an invalid model configuration is provided.
    /// This can happen if configuration parameters are logically inconsistent.
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// Error for when loading model weights fails.
    #[error("Failed to load weights: {reason}")]
    WeightLoadingFailed {
        /// The reason for the weight loading failure.
        reason: String,
    },

    /// Error raised by the backbone crate.
    #[error(transparent)]
    Backbone(#[from] BackboneError),
}

/// A specialized `Result` type for `OpenSeg-Burn` operations.
pub type OpenSegResult<T> = Result<T, OpenSegError>;
