use thiserror::Error;

/// The error type for ResNet construction and weight loading.
#[derive(Error, Debug)]
pub enum ResNetError {
    /// The requested number of stages cannot be built.
    #[error("Invalid stage count: {n_blocks} (expected 1..={max})")]
    InvalidStageCount {
        /// The requested stage count.
        n_blocks: usize,
        /// The largest supported stage count.
        max: usize,
    },

    /// Error for when loading pretrained weights fails.
    #[error("Failed to load weights: {reason}")]
    WeightLoadingFailed {
        /// The reason for the weight loading failure.
        reason: String,
    },
}

/// A specialized `Result` type for ResNet operations.
pub type ResNetResult<T> = Result<T, ResNetError>;
