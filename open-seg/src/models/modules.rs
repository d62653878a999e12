mod decoder_blocks;
mod segmentation_head;

pub use decoder_blocks::*;
pub use segmentation_head::*;
