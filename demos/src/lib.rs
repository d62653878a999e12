//! OpenSeg Demos
//!
//! Command line tooling around the `open-seg-burn` crate.
//!
//! ## Usage
//!
//! ```bash
//! # Print the default model configuration
//! cargo run --bin open-seg -- config
//!
//! # Build a model from a configuration and list its components
//! cargo run --bin open-seg -- summary --config model.json
//!
//! # Segment an image
//! cargo run --bin open-seg -- infer --config model.json --input image.jpg --output mask.png
//! ```

pub mod backend;
pub mod imaging;

pub use backend::{create_device, get_backend_name, SelectedBackend, SelectedDevice};
pub use imaging::{image_to_tensor, load_image, logits_to_mask};
