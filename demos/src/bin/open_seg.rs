//! OpenSeg command line tool.
//!
//! ## Usage
//!
//! ```bash
//! # Write the default configuration to a file
//! cargo run --bin open-seg -- config --output model.json
//!
//! # Build the configured model and run a synthetic forward pass
//! cargo run --bin open-seg -- summary --config model.json --image-size 256
//!
//! # Segment an image with trained weights
//! cargo run --bin open-seg -- infer --config model.json --weights model.mpk \
//!     --input image.jpg --output mask.png
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::Distribution,
};
use clap::{Parser, Subcommand};
use image::imageops::FilterType;
use open_seg_burn::{backbones::Backbone, Decoder, ModelConfig, ModelRegistry, Segmenter};
use open_seg_demos::{
    create_device, get_backend_name, load_image, logits_to_mask, SelectedBackend, SelectedDevice,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "open-seg")]
#[command(author, version, about = "Encoder-decoder semantic segmentation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print or write the default model configuration
    Config {
        /// Write the configuration to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build a model and run a forward pass on a random image
    Summary {
        /// Model configuration file (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Side length of the synthetic input image
        #[arg(long, default_value = "256")]
        image_size: usize,
    },

    /// Segment an image and save the predicted mask
    Infer {
        /// Model configuration file (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Trained weights saved with the named MessagePack recorder
        #[arg(short, long)]
        weights: Option<PathBuf>,

        /// Input image path
        #[arg(short, long)]
        input: PathBuf,

        /// Output mask path
        #[arg(short, long, default_value = "mask.png")]
        output: PathBuf,

        /// Side length the image is resized to before the forward pass
        #[arg(long, default_value = "512")]
        image_size: u32,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { output } => write_default_config(output.as_deref()),
        Commands::Summary { config, image_size } => {
            let device = create_device();
            info!(backend = get_backend_name(), "Selected backend");
            summarize(&load_config(config.as_deref())?, image_size, &device)
        }
        Commands::Infer {
            config,
            weights,
            input,
            output,
            image_size,
        } => {
            let device = create_device();
            info!(backend = get_backend_name(), "Selected backend");
            infer(
                &load_config(config.as_deref())?,
                weights.as_deref(),
                &input,
                &output,
                image_size,
                &device,
            )
        }
    }
}

fn write_default_config(output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(&ModelConfig::new())
        .context("Failed to serialize the default configuration")?;

    match output {
        Some(path) => {
            fs::write(path, json)
                .with_context(|| format!("Failed to write config file: {}", path.display()))?;
            info!(path = %path.display(), "Wrote default configuration");
        }
        None => println!("{json}"),
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ModelConfig> {
    let Some(path) = path else {
        return Ok(ModelConfig::new());
    };

    let config_str = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&config_str)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn build_model(config: &ModelConfig, device: &SelectedDevice) -> Result<Segmenter<SelectedBackend>> {
    let registry = ModelRegistry::<SelectedBackend>::with_defaults();
    let start = Instant::now();

    let model = registry
        .build_segmenter(config, device)
        .context("Failed to build the segmenter")?;

    info!(
        backbone = %config.backbone.name,
        decoder = %config.decoder.name,
        params = model.num_params(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Built segmenter"
    );

    Ok(model)
}

fn summarize(config: &ModelConfig, image_size: usize, device: &SelectedDevice) -> Result<()> {
    let model = build_model(config, device)?;

    println!("Backbone:        {}", config.backbone.name);
    println!("Encoder channels {:?}", model.backbone().out_channels());
    println!("Decoder:         {}", config.decoder.name);
    println!("Decoder output   {} channels", model.decoder().out_channels());
    println!("Classes:         {}", model.num_classes());
    println!("Losses:          {}", model.losses().names().join(", "));
    println!("Parameters:      {}", model.num_params());

    let image = Tensor::<SelectedBackend, 4>::random(
        [1, 3, image_size, image_size],
        Distribution::Normal(0.0, 1.0),
        device,
    );

    let start = Instant::now();
    let logits = model.forward(image);
    println!(
        "Forward pass:    {:?} in {:.2?}",
        logits.dims(),
        start.elapsed()
    );

    Ok(())
}

fn infer(
    config: &ModelConfig,
    weights: Option<&Path>,
    input: &Path,
    output: &Path,
    image_size: u32,
    device: &SelectedDevice,
) -> Result<()> {
    let mut model = build_model(config, device)?;

    if let Some(weights) = weights {
        let record = NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .load(weights.to_path_buf(), device)
            .with_context(|| format!("Failed to load weights: {}", weights.display()))?;
        model = model.load_record(record);
        info!(path = %weights.display(), "Loaded weights");
    }

    let (width, height) = image::image_dimensions(input)
        .with_context(|| format!("Failed to read image header: {}", input.display()))?;
    let image = load_image::<SelectedBackend, _>(input, Some(image_size), device)?;

    let start = Instant::now();
    let logits = model.forward(image);
    info!(elapsed_ms = start.elapsed().as_millis() as u64, "Forward pass");

    let mask = logits_to_mask(logits)?;
    image::imageops::resize(&mask, width, height, FilterType::Triangle)
        .save(output)
        .with_context(|| format!("Failed to save mask: {}", output.display()))?;

    info!(path = %output.display(), "Saved mask");
    Ok(())
}
