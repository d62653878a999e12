//! Conversions between image files and model tensors.

use std::path::Path;

use anyhow::{Context, Result};
use burn::tensor::{activation::sigmoid, backend::Backend, DType, Tensor, TensorData};
use image::{imageops::FilterType, DynamicImage, GenericImageView, GrayImage};

/// ImageNet channel statistics the ResNet backbones were trained with.
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Loads an image as a normalized `[1, 3, height, width]` tensor.
///
/// With `size`, the image is resized to `size x size` first.
pub fn load_image<B: Backend, P: AsRef<Path>>(
    path: P,
    size: Option<u32>,
    device: &B::Device,
) -> Result<Tensor<B, 4>> {
    let img = image::open(&path)
        .with_context(|| format!("Failed to open image at {}", path.as_ref().display()))?;

    let img = match size {
        Some(size) => img.resize_exact(size, size, FilterType::Triangle),
        None => img,
    };

    Ok(image_to_tensor(img, device))
}

/// Converts an image to a normalized `[1, 3, height, width]` tensor.
pub fn image_to_tensor<B: Backend>(img: DynamicImage, device: &B::Device) -> Tensor<B, 4> {
    let (width, height) = img.dimensions();
    let buf = img.into_rgb32f().into_raw();

    let data = TensorData::new(buf, [height as usize, width as usize, 3]).convert::<B::FloatElem>();
    let tensor: Tensor<B, 4> = Tensor::<B, 3>::from_data(data, device)
        .permute([2, 0, 1])
        .unsqueeze();

    let mean = Tensor::<B, 1>::from_floats(MEAN, device).reshape([1, 3, 1, 1]);
    let std = Tensor::<B, 1>::from_floats(STD, device).reshape([1, 3, 1, 1]);

    (tensor - mean) / std
}

/// Turns `[1, num_classes, height, width]` logits into a grayscale mask.
///
/// A single channel is rendered as foreground probability. Several channels are
/// rendered as the winning class index spread over `0..=255`.
pub fn logits_to_mask<B: Backend>(logits: Tensor<B, 4>) -> Result<GrayImage> {
    let [batch, channels, height, width] = logits.dims();

    if batch != 1 {
        anyhow::bail!("Expected batch size of 1, got {}", batch);
    }

    let levels = if channels == 1 {
        sigmoid(logits)
    } else {
        let step = 1.0 / (channels - 1) as f32;
        logits.argmax(1).float().mul_scalar(step)
    };

    let data = levels
        .into_data()
        .convert_dtype(DType::F32)
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to convert mask to f32: {:#?}", e))?;

    let pixels = data
        .into_iter()
        .map(|level| (level.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();

    GrayImage::from_raw(width as u32, height as u32, pixels)
        .context("Failed to create grayscale mask buffer")
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::NdArray,
        tensor::{Tolerance, TensorData},
    };
    use image::{Rgb, RgbImage};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_image_is_normalized_per_channel() {
        let device = Default::default();
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 1, Rgb([255, 255, 255])));

        let tensor = image_to_tensor::<TestBackend>(img, &device);

        assert_eq!(tensor.dims(), [1, 3, 1, 2]);
        let expected: Vec<f32> = (0..3)
            .flat_map(|c| {
                let value = (1.0 - MEAN[c]) / STD[c];
                [value, value]
            })
            .collect();
        tensor.into_data().assert_approx_eq::<f32>(
            &TensorData::new(expected, [1, 3, 1, 2]),
            Tolerance::absolute(1e-4),
        );
    }

    #[test]
    fn test_single_channel_logits_become_probabilities() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 4>::zeros([1, 1, 2, 3], &device);

        let mask = logits_to_mask(logits).unwrap();

        assert_eq!(mask.dimensions(), (3, 2));
        assert!(mask.pixels().all(|pixel| pixel.0[0] == 128));
    }

    #[test]
    fn test_multi_class_logits_become_class_levels() {
        let device = Default::default();
        // Pixel 0 votes for class 2, pixel 1 for class 0.
        let logits = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![0.0f32, 5.0, 1.0, 0.0, 9.0, -1.0], [1, 3, 1, 2]),
            &device,
        );

        let mask = logits_to_mask(logits).unwrap();

        assert_eq!(mask.get_pixel(0, 0).0[0], 255);
        assert_eq!(mask.get_pixel(1, 0).0[0], 0);
    }

    #[test]
    fn test_batched_logits_are_rejected() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 4>::zeros([2, 1, 2, 2], &device);

        assert!(logits_to_mask(logits).is_err());
    }
}
