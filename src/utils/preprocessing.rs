//! Tensor preprocessing and mask postprocessing for square segmentation models
//!
//! Images are letterboxed into a `target_size` square (aspect-preserving resize
//! plus centered padding), converted to a normalized NCHW tensor, and the model's
//! single-channel output is mapped back onto the original pixel grid.

use crate::error::{CompositeError, Result};
use image::{imageops, imageops::FilterType, GrayImage, Luma, Rgb, RgbImage, RgbaImage};
use ndarray::Array4;

/// Per-channel normalization applied after scaling samples to `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Side of the square model input
    pub target_size: u32,
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
    /// Padding color for aspect ratio preservation (RGB)
    pub padding_color: [u8; 3],
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            target_size: 1024,
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [1.0, 1.0, 1.0],
            padding_color: [255, 255, 255],
        }
    }
}

/// Where the original image landed inside the padded square
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Letterbox {
    pub offset_x: u32,
    pub offset_y: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
}

impl Letterbox {
    /// Reproduce the placement used for an image of `(width, height)`
    #[must_use]
    pub fn for_dimensions(width: u32, height: u32, target_size: u32) -> Self {
        let target = target_size as f32;
        let scale = (target / width.max(1) as f32).min(target / height.max(1) as f32);
        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, target_size);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, target_size);
        Self {
            offset_x: (target_size - scaled_width) / 2,
            offset_y: (target_size - scaled_height) / 2,
            scaled_width,
            scaled_height,
        }
    }
}

/// Letterbox `image` and convert it to a normalized `1x3xSxS` tensor
///
/// # Errors
/// - Zero-sized input
/// - Zero target size or degenerate normalization
pub fn preprocess(image: &RgbaImage, config: &PreprocessingConfig) -> Result<(Array4<f32>, Letterbox)> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(CompositeError::processing("Cannot preprocess an empty image"));
    }
    if config.target_size == 0 {
        return Err(CompositeError::config_value_error(
            "model input size",
            config.target_size,
            ">= 1",
        ));
    }
    if config.normalization_std.iter().any(|&s| s == 0.0) {
        return Err(CompositeError::invalid_config(
            "Normalization std must be non-zero",
        ));
    }

    let letterbox = Letterbox::for_dimensions(width, height, config.target_size);
    let rgb = RgbImage::from_fn(width, height, |x, y| {
        let [r, g, b, _] = image.get_pixel(x, y).0;
        Rgb([r, g, b])
    });
    let resized = imageops::resize(
        &rgb,
        letterbox.scaled_width,
        letterbox.scaled_height,
        FilterType::Triangle,
    );

    let mut canvas =
        RgbImage::from_pixel(config.target_size, config.target_size, Rgb(config.padding_color));
    imageops::replace(
        &mut canvas,
        &resized,
        i64::from(letterbox.offset_x),
        i64::from(letterbox.offset_y),
    );

    Ok((canvas_to_tensor(&canvas, config), letterbox))
}

fn canvas_to_tensor(canvas: &RgbImage, config: &PreprocessingConfig) -> Array4<f32> {
    let size = canvas.width() as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    #[allow(clippy::indexing_slicing)]
    // Safe: tensor dimensions pre-allocated to match canvas size
    for (x, y, pixel) in canvas.enumerate_pixels() {
        for channel in 0..3 {
            let value = f32::from(pixel[channel]) / 255.0;
            tensor[[0, channel, y as usize, x as usize]] = (value
                - config.normalization_mean[channel])
                / config.normalization_std[channel];
        }
    }

    tensor
}

/// Turn raw model output into a mask the size of the original image
///
/// `values` holds the first output channel in row-major order for a
/// `mask_size` x `mask_size` grid. Values are min-max normalized, the
/// letterbox padding is cropped away, and the remainder is resized back.
///
/// # Errors
/// Returns `UnexpectedSegmentationOutput` when `values` does not fill the grid.
pub fn mask_from_output(
    values: &[f32],
    mask_size: u32,
    letterbox: Letterbox,
    original: (u32, u32),
) -> Result<GrayImage> {
    let expected = mask_size as usize * mask_size as usize;
    if values.len() < expected || mask_size == 0 {
        return Err(CompositeError::unexpected_output(format!(
            "Model produced {} values, expected at least {}x{}",
            values.len(),
            mask_size,
            mask_size
        )));
    }
    let values = &values[..expected];

    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;

    let mut mask = GrayImage::new(mask_size, mask_size);
    for (sample, &value) in mask.iter_mut().zip(values) {
        let normalized = if range > f32::EPSILON {
            (value - min) / range
        } else {
            value.clamp(0.0, 1.0)
        };
        *sample = (normalized * 255.0).round().clamp(0.0, 255.0) as u8;
    }

    // The letterbox was computed for the model input size; rescale when the output differs
    let ratio = mask_size as f32 / letterbox_extent(letterbox) as f32;
    let crop_x = (letterbox.offset_x as f32 * ratio).round() as u32;
    let crop_y = (letterbox.offset_y as f32 * ratio).round() as u32;
    let crop_w = ((letterbox.scaled_width as f32 * ratio).round() as u32)
        .clamp(1, mask_size - crop_x.min(mask_size - 1));
    let crop_h = ((letterbox.scaled_height as f32 * ratio).round() as u32)
        .clamp(1, mask_size - crop_y.min(mask_size - 1));
    let cropped = imageops::crop_imm(&mask, crop_x.min(mask_size - 1), crop_y.min(mask_size - 1), crop_w, crop_h)
        .to_image();

    let (width, height) = original;
    if cropped.dimensions() == (width, height) {
        return Ok(cropped);
    }
    Ok(imageops::resize(&cropped, width, height, FilterType::Triangle))
}

fn letterbox_extent(letterbox: Letterbox) -> u32 {
    // Padding is symmetric up to one pixel, so the square side is recoverable
    let side_x = letterbox.scaled_width + 2 * letterbox.offset_x;
    let side_y = letterbox.scaled_height + 2 * letterbox.offset_y;
    side_x.max(side_y).max(1)
}

/// Apply a mask as the alpha channel of `image`, keeping color samples
#[must_use]
pub fn apply_mask(image: &RgbaImage, mask: &GrayImage) -> RgbaImage {
    let mut result = image.clone();
    for (pixel, Luma([alpha])) in result.pixels_mut().zip(mask.pixels()) {
        pixel[3] = pixel[3].min(*alpha);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_letterbox_wide_image() {
        let letterbox = Letterbox::for_dimensions(2000, 1000, 1024);
        assert_eq!(letterbox.scaled_width, 1024);
        assert_eq!(letterbox.scaled_height, 512);
        assert_eq!(letterbox.offset_x, 0);
        assert_eq!(letterbox.offset_y, 256);
    }

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let image = RgbaImage::from_pixel(20, 10, Rgba([255, 0, 255, 255]));
        let config = PreprocessingConfig {
            target_size: 16,
            ..PreprocessingConfig::default()
        };
        let (tensor, letterbox) = preprocess(&image, &config).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);
        assert_eq!(letterbox.offset_y, 4);

        // Center pixel comes from the image, top row is white padding
        assert!((tensor[[0, 0, 8, 8]] - 0.5).abs() < 1e-6);
        assert!((tensor[[0, 1, 8, 8]] + 0.5).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 8]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_rejects_empty() {
        let image = RgbaImage::new(0, 5);
        assert!(preprocess(&image, &PreprocessingConfig::default()).is_err());
    }

    #[test]
    fn test_mask_from_output_crops_padding() {
        // 4x4 output, original 4x2 letterboxed into rows 1..3
        let mut values = vec![0.0f32; 16];
        for v in &mut values[4..12] {
            *v = 2.0;
        }
        let letterbox = Letterbox::for_dimensions(4, 2, 4);
        let mask = mask_from_output(&values, 4, letterbox, (4, 2)).unwrap();
        assert_eq!(mask.dimensions(), (4, 2));
        assert!(mask.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_mask_from_output_rejects_short_buffers() {
        let letterbox = Letterbox::for_dimensions(4, 4, 4);
        let err = mask_from_output(&[0.0; 3], 4, letterbox, (4, 4)).unwrap_err();
        assert!(matches!(err, CompositeError::UnexpectedSegmentationOutput(_)));
    }

    #[test]
    fn test_apply_mask_keeps_color() {
        let image = RgbaImage::from_pixel(2, 1, Rgba([9, 8, 7, 255]));
        let mask = GrayImage::from_raw(2, 1, vec![0, 128]).unwrap();
        let applied = apply_mask(&image, &mask);
        assert_eq!(applied.get_pixel(0, 0).0, [9, 8, 7, 0]);
        assert_eq!(applied.get_pixel(1, 0).0, [9, 8, 7, 128]);
    }
}
