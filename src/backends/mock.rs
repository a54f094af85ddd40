//! Deterministic color-key segmentation
//!
//! Estimates the background color from the image border and keys it out. Good
//! enough for product shots on a plain sweep, and needs no model or external
//! program, which makes it the backend of choice for tests.

use super::{SegmentationBackend, SegmentationOutput};
use crate::error::Result;
use image::RgbaImage;

/// Color-key backend
#[derive(Debug, Clone)]
pub struct MockBackend {
    /// Distance at or below which a pixel is fully background
    low_threshold: f32,
    /// Distance at or above which a pixel is fully foreground
    high_threshold: f32,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            low_threshold: 24.0,
            high_threshold: 64.0,
        }
    }

    /// Use custom RGB distance thresholds for the alpha ramp
    #[must_use]
    pub fn with_thresholds(low: f32, high: f32) -> Self {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        Self {
            low_threshold: low,
            high_threshold: high,
        }
    }

    /// Mean color of the outermost pixel ring
    #[must_use]
    pub fn border_color(image: &RgbaImage) -> [f32; 3] {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return [0.0; 3];
        }

        let mut sums = [0f64; 3];
        let mut count = 0u64;
        let mut add = |x: u32, y: u32| {
            let pixel = image.get_pixel(x, y);
            for (sum, channel) in sums.iter_mut().zip(pixel.0) {
                *sum += f64::from(channel);
            }
            count += 1;
        };

        for x in 0..width {
            add(x, 0);
            if height > 1 {
                add(x, height - 1);
            }
        }
        for y in 1..height.saturating_sub(1) {
            add(0, y);
            if width > 1 {
                add(width - 1, y);
            }
        }

        sums.map(|sum| (sum / count as f64) as f32)
    }

    fn key_alpha(&self, distance: f32) -> u8 {
        if distance <= self.low_threshold {
            0
        } else if distance >= self.high_threshold {
            255
        } else {
            let t = (distance - self.low_threshold) / (self.high_threshold - self.low_threshold);
            (t * 255.0).round().clamp(0.0, 255.0) as u8
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentationBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn ensure_available(&mut self) -> Result<()> {
        Ok(())
    }

    fn segment(&mut self, image: &RgbaImage) -> Result<SegmentationOutput> {
        let key = Self::border_color(image);
        log::debug!(
            "Mock segmentation keying out background ({:.0}, {:.0}, {:.0})",
            key[0],
            key[1],
            key[2]
        );

        let mut pixels = Vec::with_capacity(image.as_raw().len());
        for pixel in image.pixels() {
            let [r, g, b, a] = pixel.0;
            let distance = ((f32::from(r) - key[0]).powi(2)
                + (f32::from(g) - key[1]).powi(2)
                + (f32::from(b) - key[2]).powi(2))
            .sqrt();
            pixels.extend_from_slice(&[r, g, b, a.min(self.key_alpha(distance))]);
        }

        Ok(SegmentationOutput::Raw {
            width: image.width(),
            height: image.height(),
            pixels,
        })
    }
}
