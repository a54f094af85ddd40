//! Raster buffers shared by every pipeline stage
//!
//! [`RasterBuffer`] owns an RGBA8 image and [`AlphaMask`] owns a single 8-bit
//! channel. All pixel arithmetic happens in 8-bit sRGB space and clamps back
//! into `[0, 255]` explicitly. Stages receive and return these buffers by value.

use crate::error::{CompositeError, Result};
use crate::filters;
use image::{imageops, imageops::FilterType, DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Resampling filter used when scaling a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resample {
    /// Bilinear interpolation
    Bilinear,
    /// Lanczos3 windowed sinc, the high quality default
    #[default]
    Lanczos,
}

impl Resample {
    fn filter_type(self) -> FilterType {
        match self {
            Self::Bilinear => FilterType::Triangle,
            Self::Lanczos => FilterType::Lanczos3,
        }
    }
}

/// Scale factor that fits `(width, height)` inside `(max_width, max_height)`
///
/// Values of `1.0` or more mean the source already fits.
#[must_use]
pub fn fit_scale(width: u32, height: u32, max_width: u32, max_height: u32) -> f64 {
    if width == 0 || height == 0 {
        return 1.0;
    }
    (f64::from(max_width) / f64::from(width)).min(f64::from(max_height) / f64::from(height))
}

/// Dimensions after applying the `resize_within` policy
#[must_use]
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let scale = fit_scale(width, height, max_width, max_height);
    if scale >= 1.0 {
        return (width, height);
    }
    // Integer math keeps the limiting side exact
    let (w, h) = (u64::from(width), u64::from(height));
    let (max_w, max_h) = (u64::from(max_width), u64::from(max_height));
    if max_w * h <= max_h * w {
        (max_width.max(1), (h * max_w / w).max(1) as u32)
    } else {
        ((w * max_h / h).max(1) as u32, max_height.max(1))
    }
}

/// An owned RGBA8 pixel grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterBuffer {
    image: RgbaImage,
}

impl RasterBuffer {
    /// Create a fully transparent buffer
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    /// Create a buffer where every pixel has the same color
    #[must_use]
    pub fn filled(width: u32, height: u32, color: [u8; 4]) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, Rgba(color)),
        }
    }

    /// Wrap an existing RGBA image
    #[must_use]
    pub fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Build a buffer from raw interleaved RGBA samples
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let len = pixels.len();
        RgbaImage::from_raw(width, height, pixels)
            .map(Self::from_image)
            .ok_or_else(|| {
                CompositeError::processing(format!(
                    "RGBA buffer of {} bytes does not match {}x{}",
                    len, width, height
                ))
            })
    }

    /// Convert any decoded image to RGBA
    #[must_use]
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        Self {
            image: image.to_rgba8(),
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Pixel at `(x, y)`
    ///
    /// # Panics
    /// Panics when the coordinate lies outside the buffer.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.image.get_pixel(x, y).0
    }

    /// Raw interleaved RGBA samples
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    #[must_use]
    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    #[must_use]
    pub fn into_dynamic(self) -> DynamicImage {
        DynamicImage::ImageRgba8(self.image)
    }

    /// Resample to exactly `width` x `height`
    #[must_use]
    pub fn resize_exact(&self, width: u32, height: u32, resample: Resample) -> Self {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        Self {
            image: imageops::resize(&self.image, width, height, resample.filter_type()),
        }
    }

    /// Downscale to fit within the bounds, preserving aspect ratio
    ///
    /// Returns the buffer untouched when it already fits. Enlargement never
    /// happens here.
    #[must_use]
    pub fn resize_within(self, max_width: u32, max_height: u32) -> Self {
        let (width, height) = self.dimensions();
        let target = fit_within(width, height, max_width, max_height);
        if target == (width, height) {
            return self;
        }
        self.resize_exact(target.0, target.1, Resample::Lanczos)
    }

    /// Copy out a rectangular region
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Self> {
        let fits_x = x.checked_add(width).is_some_and(|right| right <= self.width());
        let fits_y = y.checked_add(height).is_some_and(|bottom| bottom <= self.height());
        if !fits_x || !fits_y {
            return Err(CompositeError::processing(format!(
                "Crop {}x{}+{}+{} exceeds {}x{} buffer",
                width,
                height,
                x,
                y,
                self.width(),
                self.height()
            )));
        }
        Ok(Self {
            image: imageops::crop_imm(&self.image, x, y, width, height).to_image(),
        })
    }

    /// Extract the alpha channel
    #[must_use]
    pub fn alpha(&self) -> AlphaMask {
        let data = self.image.pixels().map(|p| p[3]).collect();
        AlphaMask::from_raw(self.width(), self.height(), data)
            .unwrap_or_else(|_| AlphaMask::new(self.width(), self.height()))
    }

    /// Replace the alpha channel with `mask`
    pub fn with_alpha(mut self, mask: &AlphaMask) -> Result<Self> {
        if mask.dimensions() != self.dimensions() {
            return Err(CompositeError::processing(format!(
                "Alpha mask {}x{} does not match {}x{} buffer",
                mask.width(),
                mask.height(),
                self.width(),
                self.height()
            )));
        }
        for (pixel, alpha) in self.image.pixels_mut().zip(mask.as_raw()) {
            pixel[3] = *alpha;
        }
        Ok(self)
    }

    /// Linearly interpolate the RGB channels toward `color` by `t`
    ///
    /// Alpha is left untouched.
    #[must_use]
    pub fn blend_toward(mut self, color: [u8; 3], t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        for pixel in self.image.pixels_mut() {
            for (channel, target) in pixel.0.iter_mut().zip(color) {
                let value = f32::from(*channel) + (f32::from(target) - f32::from(*channel)) * t;
                *channel = clamp_u8(value);
            }
        }
        self
    }

    /// Separable Gaussian blur of all four channels
    #[must_use]
    pub fn gaussian_blur(self, sigma: f32) -> Self {
        filters::gaussian_blur(self, sigma)
    }

    /// Mean of the RGB channels over every pixel
    #[must_use]
    pub fn mean_rgb(&self) -> [f64; 3] {
        let total = u64::from(self.width()) * u64::from(self.height());
        if total == 0 {
            return [0.0; 3];
        }
        let mut sums = [0u64; 3];
        for pixel in self.image.pixels() {
            for (sum, channel) in sums.iter_mut().zip(pixel.0) {
                *sum += u64::from(channel);
            }
        }
        sums.map(|sum| sum as f64 / total as f64)
    }

    /// Blend a solid color over the inclusive rectangle `[left, right] x [top, bottom]`
    ///
    /// Coordinates outside the buffer are clipped.
    pub fn fill_rect(&mut self, left: i64, top: i64, right: i64, bottom: i64, color: [u8; 4]) {
        let x0 = left.max(0);
        let y0 = top.max(0);
        let x1 = right.min(i64::from(self.width()) - 1);
        let y1 = bottom.min(i64::from(self.height()) - 1);
        if x0 > x1 || y0 > y1 || color[3] == 0 {
            return;
        }
        for y in y0..=y1 {
            for x in x0..=x1 {
                let target = self.image.get_pixel_mut(x as u32, y as u32);
                target.0 = over(target.0, color);
            }
        }
    }

    /// Alpha-composite `src` over this buffer with its top-left at `(x, y)`
    ///
    /// Offsets may be negative or extend past the edges; only the overlapping
    /// region is touched.
    pub fn composite_over(&mut self, src: &RasterBuffer, x: i64, y: i64) {
        let (dst_w, dst_h) = (i64::from(self.width()), i64::from(self.height()));
        let (src_w, src_h) = (i64::from(src.width()), i64::from(src.height()));

        let start_x = x.max(0);
        let start_y = y.max(0);
        let end_x = (x + src_w).min(dst_w);
        let end_y = (y + src_h).min(dst_h);
        if start_x >= end_x || start_y >= end_y {
            return;
        }

        for dy in start_y..end_y {
            for dx in start_x..end_x {
                let source = src.image.get_pixel((dx - x) as u32, (dy - y) as u32).0;
                if source[3] == 0 {
                    continue;
                }
                let target = self.image.get_pixel_mut(dx as u32, dy as u32);
                target.0 = over(target.0, source);
            }
        }
    }
}

impl From<RgbaImage> for RasterBuffer {
    fn from(image: RgbaImage) -> Self {
        Self::from_image(image)
    }
}

impl From<DynamicImage> for RasterBuffer {
    fn from(image: DynamicImage) -> Self {
        Self {
            image: image.into_rgba8(),
        }
    }
}

/// Non-premultiplied Porter-Duff "over"
fn over(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    if src[3] == 255 {
        return src;
    }
    let sa = f32::from(src[3]) / 255.0;
    let da = f32::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return [0, 0, 0, 0];
    }

    let mut out = [0u8; 4];
    for i in 0..3 {
        let value =
            (f32::from(src[i]) * sa + f32::from(dst[i]) * da * (1.0 - sa)) / out_a;
        out[i] = clamp_u8(value);
    }
    out[3] = clamp_u8(out_a * 255.0);
    out
}

pub(crate) fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// A single 8-bit channel, usually a buffer's alpha
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphaMask {
    mask: GrayImage,
}

impl AlphaMask {
    /// Create an all-zero mask
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            mask: GrayImage::new(width, height),
        }
    }

    /// Create a mask with every sample set to `value`
    #[must_use]
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            mask: GrayImage::from_pixel(width, height, Luma([value])),
        }
    }

    /// Build a mask from row-major samples
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let len = data.len();
        GrayImage::from_raw(width, height, data)
            .map(|mask| Self { mask })
            .ok_or_else(|| {
                CompositeError::processing(format!(
                    "Mask of {} bytes does not match {}x{}",
                    len, width, height
                ))
            })
    }

    #[must_use]
    pub fn from_image(mask: GrayImage) -> Self {
        Self { mask }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    /// Sample at `(x, y)`
    ///
    /// # Panics
    /// Panics when the coordinate lies outside the mask.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.mask.get_pixel(x, y)[0]
    }

    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        self.mask.as_raw()
    }

    #[must_use]
    pub fn into_image(self) -> GrayImage {
        self.mask
    }

    /// Multiply every sample by `factor`, truncating toward zero
    #[must_use]
    pub fn scale(mut self, factor: f32) -> Self {
        for sample in self.mask.iter_mut() {
            *sample = (f32::from(*sample) * factor).clamp(0.0, 255.0) as u8;
        }
        self
    }

    /// Resample to exactly `width` x `height`
    #[must_use]
    pub fn resize_exact(&self, width: u32, height: u32, resample: Resample) -> Self {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        Self {
            mask: imageops::resize(&self.mask, width, height, resample.filter_type()),
        }
    }

    /// Separable Gaussian blur
    #[must_use]
    pub fn gaussian_blur(self, sigma: f32) -> Self {
        filters::gaussian_blur_mask(self, sigma)
    }

    /// Morphological erosion with a square kernel
    pub fn min_filter(&self, kernel_size: u32) -> Result<Self> {
        filters::min_filter(self, kernel_size)
    }

    /// Pixel-wise minimum with another mask of the same size
    pub fn pointwise_min(mut self, other: &AlphaMask) -> Result<Self> {
        if self.dimensions() != other.dimensions() {
            return Err(CompositeError::processing(
                "Masks must share dimensions for a pointwise minimum",
            ));
        }
        for (sample, bound) in self.mask.iter_mut().zip(other.as_raw()) {
            *sample = (*sample).min(*bound);
        }
        Ok(self)
    }

    /// Number of samples above zero
    #[must_use]
    pub fn count_nonzero(&self) -> usize {
        self.mask.iter().filter(|&&v| v > 0).count()
    }

    /// Largest sample value
    #[must_use]
    pub fn max_value(&self) -> u8 {
        self.mask.iter().copied().max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_within_is_identity_when_fitting() {
        let buffer = RasterBuffer::filled(100, 50, [10, 20, 30, 255]);
        let resized = buffer.clone().resize_within(100, 50);
        assert_eq!(resized, buffer);

        let resized = buffer.clone().resize_within(400, 400);
        assert_eq!(resized.dimensions(), (100, 50));
    }

    #[test]
    fn test_resize_within_never_grows() {
        for &(w, h, max_w, max_h) in &[
            (1000, 1000, 760, 700),
            (4000, 3000, 1520, 1400),
            (3, 900, 10, 10),
            (1, 1, 0, 0),
            (640, 480, 641, 100),
        ] {
            let (nw, nh) = fit_within(w, h, max_w, max_h);
            assert!(nw <= w && nh <= h, "{w}x{h} grew to {nw}x{nh}");
            assert!(nw >= 1 && nh >= 1);
        }
        assert_eq!(fit_within(1000, 1000, 760, 700), (700, 700));
    }

    #[test]
    fn test_alpha_roundtrip() {
        let buffer = RasterBuffer::filled(4, 3, [1, 2, 3, 200]);
        let mask = AlphaMask::filled(4, 3, 17);
        let buffer = buffer.with_alpha(&mask).unwrap();
        assert_eq!(buffer.alpha(), mask);
        assert_eq!(buffer.pixel(2, 1), [1, 2, 3, 17]);
    }

    #[test]
    fn test_with_alpha_rejects_mismatched_mask() {
        let buffer = RasterBuffer::new(4, 4);
        assert!(buffer.with_alpha(&AlphaMask::new(3, 4)).is_err());
    }

    #[test]
    fn test_crop_bounds() {
        let buffer = RasterBuffer::filled(10, 10, [0, 0, 0, 255]);
        assert_eq!(buffer.crop(2, 3, 5, 7).unwrap().dimensions(), (5, 7));
        assert!(buffer.crop(6, 0, 5, 1).is_err());
    }

    #[test]
    fn test_blend_toward_keeps_alpha() {
        let buffer = RasterBuffer::filled(2, 2, [200, 100, 0, 42]);
        let blended = buffer.blend_toward([100, 100, 100], 0.5);
        assert_eq!(blended.pixel(0, 0), [150, 100, 50, 42]);
    }

    #[test]
    fn test_composite_over_opaque_source_wins() {
        let mut canvas = RasterBuffer::filled(4, 4, [255, 255, 255, 255]);
        let src = RasterBuffer::filled(2, 2, [10, 20, 30, 255]);
        canvas.composite_over(&src, 1, 1);
        assert_eq!(canvas.pixel(1, 1), [10, 20, 30, 255]);
        assert_eq!(canvas.pixel(0, 0), [255, 255, 255, 255]);
        assert_eq!(canvas.pixel(3, 3), [255, 255, 255, 255]);
    }

    #[test]
    fn test_composite_over_clips_negative_offsets() {
        let mut canvas = RasterBuffer::filled(3, 3, [0, 0, 0, 255]);
        let src = RasterBuffer::filled(2, 2, [255, 255, 255, 255]);
        canvas.composite_over(&src, -1, -1);
        assert_eq!(canvas.pixel(0, 0), [255, 255, 255, 255]);
        assert_eq!(canvas.pixel(1, 1), [0, 0, 0, 255]);
        canvas.composite_over(&src, 5, 5);
    }

    #[test]
    fn test_composite_over_partial_alpha() {
        let mut canvas = RasterBuffer::filled(1, 1, [200, 200, 200, 255]);
        let shadow = RasterBuffer::filled(1, 1, [0, 0, 0, 90]);
        canvas.composite_over(&shadow, 0, 0);
        let [r, g, b, a] = canvas.pixel(0, 0);
        assert_eq!(a, 255);
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert!(r < 200 && r > 100);
    }

    #[test]
    fn test_fill_rect_is_inclusive_and_clipped() {
        let mut layer = RasterBuffer::new(5, 5);
        layer.fill_rect(1, -3, 3, 2, [40, 40, 40, 80]);
        assert_eq!(layer.pixel(1, 0), [40, 40, 40, 80]);
        assert_eq!(layer.pixel(3, 2), [40, 40, 40, 80]);
        assert_eq!(layer.pixel(4, 2)[3], 0);
        assert_eq!(layer.pixel(2, 3)[3], 0);

        layer.fill_rect(10, 0, 20, 4, [255, 0, 0, 255]);
        layer.fill_rect(3, 0, 2, 4, [255, 0, 0, 255]);
        assert_eq!(layer.alpha().count_nonzero(), 9);
    }

    #[test]
    fn test_mean_rgb() {
        let mut buffer = RasterBuffer::filled(2, 1, [0, 0, 0, 255]);
        buffer.composite_over(&RasterBuffer::filled(1, 1, [100, 50, 10, 255]), 1, 0);
        assert_eq!(buffer.mean_rgb(), [50.0, 25.0, 5.0]);
    }

    #[test]
    fn test_mask_scale_truncates() {
        let mask = AlphaMask::filled(2, 2, 255).scale(0.6);
        assert_eq!(mask.get(0, 0), 153);
        let mask = AlphaMask::filled(1, 1, 1).scale(0.6);
        assert_eq!(mask.get(0, 0), 0);
    }

    #[test]
    fn test_pointwise_min() {
        let a = AlphaMask::from_raw(2, 1, vec![10, 200]).unwrap();
        let b = AlphaMask::from_raw(2, 1, vec![50, 100]).unwrap();
        assert_eq!(a.pointwise_min(&b).unwrap().as_raw(), &[10, 100]);
    }
}
