//! Pure raster filters: buffer in, buffer out
//!
//! Gaussian blur uses a fixed-point Q16 kernel so results are bit-exact across
//! platforms, which keeps seeded backdrops byte-identical between runs.

use crate::error::{CompositeError, Result};
use crate::raster::{AlphaMask, RasterBuffer};

const Q16_ONE: u32 = 1 << 16;

/// Blur every channel of an RGBA buffer
///
/// `sigma <= 0` returns the input unchanged.
#[must_use]
pub fn gaussian_blur(buffer: RasterBuffer, sigma: f32) -> RasterBuffer {
    let Some(kernel) = gaussian_kernel_q16(sigma) else {
        return buffer;
    };
    let (width, height) = buffer.dimensions();
    let blurred = blur_interleaved(buffer.as_raw(), width, height, 4, &kernel);
    RasterBuffer::from_raw(width, height, blurred).unwrap_or(buffer)
}

/// Blur a single-channel mask
///
/// `sigma <= 0` returns the input unchanged.
#[must_use]
pub fn gaussian_blur_mask(mask: AlphaMask, sigma: f32) -> AlphaMask {
    let Some(kernel) = gaussian_kernel_q16(sigma) else {
        return mask;
    };
    let (width, height) = mask.dimensions();
    let blurred = blur_interleaved(mask.as_raw(), width, height, 1, &kernel);
    AlphaMask::from_raw(width, height, blurred).unwrap_or(mask)
}

/// Kernel radius used for a given sigma
#[must_use]
pub fn kernel_radius(sigma: f32) -> u32 {
    if !sigma.is_finite() || sigma <= 0.0 {
        return 0;
    }
    (sigma * 3.0).ceil().max(1.0) as u32
}

/// Normalized Gaussian weights in Q16, summing to exactly `1 << 16`
fn gaussian_kernel_q16(sigma: f32) -> Option<Vec<u32>> {
    let radius = kernel_radius(sigma);
    if radius == 0 {
        return None;
    }

    let r = radius as i32;
    let sigma = f64::from(sigma);
    let denom = 2.0 * sigma * sigma;
    let weights_f: Vec<f64> = (-r..=r)
        .map(|i| {
            let x = f64::from(i);
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = weights_f.iter().sum();

    let mut weights: Vec<u32> = weights_f
        .iter()
        .map(|w| ((w / sum) * f64::from(Q16_ONE)).round() as u32)
        .collect();

    // Push rounding drift into the center tap
    let acc: i64 = weights.iter().map(|&w| i64::from(w)).sum();
    let delta = i64::from(Q16_ONE) - acc;
    if let Some(center) = weights.get_mut(radius as usize) {
        *center = (i64::from(*center) + delta).clamp(0, i64::from(Q16_ONE)) as u32;
    }
    Some(weights)
}

fn blur_interleaved(src: &[u8], width: u32, height: u32, channels: usize, kernel: &[u32]) -> Vec<u8> {
    let mut tmp = vec![0u8; src.len()];
    let mut out = vec![0u8; src.len()];
    horizontal_pass(src, &mut tmp, width as usize, height as usize, channels, kernel);
    vertical_pass(&tmp, &mut out, width as usize, height as usize, channels, kernel);
    out
}

#[allow(clippy::indexing_slicing)]
fn horizontal_pass(
    src: &[u8],
    dst: &mut [u8],
    width: usize,
    height: usize,
    channels: usize,
    kernel: &[u32],
) {
    if width == 0 {
        return;
    }
    let radius = (kernel.len() / 2) as isize;
    let last = width as isize - 1;
    let mut acc = [0u64; 4];
    for y in 0..height {
        let row = y * width * channels;
        for x in 0..width {
            acc.iter_mut().for_each(|a| *a = 0);
            for (ki, &kw) in kernel.iter().enumerate() {
                let sx = (x as isize + ki as isize - radius).clamp(0, last) as usize;
                let idx = row + sx * channels;
                for c in 0..channels {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out_idx = row + x * channels;
            for c in 0..channels {
                dst[out_idx + c] = q16_to_u8(acc[c]);
            }
        }
    }
}

#[allow(clippy::indexing_slicing)]
fn vertical_pass(
    src: &[u8],
    dst: &mut [u8],
    width: usize,
    height: usize,
    channels: usize,
    kernel: &[u32],
) {
    if height == 0 {
        return;
    }
    let radius = (kernel.len() / 2) as isize;
    let last = height as isize - 1;
    let stride = width * channels;
    let mut acc = [0u64; 4];
    for y in 0..height {
        for x in 0..width {
            acc.iter_mut().for_each(|a| *a = 0);
            for (ki, &kw) in kernel.iter().enumerate() {
                let sy = (y as isize + ki as isize - radius).clamp(0, last) as usize;
                let idx = sy * stride + x * channels;
                for c in 0..channels {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out_idx = y * stride + x * channels;
            for c in 0..channels {
                dst[out_idx + c] = q16_to_u8(acc[c]);
            }
        }
    }
}

fn q16_to_u8(acc: u64) -> u8 {
    let v = (acc + u64::from(Q16_ONE / 2)) >> 16;
    v.min(255) as u8
}

/// Square minimum filter (morphological erosion)
///
/// `kernel_size` must be odd. Edges are clamped, so a border pixel only sees
/// the samples that exist.
#[allow(clippy::indexing_slicing)]
pub fn min_filter(mask: &AlphaMask, kernel_size: u32) -> Result<AlphaMask> {
    if kernel_size == 0 || kernel_size % 2 == 0 {
        return Err(CompositeError::config_value_error(
            "min filter size",
            kernel_size,
            "odd values >= 1",
        ));
    }
    if kernel_size == 1 {
        return Ok(mask.clone());
    }

    let (width, height) = mask.dimensions();
    let (w, h) = (width as usize, height as usize);
    let radius = (kernel_size / 2) as usize;
    let src = mask.as_raw();

    let mut rows = vec![0u8; src.len()];
    for y in 0..h {
        let line = &src[y * w..(y + 1) * w];
        for x in 0..w {
            let lo = x.saturating_sub(radius);
            let hi = (x + radius).min(w - 1);
            rows[y * w + x] = line[lo..=hi].iter().copied().min().unwrap_or(0);
        }
    }

    let mut out = vec![0u8; src.len()];
    for y in 0..h {
        let lo = y.saturating_sub(radius);
        let hi = (y + radius).min(h - 1);
        for x in 0..w {
            out[y * w + x] = (lo..=hi).map(|sy| rows[sy * w + x]).min().unwrap_or(0);
        }
    }

    AlphaMask::from_raw(width, height, out)
}

/// Vertical 0-255 ramp, black at the top row and white at the bottom row
#[must_use]
pub fn linear_gradient(width: u32, height: u32) -> AlphaMask {
    let denom = height.saturating_sub(1).max(1) as f32;
    let mut data = Vec::with_capacity((width as usize).checked_mul(height as usize).unwrap_or(0));
    for y in 0..height {
        let value = (255.0 * y as f32 / denom).round().clamp(0.0, 255.0) as u8;
        data.extend(std::iter::repeat(value).take(width as usize));
    }
    AlphaMask::from_raw(width, height, data).unwrap_or_else(|_| AlphaMask::new(width, height))
}

/// Opaque vertical gradient from `top` to `bottom`
#[must_use]
pub fn vertical_gradient(width: u32, height: u32, top: [u8; 3], bottom: [u8; 3]) -> RasterBuffer {
    let ramp = linear_gradient(1, height);
    let capacity = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))
        .unwrap_or(0);
    let mut pixels = Vec::with_capacity(capacity);
    for &t in ramp.as_raw() {
        let t = f32::from(t) / 255.0;
        let row = [
            lerp(top[0], bottom[0], t),
            lerp(top[1], bottom[1], t),
            lerp(top[2], bottom[2], t),
            255,
        ];
        for _ in 0..width {
            pixels.extend_from_slice(&row);
        }
    }
    RasterBuffer::from_raw(width, height, pixels)
        .unwrap_or_else(|_| RasterBuffer::filled(width, height, [top[0], top[1], top[2], 255]))
}

fn lerp(a: u8, b: u8, t: f32) -> u8 {
    crate::raster::clamp_u8(f32::from(a) + (f32::from(b) - f32::from(a)) * t)
}
