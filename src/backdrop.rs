//! Replacement backdrops: a procedural layered skyline or an adapted photo

use crate::config::BackdropConfig;
use crate::filters::{kernel_radius, vertical_gradient};
use crate::raster::{RasterBuffer, Resample};
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// One silhouette layer of the skyline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Opacity of the building fill
    pub alpha: u8,
    /// Upper bound of the random height scale
    pub height_scale: f64,
    /// Gaussian blur applied to the finished layer
    pub blur_radius: f32,
}

/// Far, middle and near layers, drawn back to front
pub const SKYLINE_LAYERS: [LayerSpec; 3] = [
    LayerSpec {
        alpha: 40,
        height_scale: 0.55,
        blur_radius: 2.0,
    },
    LayerSpec {
        alpha: 60,
        height_scale: 0.75,
        blur_radius: 1.0,
    },
    LayerSpec {
        alpha: 80,
        height_scale: 1.0,
        blur_radius: 0.0,
    },
];

/// Where the backdrop of a run came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackdropKind {
    Procedural,
    Supplied,
}

/// Builds the backdrop canvas for a run
#[derive(Debug, Clone)]
pub struct BackdropSynthesizer {
    config: BackdropConfig,
}

impl BackdropSynthesizer {
    #[must_use]
    pub fn new(config: BackdropConfig) -> Self {
        Self { config }
    }

    /// Draw a skyline of `width` x `height`
    ///
    /// The same seed always produces the same bytes. Without a seed the layout
    /// is drawn from fresh entropy.
    #[must_use]
    pub fn synthesize(&self, width: u32, height: u32, seed: Option<u64>) -> RasterBuffer {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.synthesize_with(width, height, &mut rng)
    }

    /// Draw a skyline using a caller-owned random source
    pub fn synthesize_with<R: Rng>(&self, width: u32, height: u32, rng: &mut R) -> RasterBuffer {
        let cfg = &self.config;
        let mut backdrop = vertical_gradient(width, height, cfg.sky_top, cfg.sky_bottom);
        if width == 0 || height == 0 {
            return backdrop;
        }

        let ground_y = (f64::from(height) * cfg.ground_line) as i64;
        let max_height = (f64::from(height) * cfg.max_building_height) as i64;

        for (index, layer) in cfg.layers.iter().enumerate() {
            let mut canvas = RasterBuffer::new(width, height);
            let drawn = self.draw_layer(&mut canvas, layer, ground_y, max_height, rng);
            debug!(
                "Skyline layer {} drew {} buildings (alpha {}, blur {})",
                index, drawn.buildings, layer.alpha, layer.blur_radius
            );
            let Some((top, bottom)) = drawn.rows else {
                continue;
            };

            // Blur only the band that holds buildings, padded by the kernel radius
            let pad = i64::from(kernel_radius(layer.blur_radius));
            let band_top = (top - pad).max(0);
            let band_bottom = (bottom + pad).min(i64::from(height) - 1);
            if band_top > band_bottom {
                continue;
            }
            let band_rows = (band_bottom - band_top + 1) as u32;
            let (band, offset) = match canvas.crop(0, band_top as u32, width, band_rows) {
                Ok(band) => (band, band_top),
                Err(_) => (canvas, 0),
            };
            let band = band.gaussian_blur(layer.blur_radius);
            backdrop.composite_over(&band, 0, offset);
        }

        backdrop.gaussian_blur(cfg.final_blur)
    }

    fn draw_layer<R: Rng>(
        &self,
        canvas: &mut RasterBuffer,
        layer: &LayerSpec,
        ground_y: i64,
        max_height: i64,
        rng: &mut R,
    ) -> LayerExtent {
        let cfg = &self.config;
        let width = f64::from(canvas.width());
        let width_range = pixel_range(width, cfg.building_width, 1);
        let gap_range = pixel_range(width, cfg.building_gap, 0);
        let mut extent = LayerExtent::default();

        let mut x: i64 = 0;
        while x < i64::from(canvas.width()) {
            let building_width = rng.gen_range(width_range.0..=width_range.1);
            let scale = uniform(rng, cfg.min_height_scale, layer.height_scale);
            let building_height = (scale * max_height as f64) as i64;
            let shade = rng.gen_range(cfg.shade.0..=cfg.shade.1);

            let left = x;
            let right = (x + building_width).min(i64::from(canvas.width()));
            let top = (ground_y - building_height).max(0);
            canvas.fill_rect(left, top, right, ground_y, [shade, shade, shade, layer.alpha]);
            extent.include(top, ground_y);

            if rng.gen_bool(cfg.roof_probability) {
                let roof_height = i64::from(rng.gen_range(cfg.roof_height.0..=cfg.roof_height.1));
                let inset = i64::from(cfg.roof_inset);
                let (roof_left, roof_right) = (left + inset, right - inset);
                if roof_left <= roof_right {
                    let roof_alpha = (f64::from(layer.alpha) * cfg.roof_alpha_factor) as u8;
                    canvas.fill_rect(
                        roof_left,
                        top - roof_height,
                        roof_right,
                        top,
                        [shade, shade, shade, roof_alpha],
                    );
                    extent.include((top - roof_height).max(0), top);
                }
            }

            extent.buildings += 1;
            x += building_width + rng.gen_range(gap_range.0..=gap_range.1);
        }

        extent
    }

    /// Fit a supplied background to the canvas and soften it
    #[must_use]
    pub fn adapt(&self, background: &RasterBuffer, width: u32, height: u32) -> RasterBuffer {
        background
            .resize_exact(width, height, Resample::Lanczos)
            .gaussian_blur(self.config.supplied_blur)
    }
}

impl Default for BackdropSynthesizer {
    fn default() -> Self {
        Self::new(BackdropConfig::default())
    }
}

#[derive(Debug, Default)]
struct LayerExtent {
    buildings: usize,
    rows: Option<(i64, i64)>,
}

impl LayerExtent {
    fn include(&mut self, top: i64, bottom: i64) {
        self.rows = Some(match self.rows {
            Some((t, b)) => (t.min(top), b.max(bottom)),
            None => (top, bottom),
        });
    }
}

/// Inclusive pixel range from width fractions, floored, with a lower bound
fn pixel_range(width: f64, (min, max): (f64, f64), floor: i64) -> (i64, i64) {
    let lo = ((width * min) as i64).max(floor);
    let hi = ((width * max) as i64).max(lo);
    (lo, hi)
}

fn uniform<R: Rng>(rng: &mut R, a: f64, b: f64) -> f64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if lo < hi {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}
