//! Color harmonization of the subject toward the backdrop

use crate::config::HarmonizeConfig;
use crate::raster::{RasterBuffer, Resample};

/// Tints a cutout slightly toward the backdrop's dominant color
#[derive(Debug, Clone, Default)]
pub struct ColorHarmonizer {
    config: HarmonizeConfig,
}

impl ColorHarmonizer {
    #[must_use]
    pub fn new(config: HarmonizeConfig) -> Self {
        Self { config }
    }

    /// Flat average color of a small bilinear thumbnail of `backdrop`
    #[must_use]
    pub fn dominant_color(&self, backdrop: &RasterBuffer) -> [f64; 3] {
        let side = self.config.thumbnail_size;
        backdrop
            .resize_exact(side, side, Resample::Bilinear)
            .mean_rgb()
    }

    /// Tint color derived from the backdrop average
    #[must_use]
    pub fn tint(&self, dominant: [f64; 3]) -> [u8; 3] {
        dominant.map(|avg| {
            (128.0 + (avg - 128.0) * self.config.tint_strength)
                .floor()
                .clamp(0.0, 255.0) as u8
        })
    }

    /// Blend the subject's RGB toward the backdrop tint; alpha is untouched
    #[must_use]
    pub fn harmonize(&self, subject: RasterBuffer, backdrop: &RasterBuffer) -> RasterBuffer {
        let dominant = self.dominant_color(backdrop);
        let tint = self.tint(dominant);
        log::debug!(
            "Backdrop average ({:.1}, {:.1}, {:.1}) gives tint {:?}",
            dominant[0],
            dominant[1],
            dominant[2],
            tint
        );
        subject.blend_toward(tint, self.config.blend)
    }
}
