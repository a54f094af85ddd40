//! Soft contact shadow projected from the subject's alpha

use crate::config::ShadowConfig;
use crate::raster::{AlphaMask, RasterBuffer, Resample};

/// A shadow layer and where its top-left corner goes on the canvas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactShadow {
    pub layer: RasterBuffer,
    pub x: i64,
    pub y: i64,
}

/// Casts a flattened, blurred copy of the subject silhouette onto the ground
#[derive(Debug, Clone, Default)]
pub struct ShadowCaster {
    config: ShadowConfig,
}

impl ShadowCaster {
    #[must_use]
    pub fn new(config: ShadowConfig) -> Self {
        Self { config }
    }

    /// Build the shadow for a subject placed with its top-left at `(x, y)`
    #[must_use]
    pub fn cast(&self, subject_alpha: &AlphaMask, x: i64, y: i64) -> ContactShadow {
        let (width, height) = subject_alpha.dimensions();
        let squashed_height = ((f64::from(height) * self.config.squash) as u32).max(1);

        let mask = subject_alpha
            .clone()
            .scale(self.config.strength)
            .resize_exact(width.max(1), squashed_height, Resample::Lanczos)
            .gaussian_blur(self.config.blur);

        let opacity = u32::from(self.config.opacity);
        let mut pixels = Vec::with_capacity(mask.as_raw().len() * 4);
        for &m in mask.as_raw() {
            let alpha = (opacity * u32::from(m) + 127) / 255;
            pixels.extend_from_slice(&[0, 0, 0, alpha as u8]);
        }
        let layer = RasterBuffer::from_raw(mask.width(), mask.height(), pixels)
            .unwrap_or_else(|_| RasterBuffer::new(mask.width(), mask.height()));

        let drop = (f64::from(height) * self.config.drop) as i64;
        ContactShadow {
            layer,
            x,
            y: y + drop,
        }
    }

    /// Cast the shadow and composite it onto `canvas`
    pub fn apply(&self, canvas: &mut RasterBuffer, subject_alpha: &AlphaMask, x: i64, y: i64) {
        let shadow = self.cast(subject_alpha, x, y);
        canvas.composite_over(&shadow.layer, shadow.x, shadow.y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadow_geometry() {
        let caster = ShadowCaster::default();
        let alpha = AlphaMask::filled(100, 80, 255);
        let shadow = caster.cast(&alpha, 10, 20);
        assert_eq!(shadow.layer.dimensions(), (100, 20));
        assert_eq!(shadow.x, 10);
        assert_eq!(shadow.y, 20 + 52);
    }

    #[test]
    fn test_shadow_is_black_and_capped() {
        let caster = ShadowCaster::default();
        let shadow = caster.cast(&AlphaMask::filled(60, 60, 255), 0, 0);
        let max_alpha = shadow.layer.alpha().max_value();
        assert!(max_alpha > 0);
        assert!(max_alpha <= 90);
        assert!(shadow
            .layer
            .as_raw()
            .chunks_exact(4)
            .all(|p| p[0] == 0 && p[1] == 0 && p[2] == 0));
    }

    #[test]
    fn test_tiny_subject_keeps_one_row() {
        let caster = ShadowCaster::default();
        let shadow = caster.cast(&AlphaMask::filled(5, 2, 255), 0, 0);
        assert_eq!(shadow.layer.dimensions(), (5, 1));
    }

    #[test]
    fn test_transparent_subject_casts_nothing() {
        let caster = ShadowCaster::default();
        let mut canvas = RasterBuffer::filled(50, 50, [200, 200, 200, 255]);
        let before = canvas.clone();
        caster.apply(&mut canvas, &AlphaMask::new(20, 20), 5, 5);
        assert_eq!(canvas, before);
    }

    #[test]
    fn test_apply_darkens_below_subject() {
        let caster = ShadowCaster::default();
        let mut canvas = RasterBuffer::filled(120, 120, [200, 200, 200, 255]);
        caster.apply(&mut canvas, &AlphaMask::filled(60, 60, 255), 30, 20);
        // Shadow band starts at 20 + 39 and is 15 rows tall
        let shaded = canvas.pixel(60, 66);
        assert!(shaded[0] < 200, "{shaded:?}");
        assert_eq!(canvas.pixel(60, 5), [200, 200, 200, 255]);
    }
}
