//! Canvas sizing, subject placement and final compositing

use crate::config::{OutputSize, PlacementConfig, MAX_CANVAS_PIXELS};
use crate::error::{CompositeError, Result};
use crate::raster::{fit_within, RasterBuffer};
use crate::shadow::ShadowCaster;
use serde::Serialize;

/// Resolve the canvas size for a run
///
/// An explicit size always wins. Otherwise the input's native size is used,
/// scaled down proportionally when its longer side exceeds `max_side`.
///
/// # Errors
/// `Processing` when the resolved canvas exceeds [`MAX_CANVAS_PIXELS`]. Sizes
/// built through [`OutputSize::new`] are already bounded; this also catches
/// sizes deserialized or constructed field by field.
pub fn resolve_canvas_size(
    input: (u32, u32),
    explicit: Option<OutputSize>,
    max_side: u32,
) -> Result<(u32, u32)> {
    let (width, height) = match explicit {
        Some(size) => size.as_tuple(),
        None => native_canvas_size(input, max_side),
    };
    let pixels = u64::from(width) * u64::from(height);
    if pixels > MAX_CANVAS_PIXELS {
        return Err(CompositeError::processing(format!(
            "Canvas {width}x{height} has {pixels} pixels, above the limit of {MAX_CANVAS_PIXELS}"
        )));
    }
    Ok((width, height))
}

fn native_canvas_size((width, height): (u32, u32), max_side: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_side {
        return (width, height);
    }
    let scaled = |side: u32| ((u64::from(side) * u64::from(max_side) / u64::from(longest)) as u32).max(1);
    (scaled(width), scaled(height))
}

/// Where and how large the subject lands on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlacementSpec {
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Fractions of the canvas the subject may occupy
    pub width_fraction: f64,
    pub height_fraction: f64,
    /// Largest box the subject may fill
    pub max_subject_width: u32,
    pub max_subject_height: u32,
    /// Subject size after fitting
    pub subject_width: u32,
    pub subject_height: u32,
    /// Top-left corner of the subject; may be negative on degenerate canvases
    pub x: i64,
    pub y: i64,
}

impl PlacementSpec {
    /// Compute the placement of a subject of `subject` size on `canvas`
    #[must_use]
    pub fn compute(canvas: (u32, u32), subject: (u32, u32), config: &PlacementConfig) -> Self {
        let (canvas_width, canvas_height) = canvas;
        let max_subject_width = (f64::from(canvas_width) * config.width_fraction) as u32;
        let max_subject_height = (f64::from(canvas_height) * config.height_fraction) as u32;
        let (subject_width, subject_height) =
            fit_within(subject.0, subject.1, max_subject_width, max_subject_height);

        let x = (i64::from(canvas_width) - i64::from(subject_width)).div_euclid(2);
        let center_y = (f64::from(canvas_height) * config.vertical_center) as i64;
        let y = center_y - i64::from(subject_height) / 2;

        Self {
            canvas_width,
            canvas_height,
            width_fraction: config.width_fraction,
            height_fraction: config.height_fraction,
            max_subject_width,
            max_subject_height,
            subject_width,
            subject_height,
            x,
            y,
        }
    }
}

/// Places the subject with its contact shadow onto the backdrop
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    placement: PlacementConfig,
    shadow: ShadowCaster,
}

impl Compositor {
    #[must_use]
    pub fn new(placement: PlacementConfig, shadow: ShadowCaster) -> Self {
        Self { placement, shadow }
    }

    /// Compose backdrop, shadow and subject, in that order
    ///
    /// The subject is shrunk to fit the placement box but never enlarged.
    #[must_use]
    pub fn compose(&self, backdrop: RasterBuffer, subject: RasterBuffer) -> (RasterBuffer, PlacementSpec) {
        let placement = PlacementSpec::compute(backdrop.dimensions(), subject.dimensions(), &self.placement);
        let subject = subject.resize_within(placement.max_subject_width, placement.max_subject_height);

        let mut canvas = backdrop;
        self.shadow
            .apply(&mut canvas, &subject.alpha(), placement.x, placement.y);
        canvas.composite_over(&subject, placement.x, placement.y);
        (canvas, placement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canvas_size_native() {
        assert_eq!(resolve_canvas_size((1000, 1000), None, 2200).unwrap(), (1000, 1000));
        assert_eq!(resolve_canvas_size((4400, 2200), None, 2200).unwrap(), (2200, 1100));
        assert_eq!(resolve_canvas_size((3000, 4000), None, 2200).unwrap(), (1650, 2200));
        assert_eq!(resolve_canvas_size((10000, 1), None, 2200).unwrap(), (2200, 1));
    }

    #[test]
    fn test_canvas_size_explicit() {
        let size = OutputSize::parse("2000x2000").unwrap();
        assert_eq!(resolve_canvas_size((4000, 3000), Some(size), 2200).unwrap(), (2000, 2000));
    }

    #[test]
    fn test_oversized_canvas_rejected() {
        let size = OutputSize {
            width: u32::MAX,
            height: u32::MAX,
        };
        assert!(matches!(
            resolve_canvas_size((10, 10), Some(size), 2200),
            Err(CompositeError::Processing(_))
        ));

        let size = OutputSize {
            width: 16384,
            height: 16384,
        };
        assert_eq!(resolve_canvas_size((10, 10), Some(size), 2200).unwrap(), (16384, 16384));
    }

    #[test]
    fn test_placement_reference_case() {
        let spec = PlacementSpec::compute((1000, 1000), (1000, 1000), &PlacementConfig::default());
        assert_eq!((spec.width_fraction, spec.height_fraction), (0.76, 0.70));
        assert_eq!((spec.max_subject_width, spec.max_subject_height), (760, 700));
        assert_eq!((spec.subject_width, spec.subject_height), (700, 700));
        assert_eq!((spec.x, spec.y), (150, 150));
    }

    #[test]
    fn test_placement_small_subject_not_enlarged() {
        let spec = PlacementSpec::compute((1000, 800), (101, 51), &PlacementConfig::default());
        assert_eq!((spec.subject_width, spec.subject_height), (101, 51));
        assert_eq!(spec.x, 449);
        assert_eq!(spec.y, 400 - 25);
    }

    #[test]
    fn test_compose_subject_over_shadow() {
        let compositor = Compositor::default();
        let backdrop = RasterBuffer::filled(200, 200, [220, 220, 220, 255]);
        // Opaque body in the top 80 rows, transparent below
        let mut subject = RasterBuffer::new(100, 100);
        subject.composite_over(&RasterBuffer::filled(100, 80, [200, 30, 30, 255]), 0, 0);
        let (canvas, placement) = compositor.compose(backdrop, subject);

        assert_eq!(canvas.dimensions(), (200, 200));
        assert_eq!((placement.x, placement.y), (50, 50));
        // Shadow band spans rows 115..140; the body covers it down to row 129
        for y in [50, 120, 129] {
            assert_eq!(canvas.pixel(100, y), [200, 30, 30, 255]);
        }
        assert!(canvas.pixel(100, 134)[0] < 220);
        assert_eq!(canvas.pixel(2, 2), [220, 220, 220, 255]);
        assert_eq!(canvas.pixel(100, 180), [220, 220, 220, 255]);
    }
}
