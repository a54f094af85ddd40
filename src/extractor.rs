//! Subject extraction: segmentation plus alpha edge refinement

use crate::backends::SegmentationBackend;
use crate::config::RefineConfig;
use crate::error::Result;
use crate::raster::RasterBuffer;
use log::debug;

/// Wraps a segmentation backend and cleans up its alpha edge
#[derive(Debug)]
pub struct SubjectExtractor {
    backend: Box<dyn SegmentationBackend>,
    refine: RefineConfig,
}

impl SubjectExtractor {
    #[must_use]
    pub fn new(backend: Box<dyn SegmentationBackend>, refine: RefineConfig) -> Self {
        Self { backend, refine }
    }

    /// Name of the wrapped backend
    #[must_use]
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Fail early when the backend cannot run
    pub fn ensure_available(&mut self) -> Result<()> {
        self.backend.ensure_available()
    }

    /// Segment `input` and return the refined RGBA cutout
    ///
    /// # Errors
    /// - `SegmentationUnavailable` / `Segmentation` from the backend
    /// - `UnexpectedSegmentationOutput` when the payload cannot be normalized
    pub fn extract(&mut self, input: &RasterBuffer) -> Result<RasterBuffer> {
        self.backend.ensure_available()?;
        let output = self.backend.segment(input.as_image())?;
        let cutout = RasterBuffer::from_image(output.normalize(input.dimensions())?);
        debug!(
            "{} segmentation kept {} of {} pixels",
            self.backend.name(),
            cutout.alpha().count_nonzero(),
            u64::from(cutout.width()) * u64::from(cutout.height())
        );
        self.refine_edges(cutout)
    }

    /// Erode then feather the alpha to suppress halos
    ///
    /// The result never exceeds the incoming alpha at any pixel.
    pub fn refine_edges(&self, cutout: RasterBuffer) -> Result<RasterBuffer> {
        let original = cutout.alpha();
        let refined = original
            .min_filter(self.refine.erode_size)?
            .gaussian_blur(self.refine.feather)
            .pointwise_min(&original)?;
        cutout.with_alpha(&refined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MockBackend, SegmentationOutput};
    use crate::error::CompositeError;
    use image::RgbaImage;

    struct FixedBackend(Option<SegmentationOutput>);

    impl SegmentationBackend for FixedBackend {
        fn name(&self) -> &str {
            "fixed"
        }

        fn ensure_available(&mut self) -> Result<()> {
            Ok(())
        }

        fn segment(&mut self, _image: &RgbaImage) -> Result<SegmentationOutput> {
            self.0
                .take()
                .ok_or_else(|| CompositeError::segmentation_unavailable("fixed backend drained"))
        }
    }

    fn shot() -> RasterBuffer {
        let mut image = RasterBuffer::filled(30, 30, [255, 255, 255, 255]);
        image.composite_over(&RasterBuffer::filled(14, 14, [20, 60, 140, 255]), 8, 8);
        image
    }

    #[test]
    fn test_extract_with_mock_backend() {
        let mut extractor = SubjectExtractor::new(Box::new(MockBackend::new()), RefineConfig::default());
        assert_eq!(extractor.backend_name(), "mock");
        let cutout = extractor.extract(&shot()).unwrap();
        assert_eq!(cutout.dimensions(), (30, 30));
        assert_eq!(cutout.pixel(0, 0)[3], 0);
        assert_eq!(cutout.pixel(15, 15)[3], 255);
        // Erosion pulls the edge in by a pixel
        assert!(cutout.pixel(8, 15)[3] < 255);
    }

    #[test]
    fn test_refinement_never_grows_alpha() {
        let extractor = SubjectExtractor::new(Box::new(MockBackend::new()), RefineConfig::default());
        let mut data = Vec::new();
        for i in 0..(17u32 * 13) {
            let a = ((i * 37) % 256) as u8;
            data.extend_from_slice(&[10, 20, 30, a]);
        }
        let noisy = RasterBuffer::from_raw(17, 13, data).unwrap();
        let before = noisy.alpha();
        let after = extractor.refine_edges(noisy).unwrap().alpha();
        assert!(after
            .as_raw()
            .iter()
            .zip(before.as_raw())
            .all(|(a, b)| a <= b));
    }

    #[test]
    fn test_unexpected_payload_is_reported() {
        let backend = FixedBackend(Some(SegmentationOutput::Encoded(b"garbage".to_vec())));
        let mut extractor = SubjectExtractor::new(Box::new(backend), RefineConfig::default());
        let err = extractor.extract(&shot()).unwrap_err();
        assert!(matches!(err, CompositeError::UnexpectedSegmentationOutput(_)));
    }

    #[test]
    fn test_wrong_size_payload_is_reported() {
        let backend = FixedBackend(Some(SegmentationOutput::Raw {
            width: 2,
            height: 2,
            pixels: vec![0; 16],
        }));
        let mut extractor = SubjectExtractor::new(Box::new(backend), RefineConfig::default());
        assert!(matches!(
            extractor.extract(&shot()),
            Err(CompositeError::UnexpectedSegmentationOutput(_))
        ));
    }
}
