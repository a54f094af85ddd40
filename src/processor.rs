//! Unified compositing processor
//!
//! `CompositeProcessor` owns every pipeline stage and runs them in order:
//! extraction, backdrop, harmonization, shadow and placement. Both the CLI and
//! the library convenience functions drive this type, so they behave alike.

use crate::{
    backdrop::{BackdropKind, BackdropSynthesizer},
    backends::{BackendFactory, BackendType, DefaultBackendFactory},
    compositor::{resolve_canvas_size, Compositor},
    config::{CompositeConfig, CompositeOptions, OutputSize},
    error::{CompositeError, Result},
    extractor::SubjectExtractor,
    harmonizer::ColorHarmonizer,
    raster::RasterBuffer,
    services::{ImageIOService, ProcessingStage, ProgressReporter, ProgressTracker},
    shadow::ShadowCaster,
    types::{CompositeMetadata, CompositeResult, CompositeTimings},
};
use log::{debug, info};
use std::path::Path;
use std::time::Instant;
use tracing::{debug as trace_debug, info as trace_info, instrument, span, Level};

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Product-photo compositing processor
pub struct CompositeProcessor {
    config: CompositeConfig,
    backend_factory: Box<dyn BackendFactory>,
    extractor: Option<SubjectExtractor>,
    synthesizer: BackdropSynthesizer,
    harmonizer: ColorHarmonizer,
    compositor: Compositor,
    progress_tracker: Option<ProgressTracker>,
}

impl std::fmt::Debug for CompositeProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeProcessor")
            .field("backend", &self.config.segmentation.backend)
            .field("initialized", &self.extractor.is_some())
            .finish_non_exhaustive()
    }
}

impl CompositeProcessor {
    /// Create a processor using the backends compiled into this crate
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: CompositeConfig) -> Result<Self> {
        Self::with_factory(config, Box::new(DefaultBackendFactory))
    }

    /// Create a processor with a custom backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_factory(
        config: CompositeConfig,
        backend_factory: Box<dyn BackendFactory>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            synthesizer: BackdropSynthesizer::new(config.backdrop.clone()),
            harmonizer: ColorHarmonizer::new(config.harmonize.clone()),
            compositor: Compositor::new(
                config.placement.clone(),
                ShadowCaster::new(config.shadow.clone()),
            ),
            config,
            backend_factory,
            extractor: None,
            progress_tracker: None,
        })
    }

    /// Route stage updates to `reporter`
    pub fn set_progress_reporter(&mut self, reporter: Box<dyn ProgressReporter>) {
        self.progress_tracker = Some(ProgressTracker::new(reporter));
    }

    /// Create the segmentation backend and check that it can run
    ///
    /// Called lazily by the processing methods; calling it up front surfaces
    /// `SegmentationUnavailable` before any image is touched.
    ///
    /// # Errors
    /// - `SegmentationUnavailable` naming the missing model or program
    pub fn initialize(&mut self) -> Result<()> {
        if self.extractor.is_some() {
            return Ok(());
        }

        info!(
            "Initializing {} segmentation backend",
            self.config.segmentation.backend
        );
        let backend = self
            .backend_factory
            .create_backend(&self.config.segmentation)?;
        let mut extractor = SubjectExtractor::new(backend, self.config.refine.clone());
        extractor.ensure_available()?;
        self.extractor = Some(extractor);
        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> &CompositeConfig {
        &self.config
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.extractor.is_some()
    }

    #[must_use]
    pub fn available_backends(&self) -> Vec<BackendType> {
        self.backend_factory.available_backends()
    }

    /// Composite `input_path` and write the result to `output_path`
    ///
    /// The output file is written only after every stage succeeded; its
    /// directory is created immediately before the write.
    ///
    /// # Errors
    /// - `InputNotFound` for a missing input or background file
    /// - Segmentation, decoding and encoding failures
    pub fn process_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        input_path: P,
        output_path: Q,
        options: &CompositeOptions,
    ) -> Result<CompositeResult> {
        let result = self.composite_file(input_path, options)?;

        self.report_stage(ProcessingStage::FileSaving);
        if let Err(e) = result.save(output_path.as_ref()) {
            self.report_error(&e);
            return Err(e);
        }
        info!("Wrote {}", output_path.as_ref().display());

        self.report_stage(ProcessingStage::Completed);
        if let Some(ref tracker) = self.progress_tracker {
            tracker.report_completion(&result.metadata.timings);
        }
        Ok(result)
    }

    /// Composite `input_path` without writing anything
    ///
    /// # Errors
    /// - `InputNotFound` for a missing input or background file
    /// - Segmentation and decoding failures
    pub fn composite_file<P: AsRef<Path>>(
        &mut self,
        input_path: P,
        options: &CompositeOptions,
    ) -> Result<CompositeResult> {
        let input_path = input_path.as_ref();
        if let Some(ref mut tracker) = self.progress_tracker {
            tracker.restart();
        }

        // Cheap checks first so a bad path never waits on model loading
        if !input_path.exists() {
            return Err(CompositeError::input_not_found(input_path));
        }
        if let Some(background) = options.background.as_deref() {
            if !background.exists() {
                return Err(CompositeError::input_not_found(background));
            }
        }

        self.report_stage(ProcessingStage::Initialization);
        if let Err(e) = self.initialize() {
            self.report_error(&e);
            return Err(e);
        }

        self.report_stage(ProcessingStage::ImageLoading);
        let decode_start = Instant::now();
        let loaded = ImageIOService::load_raster(input_path).and_then(|input| {
            let background = options
                .background
                .as_deref()
                .map(ImageIOService::load_raster)
                .transpose()?;
            Ok((input, background))
        });
        let (input, background) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                self.report_error(&e);
                return Err(e);
            },
        };
        let decode_ms = elapsed_ms(decode_start);

        let mut result = self.composite(input, background, options.size, options.seed)?;
        result.metadata.timings.image_decode_ms = decode_ms;
        result.metadata.timings.total_ms += decode_ms;
        Ok(result)
    }

    /// Composite an encoded image held in memory
    ///
    /// # Errors
    /// - Decoding failures
    /// - Segmentation failures
    pub fn composite_bytes(
        &mut self,
        image_bytes: &[u8],
        size: Option<OutputSize>,
        seed: Option<u64>,
    ) -> Result<CompositeResult> {
        let decode_start = Instant::now();
        let input = RasterBuffer::from(image::load_from_memory(image_bytes)?);
        let decode_ms = elapsed_ms(decode_start);

        let mut result = self.composite(input, None, size, seed)?;
        result.metadata.timings.image_decode_ms = decode_ms;
        result.metadata.timings.total_ms += decode_ms;
        Ok(result)
    }

    /// Run every stage on decoded buffers
    ///
    /// With no `background` a skyline is synthesized. When `seed` is absent a
    /// fresh one is drawn and recorded in the metadata so the run can be
    /// reproduced.
    ///
    /// # Errors
    /// - `Processing` when the canvas would exceed `MAX_CANVAS_PIXELS`
    /// - Segmentation failures
    #[instrument(
        skip(self, input, background),
        fields(
            backend = %self.config.segmentation.backend,
            dimensions = %format!("{}x{}", input.width(), input.height())
        )
    )]
    pub fn composite(
        &mut self,
        input: RasterBuffer,
        background: Option<RasterBuffer>,
        size: Option<OutputSize>,
        seed: Option<u64>,
    ) -> Result<CompositeResult> {
        let (canvas_width, canvas_height) =
            match resolve_canvas_size(input.dimensions(), size, self.config.canvas.max_side) {
                Ok(canvas) => canvas,
                Err(e) => {
                    self.report_error(&e);
                    return Err(e);
                },
            };
        if let Err(e) = self.initialize() {
            self.report_error(&e);
            return Err(e);
        }

        let total_start = Instant::now();
        let mut timings = CompositeTimings::default();
        let (input_width, input_height) = input.dimensions();

        trace_info!(
            canvas_width,
            canvas_height,
            background = background.is_some(),
            "Starting composite"
        );

        self.report_stage(ProcessingStage::Segmentation);
        let subject = {
            let _span = span!(Level::INFO, "segmentation", width = input_width, height = input_height)
                .entered();
            let stage_start = Instant::now();
            let Some(extractor) = self.extractor.as_mut() else {
                return Err(CompositeError::processing("segmentation backend not initialized"));
            };
            let subject = extractor.extract(&input);
            timings.segmentation_ms = elapsed_ms(stage_start);
            match subject {
                Ok(subject) => subject,
                Err(e) => {
                    self.report_error(&e);
                    return Err(e);
                },
            }
        };
        drop(input);

        self.report_stage(ProcessingStage::BackdropSynthesis);
        let (backdrop, kind, seed) = {
            let _span = span!(Level::DEBUG, "backdrop", canvas_width, canvas_height).entered();
            let stage_start = Instant::now();
            let built = match background {
                Some(supplied) => (
                    self.synthesizer.adapt(&supplied, canvas_width, canvas_height),
                    BackdropKind::Supplied,
                    None,
                ),
                None => {
                    let seed = seed.unwrap_or_else(rand::random);
                    trace_debug!(seed, "Synthesizing skyline");
                    (
                        self.synthesizer
                            .synthesize(canvas_width, canvas_height, Some(seed)),
                        BackdropKind::Procedural,
                        Some(seed),
                    )
                },
            };
            timings.backdrop_ms = elapsed_ms(stage_start);
            built
        };

        self.report_stage(ProcessingStage::Harmonization);
        let subject = {
            let _span = span!(Level::DEBUG, "harmonize").entered();
            let stage_start = Instant::now();
            let subject = self.harmonizer.harmonize(subject, &backdrop);
            timings.harmonize_ms = elapsed_ms(stage_start);
            subject
        };

        self.report_stage(ProcessingStage::Compositing);
        let (image, placement) = {
            let _span = span!(Level::DEBUG, "compose").entered();
            let stage_start = Instant::now();
            let composed = self.compositor.compose(backdrop, subject);
            timings.composite_ms = elapsed_ms(stage_start);
            composed
        };
        debug!(
            "Placed {}x{} subject at ({}, {}) on {}x{} canvas",
            placement.subject_width,
            placement.subject_height,
            placement.x,
            placement.y,
            canvas_width,
            canvas_height
        );

        timings.total_ms = elapsed_ms(total_start);
        let backend = self
            .extractor
            .as_ref()
            .map_or_else(String::new, |e| e.backend_name().to_string());

        Ok(CompositeResult {
            image,
            metadata: CompositeMetadata {
                input_width,
                input_height,
                canvas_width,
                canvas_height,
                backdrop: kind,
                seed,
                backend,
                placement,
                timings,
                created_at: chrono::Utc::now(),
            },
        })
    }

    fn report_stage(&mut self, stage: ProcessingStage) {
        if let Some(ref mut tracker) = self.progress_tracker {
            tracker.report_stage(stage);
        }
    }

    fn report_error(&self, error: &CompositeError) {
        if let Some(ref tracker) = self.progress_tracker {
            tracker.report_error(&error.to_string());
        }
    }
}
