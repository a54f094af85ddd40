#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Product Composite
//!
//! Turns a product photo shot against any background into a finished
//! composite: the subject is cut out, placed on a procedural skyline (or a
//! supplied background), grounded with a soft contact shadow and tinted toward
//! the scene's ambient color.
//!
//! ## Pipeline
//!
//! 1. **Extraction**: a [`SegmentationBackend`] returns an RGBA cutout whose
//!    alpha edge is eroded and feathered to drop background halos.
//! 2. **Backdrop**: a three-layer skyline over a sky gradient, reproducible
//!    from a seed, or the supplied image resized and softened.
//! 3. **Harmonization**: an 8% blend toward a tint derived from the backdrop's
//!    average color. Alpha is untouched.
//! 4. **Compositing**: subject fitted inside 76% × 70% of the canvas, centered,
//!    with its squashed and blurred silhouette laid down as a shadow first.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use product_composite::{composite_file, CompositeConfig, CompositeOptions, OutputSize};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let options = CompositeOptions::new()
//!     .with_size(OutputSize::parse("2000x2000")?)
//!     .with_seed(42);
//! let result = composite_file("shoe.jpg", "shoe_composite.png", CompositeConfig::default(), options).await?;
//! println!("subject placed at ({}, {})", result.placement().x, result.placement().y);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `tract` (default): pure Rust ONNX segmentation backend
//! - `cli` (default): command-line interface and progress reporting
//! - `webp-support` (default): WebP input and output
//! - `tracing-json`: JSON log output for the CLI
//!
//! ## Backend Selection
//!
//! ```rust,no_run
//! use product_composite::{BackendType, CompositeConfig, CompositeProcessor};
//!
//! # fn example() -> product_composite::Result<()> {
//! let config = CompositeConfig::builder()
//!     .backend(BackendType::Command)
//!     .command(["rembg", "i"])
//!     .build()?;
//! let mut processor = CompositeProcessor::new(config)?;
//! processor.initialize()?; // fails fast when rembg is missing
//! # Ok(())
//! # }
//! ```

pub mod backdrop;
pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod extractor;
pub mod filters;
pub mod harmonizer;
pub mod processor;
pub mod raster;
pub mod services;
pub mod shadow;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use std::path::PathBuf;
use tokio::io::AsyncRead;

// Public API exports
pub use backdrop::{BackdropKind, BackdropSynthesizer, LayerSpec, SKYLINE_LAYERS};
pub use backends::*;
pub use compositor::{resolve_canvas_size, Compositor, PlacementSpec};
pub use config::{
    BackdropConfig, CanvasConfig, CompositeConfig, CompositeConfigBuilder, CompositeOptions,
    HarmonizeConfig, OutputSize, PlacementConfig, RefineConfig, SegmentationConfig, ShadowConfig,
    MAX_CANVAS_PIXELS,
};
pub use error::{CompositeError, Result};
pub use extractor::SubjectExtractor;
pub use harmonizer::ColorHarmonizer;
pub use processor::CompositeProcessor;
pub use raster::{AlphaMask, RasterBuffer, Resample};
pub use services::{
    ConsoleProgressReporter, ImageIOService, NoOpProgressReporter, ProcessingStage,
    ProgressReporter, ProgressTracker, ProgressUpdate,
};
pub use shadow::{ContactShadow, ShadowCaster};
pub use types::{CompositeMetadata, CompositeResult, CompositeTimings};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

async fn run_blocking<T, F>(job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| CompositeError::processing(format!("Compositing task failed: {}", e)))?
}

/// Composite an image file and write the result
///
/// The whole pipeline runs on tokio's blocking pool, so independent calls
/// can proceed in parallel.
///
/// # Examples
///
/// ```rust,no_run
/// use product_composite::{composite_file, BackendType, CompositeConfig, CompositeOptions};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = CompositeConfig::builder().backend(BackendType::Mock).build()?;
/// let options = CompositeOptions::new().with_background("studio.jpg");
/// composite_file("mug.png", "out/mug.png", config, options).await?;
/// # Ok(())
/// # }
/// ```
pub async fn composite_file<P, Q>(
    input_path: P,
    output_path: Q,
    config: CompositeConfig,
    options: CompositeOptions,
) -> Result<CompositeResult>
where
    P: Into<PathBuf>,
    Q: Into<PathBuf>,
{
    let input_path = input_path.into();
    let output_path = output_path.into();
    run_blocking(move || {
        let mut processor = CompositeProcessor::new(config)?;
        processor.process_file(&input_path, &output_path, &options)
    })
    .await
}

/// Composite an encoded image held in memory
///
/// Suitable for servers receiving uploads. Nothing is written to disk; use
/// [`CompositeResult::to_png_bytes`] or [`CompositeResult::save`] afterwards.
pub async fn composite_from_bytes(
    image_bytes: Vec<u8>,
    config: CompositeConfig,
    size: Option<OutputSize>,
    seed: Option<u64>,
) -> Result<CompositeResult> {
    run_blocking(move || {
        let mut processor = CompositeProcessor::new(config)?;
        processor.composite_bytes(&image_bytes, size, seed)
    })
    .await
}

/// Composite an image read from an async stream
pub async fn composite_from_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    config: CompositeConfig,
    size: Option<OutputSize>,
    seed: Option<u64>,
) -> Result<CompositeResult> {
    let mut buffer = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buffer)
        .await
        .map_err(|e| CompositeError::processing(format!("Failed to read from stream: {}", e)))?;

    composite_from_bytes(buffer, config, size, seed).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_config() -> CompositeConfig {
        CompositeConfig::builder()
            .backend(BackendType::Mock)
            .build()
            .unwrap()
    }

    fn encoded_product_shot() -> Vec<u8> {
        let mut image = RasterBuffer::filled(64, 48, [250, 250, 250, 255]);
        image.fill_rect(20, 12, 43, 35, [30, 60, 200, 255]);
        ImageIOService::encode_png(&image).unwrap()
    }

    #[tokio::test]
    async fn test_composite_from_bytes() {
        let result = composite_from_bytes(encoded_product_shot(), mock_config(), None, Some(5))
            .await
            .unwrap();
        assert_eq!(result.dimensions(), (64, 48));
        assert_eq!(result.metadata.seed, Some(5));
    }

    #[tokio::test]
    async fn test_composite_from_reader_matches_bytes() {
        let bytes = encoded_product_shot();
        let from_reader =
            composite_from_reader(std::io::Cursor::new(bytes.clone()), mock_config(), None, Some(9))
                .await
                .unwrap();
        let from_bytes = composite_from_bytes(bytes, mock_config(), None, Some(9))
            .await
            .unwrap();
        assert_eq!(from_reader.image, from_bytes.image);
    }

    #[tokio::test]
    async fn test_garbage_bytes_fail() {
        let err = composite_from_bytes(vec![1, 2, 3], mock_config(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CompositeError::Image(_)));
    }
}
