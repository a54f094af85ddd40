//! Segmentation backends
//!
//! The pipeline consumes background removal as a black box: an RGBA image goes
//! in, an RGBA image with a foreground alpha comes out. This module provides the
//! contract and three implementations:
//! - Tract backend (pure Rust ONNX inference, feature `tract`)
//! - Command backend (pipes PNG through an external program such as `rembg`)
//! - Mock backend (deterministic color keying for tests and offline use)

pub mod command;
pub mod mock;

#[cfg(feature = "tract")]
pub mod tract;

pub use self::command::CommandBackend;
pub use self::mock::MockBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

use crate::config::SegmentationConfig;
use crate::error::{CompositeError, Result};
use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Contract for a background-removal collaborator
pub trait SegmentationBackend: Send {
    /// Short identifier used in logs and metadata
    fn name(&self) -> &str;

    /// Check that the collaborator can run, loading it if needed
    ///
    /// # Errors
    /// `SegmentationUnavailable` naming the missing dependency.
    fn ensure_available(&mut self) -> Result<()>;

    /// Remove the background of `image`
    ///
    /// # Errors
    /// - `SegmentationUnavailable` when the collaborator is missing
    /// - `Segmentation` when it runs but fails
    fn segment(&mut self, image: &RgbaImage) -> Result<SegmentationOutput>;
}

impl fmt::Debug for dyn SegmentationBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SegmentationBackend({})", self.name())
    }
}

/// Payload returned by a segmentation collaborator
#[derive(Debug, Clone)]
pub enum SegmentationOutput {
    /// An encoded image file (PNG, WebP, ...)
    Encoded(Vec<u8>),
    /// An already decoded image in any color type
    Image(DynamicImage),
    /// Raw interleaved RGBA8 samples
    Raw {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
}

impl SegmentationOutput {
    /// Normalize any payload variant into one RGBA image of `expected` size
    ///
    /// # Errors
    /// `UnexpectedSegmentationOutput` for undecodable bytes, raw buffers of the
    /// wrong length, or a result whose dimensions differ from the input.
    pub fn normalize(self, expected: (u32, u32)) -> Result<RgbaImage> {
        let image = match self {
            Self::Encoded(bytes) => {
                if bytes.is_empty() {
                    return Err(CompositeError::unexpected_output(
                        "collaborator returned no bytes",
                    ));
                }
                image::load_from_memory(&bytes)
                    .map_err(|e| {
                        CompositeError::unexpected_output(format!(
                            "returned bytes are not a decodable image: {e}"
                        ))
                    })?
                    .into_rgba8()
            },
            Self::Image(image) => image.into_rgba8(),
            Self::Raw {
                width,
                height,
                pixels,
            } => {
                let len = pixels.len();
                RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
                    CompositeError::unexpected_output(format!(
                        "raw buffer of {len} bytes does not hold {width}x{height} RGBA pixels"
                    ))
                })?
            },
        };

        if image.dimensions() != expected {
            return Err(CompositeError::unexpected_output(format!(
                "result is {}x{} but the input was {}x{}",
                image.width(),
                image.height(),
                expected.0,
                expected.1
            )));
        }
        Ok(image)
    }
}

/// Backend type enumeration for runtime selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum BackendType {
    /// ISNet-style ONNX model run with Tract
    #[default]
    Tract,
    /// External program fed over stdin/stdout
    Command,
    /// Color-key segmentation, no model required
    Mock,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tract => write!(f, "tract"),
            Self::Command => write!(f, "command"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

impl FromStr for BackendType {
    type Err = CompositeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tract" => Ok(Self::Tract),
            "command" => Ok(Self::Command),
            "mock" => Ok(Self::Mock),
            other => Err(CompositeError::invalid_config(format!(
                "Unknown backend '{other}' (expected tract, command or mock)"
            ))),
        }
    }
}

/// Factory trait for creating segmentation backends
pub trait BackendFactory: Send + Sync {
    /// Create the backend selected by `config`
    ///
    /// # Errors
    /// - Backend not compiled in or not configured
    fn create_backend(&self, config: &SegmentationConfig) -> Result<Box<dyn SegmentationBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Factory for the backends compiled into this crate
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(&self, config: &SegmentationConfig) -> Result<Box<dyn SegmentationBackend>> {
        match config.backend {
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(TractBackend::new(config.model_path.clone())?)),
            #[cfg(not(feature = "tract"))]
            BackendType::Tract => Err(CompositeError::segmentation_unavailable(
                "the tract backend is not compiled in; rebuild with `--features tract` \
                 or choose `--backend command`",
            )),
            BackendType::Command => Ok(Box::new(CommandBackend::from_command(&config.command)?)),
            BackendType::Mock => Ok(Box::new(MockBackend::new())),
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        backends.push(BackendType::Command);
        backends.push(BackendType::Mock);
        backends
    }
}
