//! Error types for compositing operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for compositing operations
pub type Result<T> = std::result::Result<T, CompositeError>;

/// Error types for the compositing pipeline
///
/// Every variant is fatal for the run that raised it. The pipeline never retries
/// and never writes partial output.
#[derive(Error, Debug)]
pub enum CompositeError {
    /// A source image (subject or background) does not exist
    #[error("Input not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// Malformed `WIDTHxHEIGHT` output size string
    #[error("Invalid size '{0}'. Use format WIDTHxHEIGHT, e.g., 2000x2000")]
    InvalidSizeSpec(String),

    /// The segmentation collaborator is missing or misconfigured
    #[error("Segmentation unavailable: {0}")]
    SegmentationUnavailable(String),

    /// The segmentation collaborator returned a payload that cannot be normalized
    #[error("Unexpected segmentation output: {0}")]
    UnexpectedSegmentationOutput(String),

    /// The segmentation collaborator ran but reported a failure
    #[error("Segmentation error: {0}")]
    Segmentation(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Raster processing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Input/output errors (permission denied, disk full, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Configuration or metadata (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CompositeError {
    /// Create an input-not-found error
    pub fn input_not_found<P: Into<PathBuf>>(path: P) -> Self {
        Self::InputNotFound(path.into())
    }

    /// Create an invalid size specification error
    pub fn invalid_size<S: Into<String>>(spec: S) -> Self {
        Self::InvalidSizeSpec(spec.into())
    }

    /// Create a segmentation-unavailable error naming the missing dependency
    pub fn segmentation_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::SegmentationUnavailable(msg.into())
    }

    /// Create an unexpected segmentation output error
    pub fn unexpected_output<S: Into<String>>(msg: S) -> Self {
        Self::UnexpectedSegmentationOutput(msg.into())
    }

    /// Create a segmentation failure error
    pub fn segmentation<S: Into<String>>(msg: S) -> Self {
        Self::Segmentation(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str) -> Self {
        Self::Processing(format!("Processing failed at stage '{}': {}", stage, details))
    }

    /// Whether the error was raised before any pixel work started
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::InputNotFound(_) | Self::InvalidSizeSpec(_))
    }
}
