//! Result and metadata types produced by a compositing run

use crate::backdrop::BackdropKind;
use crate::compositor::PlacementSpec;
use crate::error::Result;
use crate::raster::RasterBuffer;
use crate::services::ImageIOService;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Wall-clock time spent in each stage, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompositeTimings {
    pub image_decode_ms: u64,
    pub segmentation_ms: u64,
    pub backdrop_ms: u64,
    pub harmonize_ms: u64,
    pub composite_ms: u64,
    pub total_ms: u64,
}

/// Everything worth knowing about how an output was produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeMetadata {
    pub input_width: u32,
    pub input_height: u32,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub backdrop: BackdropKind,
    /// Seed that reproduces the skyline; absent for supplied backgrounds
    pub seed: Option<u64>,
    pub backend: String,
    pub placement: PlacementSpec,
    pub timings: CompositeTimings,
    pub created_at: DateTime<Utc>,
}

impl CompositeMetadata {
    /// Pretty JSON rendering
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the JSON rendering to `path`, creating parent directories
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                crate::error::CompositeError::file_io_error("create metadata directory", parent, &e)
            })?;
        }
        std::fs::write(path, self.to_json()?)
            .map_err(|e| crate::error::CompositeError::file_io_error("write metadata", path, &e))
    }
}

/// Final composited image plus its metadata
#[derive(Debug, Clone)]
pub struct CompositeResult {
    pub image: RasterBuffer,
    pub metadata: CompositeMetadata,
}

impl CompositeResult {
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    #[must_use]
    pub fn placement(&self) -> &PlacementSpec {
        &self.metadata.placement
    }

    /// Save the image; the format follows the extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        ImageIOService::save_raster(&self.image, path)
    }

    /// Encode the image as PNG bytes
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        ImageIOService::encode_png(&self.image)
    }
}
