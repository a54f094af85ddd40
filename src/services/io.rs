//! Image I/O operations service
//!
//! Keeps file access out of the pipeline stages so they stay pure buffer
//! transforms.

use crate::error::{CompositeError, Result};
use crate::raster::RasterBuffer;
use image::{DynamicImage, ImageFormat};
use std::path::Path;

/// Service for handling image file input/output operations
#[derive(Debug)]
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// # Errors
    /// - `InputNotFound` when the path does not exist
    /// - Decoding failures
    ///
    /// # Examples
    /// ```rust,no_run
    /// use product_composite::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("shoe.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();
        if !path_ref.exists() {
            return Err(CompositeError::input_not_found(path_ref));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                // Extensions lie; retry with content sniffing
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );
                let data = std::fs::read(path_ref)
                    .map_err(|io_err| CompositeError::file_io_error("read image data", path_ref, &io_err))?;
                image::load_from_memory(&data).map_err(|content_err| {
                    CompositeError::processing_stage_error(
                        "image loading",
                        &format!(
                            "'{}' could not be decoded ({}; {})",
                            path_ref.display(),
                            e,
                            content_err
                        ),
                    )
                })
            },
        }
    }

    /// Load an image straight into an RGBA buffer
    pub fn load_raster<P: AsRef<Path>>(path: P) -> Result<RasterBuffer> {
        Self::load_image(path).map(RasterBuffer::from)
    }

    /// Output format implied by the file extension; PNG when unknown
    #[must_use]
    pub fn format_for_path(path: &Path) -> ImageFormat {
        ImageFormat::from_path(path).unwrap_or(ImageFormat::Png)
    }

    /// Save an RGBA raster, creating parent directories first
    ///
    /// Formats without an alpha channel receive the RGB channels only.
    ///
    /// # Errors
    /// - Directory creation or write failures
    /// - Encoder failures
    pub fn save_raster<P: AsRef<Path>>(raster: &RasterBuffer, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CompositeError::file_io_error("create output directory", parent, &e)
            })?;
        }

        let format = Self::format_for_path(path_ref);
        let image = raster.clone().into_dynamic();
        let image = if Self::supports_alpha(format) {
            image
        } else {
            DynamicImage::ImageRgb8(image.to_rgb8())
        };

        image.save_with_format(path_ref, format).map_err(|e| match e {
            image::ImageError::IoError(io) => {
                CompositeError::file_io_error("write output image", path_ref, &io)
            },
            other => CompositeError::Image(other),
        })?;

        log::debug!("Saved {:?} image to {}", format, path_ref.display());
        Ok(())
    }

    /// Encode to an in-memory PNG
    pub fn encode_png(raster: &RasterBuffer) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        raster
            .as_image()
            .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    fn supports_alpha(format: ImageFormat) -> bool {
        matches!(
            format,
            ImageFormat::Png | ImageFormat::WebP | ImageFormat::Tiff | ImageFormat::Tga
        )
    }
}
