//! Tract backend for ISNet-style segmentation models
//!
//! Runs an ONNX model with Tract, a pure Rust inference library, so no native
//! runtime has to be installed. The model is loaded lazily on first use.

use super::{SegmentationBackend, SegmentationOutput};
use crate::error::{CompositeError, Result};
use crate::utils::{apply_mask, mask_from_output, preprocess, PreprocessingConfig};
use image::{DynamicImage, RgbaImage};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Default model location under the user cache directory
#[must_use]
pub fn default_model_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("product-composite").join("models").join("isnet.onnx"))
}

/// Tract backend for running segmentation models using pure Rust inference
pub struct TractBackend {
    model_path: PathBuf,
    preprocessing: PreprocessingConfig,
    model: Option<TractModel>,
}

impl std::fmt::Debug for TractBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TractBackend")
            .field("model_path", &self.model_path)
            .field("loaded", &self.model.is_some())
            .finish()
    }
}

impl TractBackend {
    /// Create an unloaded backend
    ///
    /// # Errors
    /// `SegmentationUnavailable` when no path is given and the platform has no
    /// cache directory to look in.
    pub fn new(model_path: Option<PathBuf>) -> Result<Self> {
        let model_path = match model_path {
            Some(path) => path,
            None => default_model_path().ok_or_else(|| {
                CompositeError::segmentation_unavailable(
                    "no cache directory on this platform; pass an ISNet ONNX model with --model",
                )
            })?,
        };
        Ok(Self {
            model_path,
            preprocessing: PreprocessingConfig::default(),
            model: None,
        })
    }

    #[must_use]
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    fn load_model(&self) -> Result<TractModel> {
        let start = Instant::now();
        let size = self.preprocessing.target_size as usize;
        let model = onnx()
            .model_for_path(&self.model_path)
            .map_err(|e| CompositeError::segmentation(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([1, 3, size, size]).into())
            .map_err(|e| {
                CompositeError::segmentation(format!("Model rejected the input shape: {e}"))
            })?
            .into_optimized()
            .map_err(|e| CompositeError::segmentation(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| {
                CompositeError::segmentation(format!("Failed to create runnable model: {e}"))
            })?;

        info!(
            "Tract model {} loaded in {}ms",
            self.model_path.display(),
            start.elapsed().as_millis()
        );
        Ok(model)
    }
}

impl SegmentationBackend for TractBackend {
    fn name(&self) -> &str {
        "tract"
    }

    fn ensure_available(&mut self) -> Result<()> {
        if self.model.is_some() {
            return Ok(());
        }
        if !self.model_path.is_file() {
            return Err(CompositeError::segmentation_unavailable(format!(
                "ISNet ONNX model not found at '{}'; download it there or pass --model",
                self.model_path.display()
            )));
        }
        self.model = Some(self.load_model()?);
        Ok(())
    }

    fn segment(&mut self, image: &RgbaImage) -> Result<SegmentationOutput> {
        self.ensure_available()?;
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| CompositeError::segmentation("Tract model not initialized"))?;

        let (input, letterbox) = preprocess(image, &self.preprocessing)?;
        let size = self.preprocessing.target_size as usize;
        let (data, _) = input.into_raw_vec_and_offset();
        let tensor = Tensor::from_shape(&[1, 3, size, size], &data)
            .map_err(|e| CompositeError::segmentation(format!("Failed to build input tensor: {e}")))?;

        let start = Instant::now();
        let outputs = model
            .run(tvec![tensor.into()])
            .map_err(|e| CompositeError::segmentation(format!("Tract inference failed: {e}")))?;
        debug!("Tract inference completed in {}ms", start.elapsed().as_millis());

        let output = outputs
            .first()
            .ok_or_else(|| CompositeError::unexpected_output("model produced no output tensor"))?;
        let view = output.to_array_view::<f32>().map_err(|e| {
            CompositeError::unexpected_output(format!("output tensor is not f32: {e}"))
        })?;
        let shape = view.shape().to_vec();
        let mask_size = shape.last().copied().unwrap_or(0);
        if shape.len() < 2 || shape.get(shape.len() - 2) != Some(&mask_size) {
            return Err(CompositeError::unexpected_output(format!(
                "expected a square mask output, got shape {shape:?}"
            )));
        }
        let values: Vec<f32> = view.iter().copied().collect();

        let mask = mask_from_output(&values, mask_size as u32, letterbox, image.dimensions())?;
        Ok(SegmentationOutput::Image(DynamicImage::ImageRgba8(apply_mask(
            image, &mask,
        ))))
    }
}
