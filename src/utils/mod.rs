//! Shared helpers for model-backed segmentation

pub mod preprocessing;

pub use preprocessing::{apply_mask, mask_from_output, preprocess, Letterbox, PreprocessingConfig};
