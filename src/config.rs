//! Configuration types for compositing runs
//!
//! Every tuning constant of the pipeline lives here, grouped per stage. The
//! defaults reproduce the reference look; a JSON file can override any subset
//! of them because every section is `#[serde(default)]`.

use crate::backdrop::{LayerSpec, SKYLINE_LAYERS};
use crate::backends::BackendType;
use crate::error::{CompositeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Largest canvas a run may allocate, in pixels (16384 x 16384)
pub const MAX_CANVAS_PIXELS: u64 = 1 << 28;

/// Explicit output canvas size parsed from `WIDTHxHEIGHT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSize {
    pub width: u32,
    pub height: u32,
}

impl OutputSize {
    /// Create a size, rejecting zero dimensions and canvases above
    /// [`MAX_CANVAS_PIXELS`]
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let size = Self { width, height };
        if width == 0 || height == 0 || size.pixel_count() > MAX_CANVAS_PIXELS {
            return Err(CompositeError::invalid_size(size.to_string()));
        }
        Ok(size)
    }

    /// Parse a strict `<int>x<int>` string
    ///
    /// The separator is case insensitive. Both parts must be plain decimal
    /// digits describing a positive value; signs, whitespace and extra
    /// separators are rejected.
    ///
    /// # Examples
    /// ```rust
    /// use product_composite::OutputSize;
    ///
    /// let size = OutputSize::parse("2000X1500").unwrap();
    /// assert_eq!((size.width, size.height), (2000, 1500));
    /// assert!(OutputSize::parse("abcx").is_err());
    /// ```
    pub fn parse(spec: &str) -> Result<Self> {
        let invalid = || CompositeError::invalid_size(spec);
        let (width, height) = spec
            .split_once(|c: char| c == 'x' || c == 'X')
            .ok_or_else(invalid)?;
        let width = parse_dimension(width).ok_or_else(invalid)?;
        let height = parse_dimension(height).ok_or_else(invalid)?;
        Self::new(width, height).map_err(|_| invalid())
    }

    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    #[must_use]
    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

fn parse_dimension(part: &str) -> Option<u32> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

impl FromStr for OutputSize {
    type Err = CompositeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for OutputSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Canvas sizing when no explicit size is requested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Longest side allowed for the native-size canvas
    pub max_side: u32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self { max_side: 2200 }
    }
}

/// Subject placement on the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Fraction of the canvas width the subject may occupy
    pub width_fraction: f64,
    /// Fraction of the canvas height the subject may occupy
    pub height_fraction: f64,
    /// Vertical position of the subject center as a fraction of the canvas height
    pub vertical_center: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            width_fraction: 0.76,
            height_fraction: 0.70,
            vertical_center: 0.5,
        }
    }
}

/// Contact shadow shape and strength
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Multiplier applied to the subject alpha before squashing
    pub strength: f32,
    /// Shadow height as a fraction of the subject height
    pub squash: f64,
    /// Gaussian blur sigma applied to the squashed mask
    pub blur: f32,
    /// Peak opacity of the black shadow layer
    pub opacity: u8,
    /// Vertical offset below the subject top as a fraction of its height
    pub drop: f64,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            strength: 0.6,
            squash: 0.25,
            blur: 12.0,
            opacity: 90,
            drop: 0.65,
        }
    }
}

/// Statistical color matching of the subject to the backdrop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonizeConfig {
    /// Side of the bilinear thumbnail used to average the backdrop
    pub thumbnail_size: u32,
    /// How far the tint leans from mid-gray toward the backdrop average
    pub tint_strength: f64,
    /// Blend factor of the subject toward the tint
    pub blend: f32,
}

impl Default for HarmonizeConfig {
    fn default() -> Self {
        Self {
            thumbnail_size: 32,
            tint_strength: 0.125,
            blend: 0.08,
        }
    }
}

/// Alpha edge refinement after segmentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    /// Square erosion kernel size (odd)
    pub erode_size: u32,
    /// Gaussian feather sigma applied after erosion
    pub feather: f32,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            erode_size: 3,
            feather: 0.6,
        }
    }
}

/// Procedural skyline and supplied-background settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackdropConfig {
    pub sky_top: [u8; 3],
    pub sky_bottom: [u8; 3],
    /// Ground line as a fraction of the canvas height
    pub ground_line: f64,
    /// Tallest possible building as a fraction of the canvas height
    pub max_building_height: f64,
    /// Building width range as fractions of the canvas width
    pub building_width: (f64, f64),
    /// Gap range between buildings as fractions of the canvas width
    pub building_gap: (f64, f64),
    /// Lower bound of the random height scale
    pub min_height_scale: f64,
    /// Gray level range of building silhouettes
    pub shade: (u8, u8),
    pub roof_probability: f64,
    /// Roof cap height range in pixels
    pub roof_height: (u32, u32),
    /// Horizontal roof inset in pixels
    pub roof_inset: u32,
    /// Roof alpha relative to the layer alpha
    pub roof_alpha_factor: f64,
    /// Back-to-front silhouette layers
    pub layers: Vec<LayerSpec>,
    /// Blur applied to the finished skyline
    pub final_blur: f32,
    /// Blur applied to a supplied background after resizing
    pub supplied_blur: f32,
}

impl Default for BackdropConfig {
    fn default() -> Self {
        Self {
            sky_top: [236, 240, 245],
            sky_bottom: [210, 220, 230],
            ground_line: 0.72,
            max_building_height: 0.38,
            building_width: (0.03, 0.08),
            building_gap: (0.005, 0.015),
            min_height_scale: 0.35,
            shade: (30, 50),
            roof_probability: 0.25,
            roof_height: (3, 8),
            roof_inset: 2,
            roof_alpha_factor: 0.9,
            layers: SKYLINE_LAYERS.to_vec(),
            final_blur: 1.2,
            supplied_blur: 1.2,
        }
    }
}

/// Which segmentation collaborator to use and how to reach it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub backend: BackendType,
    /// ONNX model for the tract backend; the user cache directory is used when unset
    pub model_path: Option<PathBuf>,
    /// Program and arguments for the command backend
    pub command: Vec<String>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::default(),
            model_path: None,
            command: vec!["rembg".to_string(), "i".to_string()],
        }
    }
}

/// Complete configuration for a compositing run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    pub canvas: CanvasConfig,
    pub placement: PlacementConfig,
    pub shadow: ShadowConfig,
    pub harmonize: HarmonizeConfig,
    pub refine: RefineConfig,
    pub backdrop: BackdropConfig,
    pub segmentation: SegmentationConfig,
}

impl CompositeConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use product_composite::{BackendType, CompositeConfig};
    ///
    /// let config = CompositeConfig::builder()
    ///     .backend(BackendType::Mock)
    ///     .max_side(1200)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.canvas.max_side, 1200);
    /// ```
    #[must_use]
    pub fn builder() -> CompositeConfigBuilder {
        CompositeConfigBuilder::default()
    }

    /// Load overrides from a JSON file; missing keys keep their defaults
    ///
    /// # Errors
    /// - File cannot be read
    /// - Malformed JSON
    /// - Values outside their valid ranges
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CompositeError::file_io_error("read config", path, &e))?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Pretty JSON rendering of the effective configuration
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// Returns `InvalidConfig` naming the first offending parameter.
    pub fn validate(&self) -> Result<()> {
        if self.canvas.max_side == 0 {
            return Err(CompositeError::config_value_error(
                "canvas.max_side",
                self.canvas.max_side,
                ">= 1",
            ));
        }

        check_fraction("placement.width_fraction", self.placement.width_fraction)?;
        check_fraction("placement.height_fraction", self.placement.height_fraction)?;
        check_unit("placement.vertical_center", self.placement.vertical_center)?;

        check_unit("shadow.strength", f64::from(self.shadow.strength))?;
        check_fraction("shadow.squash", self.shadow.squash)?;
        check_non_negative("shadow.blur", f64::from(self.shadow.blur))?;
        check_non_negative("shadow.drop", self.shadow.drop)?;

        if self.harmonize.thumbnail_size == 0 {
            return Err(CompositeError::config_value_error(
                "harmonize.thumbnail_size",
                self.harmonize.thumbnail_size,
                ">= 1",
            ));
        }
        check_unit("harmonize.tint_strength", self.harmonize.tint_strength)?;
        check_unit("harmonize.blend", f64::from(self.harmonize.blend))?;

        if self.refine.erode_size == 0 || self.refine.erode_size % 2 == 0 {
            return Err(CompositeError::config_value_error(
                "refine.erode_size",
                self.refine.erode_size,
                "odd values >= 1",
            ));
        }
        check_non_negative("refine.feather", f64::from(self.refine.feather))?;

        self.validate_backdrop()?;

        if self.segmentation.backend == BackendType::Command && self.segmentation.command.is_empty() {
            return Err(CompositeError::invalid_config(
                "segmentation.command must name a program for the command backend",
            ));
        }

        Ok(())
    }

    fn validate_backdrop(&self) -> Result<()> {
        let backdrop = &self.backdrop;
        check_unit("backdrop.ground_line", backdrop.ground_line)?;
        check_unit("backdrop.max_building_height", backdrop.max_building_height)?;
        check_range("backdrop.building_width", backdrop.building_width)?;
        check_range("backdrop.building_gap", backdrop.building_gap)?;
        check_unit("backdrop.min_height_scale", backdrop.min_height_scale)?;
        check_unit("backdrop.roof_probability", backdrop.roof_probability)?;
        check_unit("backdrop.roof_alpha_factor", backdrop.roof_alpha_factor)?;
        check_non_negative("backdrop.final_blur", f64::from(backdrop.final_blur))?;
        check_non_negative("backdrop.supplied_blur", f64::from(backdrop.supplied_blur))?;

        if backdrop.shade.0 > backdrop.shade.1 {
            return Err(CompositeError::config_value_error(
                "backdrop.shade",
                format!("{:?}", backdrop.shade),
                "min <= max",
            ));
        }
        if backdrop.roof_height.0 > backdrop.roof_height.1 {
            return Err(CompositeError::config_value_error(
                "backdrop.roof_height",
                format!("{:?}", backdrop.roof_height),
                "min <= max",
            ));
        }
        for (index, layer) in backdrop.layers.iter().enumerate() {
            if !(layer.height_scale > 0.0 && layer.height_scale <= 1.0) {
                return Err(CompositeError::config_value_error(
                    &format!("backdrop.layers[{index}].height_scale"),
                    layer.height_scale,
                    "(0, 1]",
                ));
            }
            check_non_negative(
                &format!("backdrop.layers[{index}].blur_radius"),
                f64::from(layer.blur_radius),
            )?;
        }
        Ok(())
    }
}

fn check_fraction(parameter: &str, value: f64) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(CompositeError::config_value_error(parameter, value, "(0, 1]"))
    }
}

fn check_unit(parameter: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CompositeError::config_value_error(parameter, value, "0-1"))
    }
}

fn check_non_negative(parameter: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CompositeError::config_value_error(parameter, value, ">= 0"))
    }
}

fn check_range(parameter: &str, (min, max): (f64, f64)) -> Result<()> {
    check_unit(parameter, min)?;
    check_unit(parameter, max)?;
    if min > max {
        return Err(CompositeError::config_value_error(
            parameter,
            format!("({min}, {max})"),
            "min <= max",
        ));
    }
    Ok(())
}

/// Builder for `CompositeConfig`
#[derive(Debug, Default)]
pub struct CompositeConfigBuilder {
    config: CompositeConfig,
}

impl CompositeConfigBuilder {
    /// Start from an existing configuration, e.g. one loaded from JSON
    #[must_use]
    pub fn from_config(config: CompositeConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn backend(mut self, backend: BackendType) -> Self {
        self.config.segmentation.backend = backend;
        self
    }

    #[must_use]
    pub fn model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.segmentation.model_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.segmentation.command = command.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn max_side(mut self, max_side: u32) -> Self {
        self.config.canvas.max_side = max_side;
        self
    }

    #[must_use]
    pub fn placement(mut self, placement: PlacementConfig) -> Self {
        self.config.placement = placement;
        self
    }

    #[must_use]
    pub fn shadow(mut self, shadow: ShadowConfig) -> Self {
        self.config.shadow = shadow;
        self
    }

    #[must_use]
    pub fn harmonize(mut self, harmonize: HarmonizeConfig) -> Self {
        self.config.harmonize = harmonize;
        self
    }

    #[must_use]
    pub fn refine(mut self, refine: RefineConfig) -> Self {
        self.config.refine = refine;
        self
    }

    #[must_use]
    pub fn backdrop(mut self, backdrop: BackdropConfig) -> Self {
        self.config.backdrop = backdrop;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// Any validation failure from [`CompositeConfig::validate`].
    pub fn build(self) -> Result<CompositeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Per-run inputs that are not tuning constants
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeOptions {
    /// Replacement background image; a procedural skyline is drawn when absent
    pub background: Option<PathBuf>,
    /// Explicit canvas size; the input's native size is used when absent
    pub size: Option<OutputSize>,
    /// Skyline seed; fresh entropy is drawn when absent
    pub seed: Option<u64>,
}

impl CompositeOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_background<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.background = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: OutputSize) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
