//! Shared fixtures for integration tests

#![allow(dead_code)]

use product_composite::{BackendType, CompositeConfig, ImageIOService, RasterBuffer};
use std::path::{Path, PathBuf};

pub const STUDIO_WHITE: [u8; 4] = [255, 255, 255, 255];
pub const PRODUCT_RED: [u8; 4] = [180, 40, 40, 255];

/// Opaque product photo: a red block covering the middle half on white
pub fn product_shot(width: u32, height: u32) -> RasterBuffer {
    let mut image = RasterBuffer::filled(width, height, STUDIO_WHITE);
    let (w, h) = (i64::from(width), i64::from(height));
    image.fill_rect(w / 4, h / 4, 3 * w / 4 - 1, 3 * h / 4 - 1, PRODUCT_RED);
    image
}

/// Write `raster` to `dir/name` and return the path
pub fn write_fixture(dir: &Path, name: &str, raster: &RasterBuffer) -> PathBuf {
    let path = dir.join(name);
    ImageIOService::save_raster(raster, &path).expect("fixture should be writable");
    path
}

/// Configuration using the color-key backend, which needs no model or program
pub fn mock_config() -> CompositeConfig {
    CompositeConfig::builder()
        .backend(BackendType::Mock)
        .build()
        .expect("default config is valid")
}

pub fn luminance(pixel: [u8; 4]) -> u32 {
    u32::from(pixel[0]) + u32::from(pixel[1]) + u32::from(pixel[2])
}
