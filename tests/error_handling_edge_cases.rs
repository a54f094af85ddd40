//! Error handling and edge case tests
//!
//! Every failure must surface before the output file is written.

mod common;

use common::{mock_config, product_shot, write_fixture};
use product_composite::{
    BackendType, CompositeConfig, CompositeError, CompositeOptions, CompositeProcessor,
    OutputSize, RasterBuffer, Result, MAX_CANVAS_PIXELS,
};
use tempfile::TempDir;

#[test]
fn test_size_spec_parsing_edge_cases() {
    for bad in ["abcx", "", "x", "2000", "2000x", "x2000", "0x100", "100x0", "-5x10", "10 x10", "1.5x2", "2x2x2", "+3x4"] {
        let err = OutputSize::parse(bad).unwrap_err();
        assert!(
            matches!(err, CompositeError::InvalidSizeSpec(_)),
            "'{bad}' gave {err:?}"
        );
        assert!(err.to_string().contains("WIDTHxHEIGHT"));
    }

    assert_eq!(OutputSize::parse("2000x2000").unwrap().as_tuple(), (2000, 2000));
    assert_eq!(OutputSize::parse("640X480").unwrap().as_tuple(), (640, 480));
}

#[test]
fn test_oversized_canvas_spec_rejected() {
    for huge in ["4294967295x4294967295", "16385x16384", "268435457x1"] {
        assert!(
            matches!(OutputSize::parse(huge), Err(CompositeError::InvalidSizeSpec(_))),
            "'{huge}' should be rejected"
        );
    }
    let largest = OutputSize::parse("16384x16384").unwrap();
    assert_eq!(largest.pixel_count(), MAX_CANVAS_PIXELS);
}

#[test]
fn test_oversized_canvas_returns_error_instead_of_allocating() -> Result<()> {
    let mut processor = CompositeProcessor::new(mock_config())?;
    let huge = OutputSize {
        width: u32::MAX,
        height: u32::MAX,
    };
    let background = RasterBuffer::filled(4, 4, [90, 90, 90, 255]);

    let err = processor
        .composite(product_shot(32, 32), Some(background), Some(huge), None)
        .unwrap_err();
    assert!(matches!(err, CompositeError::Processing(ref msg) if msg.contains("4294967295x4294967295")));

    let err = processor
        .composite(product_shot(32, 32), None, Some(huge), Some(1))
        .unwrap_err();
    assert!(matches!(err, CompositeError::Processing(_)));
    Ok(())
}

#[cfg(feature = "cli")]
#[tokio::test]
async fn test_bad_size_rejected_before_decoding() -> Result<()> {
    use clap::Parser;
    use product_composite::cli::{run, Cli};

    // An undecodable input proves the size is checked first
    let temp_dir = TempDir::new()?;
    let input = temp_dir.path().join("broken.png");
    std::fs::write(&input, b"not an image")?;
    let output = temp_dir.path().join("out/result.png");

    let cli = Cli::try_parse_from([
        "product-composite".into(),
        input.into_os_string(),
        output.clone().into_os_string(),
        "--size".into(),
        "abcx".into(),
        "--backend".into(),
        std::ffi::OsString::from("mock"),
    ])
    .expect("arguments parse");

    let err = run(cli, "test").await.unwrap_err();
    assert!(matches!(
        err.root_cause().downcast_ref::<CompositeError>(),
        Some(CompositeError::InvalidSizeSpec(spec)) if spec == "abcx"
    ));
    assert!(!output.parent().unwrap().exists());
    Ok(())
}

#[test]
fn test_missing_input() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output = temp_dir.path().join("out/result.png");

    let mut processor = CompositeProcessor::new(mock_config())?;
    let err = processor
        .process_file(temp_dir.path().join("ghost.jpg"), &output, &CompositeOptions::new())
        .unwrap_err();

    assert!(matches!(err, CompositeError::InputNotFound(ref p) if p.ends_with("ghost.jpg")));
    assert!(err.is_input_error());
    assert!(!output.parent().unwrap().exists());
    Ok(())
}

#[test]
fn test_missing_background() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let input = write_fixture(temp_dir.path(), "product.png", &product_shot(64, 64));
    let output = temp_dir.path().join("result.png");

    let mut processor = CompositeProcessor::new(mock_config())?;
    let options = CompositeOptions::new().with_background(temp_dir.path().join("nope.jpg"));
    let err = processor.process_file(&input, &output, &options).unwrap_err();

    assert!(matches!(err, CompositeError::InputNotFound(ref p) if p.ends_with("nope.jpg")));
    assert!(!output.exists());
    Ok(())
}

#[test]
fn test_undecodable_input() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let input = temp_dir.path().join("product.jpg");
    std::fs::write(&input, b"\xff\xd8 truncated jpeg")?;
    let output = temp_dir.path().join("out/result.png");

    let mut processor = CompositeProcessor::new(mock_config())?;
    let err = processor
        .process_file(&input, &output, &CompositeOptions::new())
        .unwrap_err();

    assert!(matches!(err, CompositeError::Processing(_) | CompositeError::Image(_)));
    assert!(!output.parent().unwrap().exists());
    Ok(())
}

#[test]
fn test_missing_segmentation_program() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let input = write_fixture(temp_dir.path(), "product.png", &product_shot(64, 64));
    let output = temp_dir.path().join("result.png");

    let config = CompositeConfig::builder()
        .backend(BackendType::Command)
        .command(["definitely-not-a-real-segmenter-7f3a", "i"])
        .build()?;
    let mut processor = CompositeProcessor::new(config)?;
    let err = processor
        .process_file(&input, &output, &CompositeOptions::new())
        .unwrap_err();

    match err {
        CompositeError::SegmentationUnavailable(message) => {
            assert!(message.contains("definitely-not-a-real-segmenter-7f3a"));
        },
        other => panic!("expected SegmentationUnavailable, got {other:?}"),
    }
    assert!(!output.exists());
    Ok(())
}

#[cfg(feature = "tract")]
#[test]
fn test_missing_segmentation_model() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let model = temp_dir.path().join("missing-model.onnx");

    let config = CompositeConfig::builder()
        .backend(BackendType::Tract)
        .model_path(&model)
        .build()?;
    let mut processor = CompositeProcessor::new(config)?;
    let err = processor.initialize().unwrap_err();

    match err {
        CompositeError::SegmentationUnavailable(message) => {
            assert!(message.contains("missing-model.onnx"));
        },
        other => panic!("expected SegmentationUnavailable, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_invalid_tuning_rejected() {
    let mut config = CompositeConfig::default();
    config.shadow.squash = 0.0;
    assert!(matches!(
        CompositeProcessor::new(config),
        Err(CompositeError::InvalidConfig(_))
    ));

    let mut config = CompositeConfig::default();
    config.backdrop.shade = (60, 40);
    assert!(config.validate().is_err());
}

#[test]
fn test_malformed_config_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("tuning.json");

    std::fs::write(&path, "{ not json")?;
    assert!(matches!(
        CompositeConfig::from_json_file(&path),
        Err(CompositeError::Serialization(_))
    ));

    std::fs::write(&path, r#"{"placement": {"width_fraction": 1.5}}"#)?;
    assert!(matches!(
        CompositeConfig::from_json_file(&path),
        Err(CompositeError::InvalidConfig(_))
    ));
    Ok(())
}

#[test]
fn test_degenerate_one_pixel_input() -> Result<()> {
    let mut processor = CompositeProcessor::new(mock_config())?;
    let result = processor.composite(product_shot(1, 1), None, None, Some(0))?;
    assert_eq!(result.dimensions(), (1, 1));

    let result = processor.composite(product_shot(3000, 2), None, None, Some(0))?;
    assert_eq!(result.dimensions(), (2200, 1));
    Ok(())
}
