//! Product composite CLI tool
//!
//! Command-line interface for compositing one product photo onto a synthesized
//! or supplied backdrop using the unified processor.

use super::config::CliConfigBuilder;
use super::progress::create_cli_progress_reporter;
use crate::{
    backends::BackendType,
    processor::CompositeProcessor,
    tracing_config::{init_cli_tracing, spans, TracingFormat},
    types::CompositeResult,
};
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::time::Instant;
use tracing::debug;

/// Composite a product photo onto a skyline or custom backdrop
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(name = "product-composite")]
pub struct Cli {
    /// Input product photo
    #[arg(value_name = "INPUT", required_unless_present = "print_config")]
    pub input: Option<PathBuf>,

    /// Output image; the extension selects the format and parent directories are created
    #[arg(value_name = "OUTPUT", required_unless_present = "print_config")]
    pub output: Option<PathBuf>,

    /// Background image to use instead of the procedural skyline
    #[arg(long = "bg", value_name = "PATH")]
    pub background: Option<PathBuf>,

    /// Output canvas size, e.g. 2000x2000 [default: input size, capped at 2200px]
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    pub size: Option<String>,

    /// Seed for a reproducible skyline
    #[arg(long)]
    pub seed: Option<u64>,

    /// Segmentation backend [default: tract]
    #[arg(short, long, value_enum)]
    pub backend: Option<BackendType>,

    /// ONNX segmentation model for the tract backend
    #[arg(short, long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Program and arguments for the command backend, e.g. "rembg i"
    #[arg(long, value_name = "COMMAND")]
    pub command: Option<String>,

    /// JSON file overriding tuning parameters
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    pub print_config: bool,

    /// Write run metadata (placement, seed, timings) as JSON
    #[arg(long, value_name = "FILE")]
    pub metadata: Option<PathBuf>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only report warnings and errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Log without colors, for CI output
    #[arg(long)]
    pub plain: bool,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.plain {
        TracingFormat::Compact
    } else {
        TracingFormat::Console
    };
    let session_id = if cli.quiet {
        crate::tracing_config::TracingConfig::new()
            .with_env_filter("warn")
            .with_format(format)
            .init()
            .context("Failed to initialize tracing subscriber")?;
        String::new()
    } else {
        init_cli_tracing(cli.verbose, format).context("Failed to initialize tracing subscriber")?
    };

    run(cli, &session_id).await
}

/// Execute one CLI invocation after tracing is installed
pub async fn run(cli: Cli, session_id: &str) -> Result<()> {
    // Argument errors surface before any file is opened
    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let options = CliConfigBuilder::options_from_cli(&cli)?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    if cli.print_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    let (Some(input), Some(output)) = (cli.input.clone(), cli.output.clone()) else {
        anyhow::bail!("INPUT and OUTPUT are required");
    };

    let session = spans::session(session_id, &config.segmentation.backend.to_string());
    info!("Compositing {} -> {}", input.display(), output.display());
    debug!(backend = %config.segmentation.backend, seed = ?options.seed, "Effective options");

    let mut processor =
        CompositeProcessor::new(config).context("Failed to create compositing processor")?;
    processor.set_progress_reporter(create_cli_progress_reporter(cli.quiet, cli.verbose > 0));

    let start_time = Instant::now();
    let result: CompositeResult = {
        let task_input = input.clone();
        let task_output = output.clone();
        tokio::task::spawn_blocking(move || {
            let _session = session.entered();
            let _span = spans::file_processing(&task_input, &task_output).entered();
            processor.process_file(&task_input, &task_output, &options)
        })
        .await
        .context("Compositing task panicked")?
        .with_context(|| format!("Failed to composite {}", input.display()))?
    };

    if let Some(metadata_path) = &cli.metadata {
        result
            .metadata
            .write_json(metadata_path)
            .with_context(|| format!("Failed to write metadata to {}", metadata_path.display()))?;
    }

    let placement = result.placement();
    info!(
        "Wrote {}x{} composite to {} in {:.2}s (subject {}x{} at {},{}{})",
        placement.canvas_width,
        placement.canvas_height,
        output.display(),
        start_time.elapsed().as_secs_f64(),
        placement.subject_width,
        placement.subject_height,
        placement.x,
        placement.y,
        result
            .metadata
            .seed
            .map(|seed| format!(", seed {}", seed))
            .unwrap_or_default()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompositeError;
    use crate::raster::RasterBuffer;
    use crate::services::ImageIOService;
    use std::ffi::OsString;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "product-composite",
            "in.jpg",
            "out/result.png",
            "--bg",
            "street.jpg",
            "--size",
            "2000x2000",
            "--seed",
            "42",
            "--backend",
            "mock",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.input, Some(PathBuf::from("in.jpg")));
        assert_eq!(cli.output, Some(PathBuf::from("out/result.png")));
        assert_eq!(cli.background, Some(PathBuf::from("street.jpg")));
        assert_eq!(cli.size.as_deref(), Some("2000x2000"));
        assert_eq!(cli.seed, Some(42));
        assert_eq!(cli.backend, Some(BackendType::Mock));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_requires_paths() {
        assert!(Cli::try_parse_from(["product-composite", "in.jpg"]).is_err());
        assert!(Cli::try_parse_from(["product-composite", "--print-config"]).is_ok());
        assert!(Cli::try_parse_from(["product-composite", "a", "b", "-v", "--quiet"]).is_err());
    }

    #[tokio::test]
    async fn test_bad_size_rejected_before_input_check() {
        let cli = Cli::try_parse_from([
            "product-composite",
            "/does/not/exist.jpg",
            "out.png",
            "--size",
            "abcx",
        ])
        .unwrap();

        let err = run(cli, "test").await.unwrap_err();
        assert!(matches!(
            err.root_cause().downcast_ref::<CompositeError>(),
            Some(CompositeError::InvalidSizeSpec(_))
        ));
    }

    #[tokio::test]
    async fn test_run_writes_output_and_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("mug.png");
        let output = temp_dir.path().join("nested/mug_composite.png");
        let metadata = temp_dir.path().join("mug.json");

        let mut photo = RasterBuffer::filled(90, 60, [255, 255, 255, 255]);
        photo.fill_rect(30, 15, 59, 44, [20, 120, 60, 255]);
        ImageIOService::save_raster(&photo, &input).unwrap();

        let args: Vec<OsString> = vec![
            "product-composite".into(),
            input.clone().into_os_string(),
            output.clone().into_os_string(),
            "--backend".into(),
            "mock".into(),
            "--seed".into(),
            "11".into(),
            "--quiet".into(),
            "--metadata".into(),
            metadata.clone().into_os_string(),
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        run(cli, "test").await.unwrap();

        let written = ImageIOService::load_raster(&output).unwrap();
        assert_eq!(written.dimensions(), (90, 60));
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&metadata).unwrap()).unwrap();
        assert_eq!(json["seed"], 11);
        assert_eq!(json["backend"], "mock");
        assert_eq!(json["backdrop"], "procedural");
    }
}
