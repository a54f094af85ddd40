//! Configuration conversion utilities for CLI arguments

use crate::backends::BackendType;
use crate::cli::main_impl::Cli;
use crate::config::{CompositeConfig, CompositeConfigBuilder, CompositeOptions, OutputSize};
use anyhow::{Context, Result};

/// Convert CLI arguments to the library's configuration types
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the effective `CompositeConfig`
    ///
    /// Precedence: defaults, then the `--config` file, then explicit flags.
    pub(crate) fn from_cli(cli: &Cli) -> Result<CompositeConfig> {
        let base = match &cli.config {
            Some(path) => CompositeConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => CompositeConfig::default(),
        };

        let mut builder = CompositeConfigBuilder::from_config(base);
        if let Some(backend) = cli.backend {
            builder = builder.backend(backend);
        }
        if let Some(model) = &cli.model {
            builder = builder.model_path(model.clone());
        }
        if let Some(command) = &cli.command {
            builder = builder.command(command.split_whitespace());
        }

        builder.build().context("Invalid configuration")
    }

    /// Per-run options; the size string is parsed here, before any image I/O
    pub(crate) fn options_from_cli(cli: &Cli) -> Result<CompositeOptions> {
        let mut options = CompositeOptions::new();
        if let Some(size) = &cli.size {
            options = options.with_size(OutputSize::parse(size)?);
        }
        if let Some(background) = &cli.background {
            options = options.with_background(background.clone());
        }
        if let Some(seed) = cli.seed {
            options = options.with_seed(seed);
        }
        Ok(options)
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if let Some(size) = &cli.size {
            OutputSize::parse(size)?;
        }

        if let Some(command) = &cli.command {
            if command.split_whitespace().next().is_none() {
                anyhow::bail!("--command must name a program");
            }
        }

        if cli.model.is_some() && cli.backend.is_some_and(|b| b != BackendType::Tract) {
            log::warn!("--model only applies to the tract backend and will be ignored");
        }

        Ok(())
    }
}
