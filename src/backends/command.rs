//! External-program segmentation backend
//!
//! Writes the input as PNG to the program's stdin and reads the cut-out image
//! from its stdout. The default program is `rembg i`, which accepts `-` style
//! piping when no file arguments are given.

use super::{SegmentationBackend, SegmentationOutput};
use crate::error::{CompositeError, Result};
use image::{ImageFormat, RgbaImage};
use log::{debug, warn};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Backend that shells out to a segmentation program
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
}

impl CommandBackend {
    /// Create a backend for `program` with fixed arguments
    pub fn new<S: Into<String>>(program: S, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Create a backend from a program-plus-arguments list
    ///
    /// # Errors
    /// `InvalidConfig` when the list is empty.
    pub fn from_command(command: &[String]) -> Result<Self> {
        let (program, args) = command.split_first().ok_or_else(|| {
            CompositeError::invalid_config("Command backend needs a program to run")
        })?;
        Ok(Self::new(program.clone(), args.to_vec()))
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Resolve the program the way the shell would
    fn locate(&self) -> Option<PathBuf> {
        let program = Path::new(&self.program);
        if program.components().count() > 1 {
            return program.is_file().then(|| program.to_path_buf());
        }
        let paths = std::env::var_os("PATH")?;
        std::env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|candidate| candidate.is_file())
    }

    fn unavailable(&self, detail: &str) -> CompositeError {
        CompositeError::segmentation_unavailable(format!(
            "the '{}' program {}; install it (e.g. `pip install \"rembg[cli]\"`) or pick another backend",
            self.program, detail
        ))
    }

    fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }
}

impl SegmentationBackend for CommandBackend {
    fn name(&self) -> &str {
        "command"
    }

    fn ensure_available(&mut self) -> Result<()> {
        match self.locate() {
            Some(path) => {
                debug!("Segmentation program resolved to {}", path.display());
                Ok(())
            },
            None => Err(self.unavailable("was not found on PATH")),
        }
    }

    fn segment(&mut self, image: &RgbaImage) -> Result<SegmentationOutput> {
        let input = Self::encode_png(image)?;
        debug!(
            "Running '{} {}' with {} bytes of PNG input",
            self.program,
            self.args.join(" "),
            input.len()
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.unavailable(&format!("could not be started ({e})")))?;

        // Feed stdin from a separate thread so a chatty child cannot deadlock on a full pipe
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CompositeError::segmentation("child stdin was not captured"))?;
        let writer = std::thread::spawn(move || stdin.write_all(&input));

        let output = child.wait_with_output().map_err(|e| {
            CompositeError::segmentation(format!("waiting for '{}' failed: {e}", self.program))
        })?;

        match writer.join() {
            Ok(Ok(())) => {},
            Ok(Err(e)) => warn!("Segmentation program closed stdin early: {e}"),
            Err(_) => warn!("Segmentation stdin writer panicked"),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.lines().last().unwrap_or("no diagnostic output");
            return Err(CompositeError::segmentation(format!(
                "'{}' exited with {}: {}",
                self.program, output.status, detail
            )));
        }

        Ok(SegmentationOutput::Encoded(output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_command() {
        let backend =
            CommandBackend::from_command(&["rembg".to_string(), "i".to_string()]).unwrap();
        assert_eq!(backend.program(), "rembg");
        assert_eq!(backend.args, vec!["i"]);
        assert!(CommandBackend::from_command(&[]).is_err());
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let mut backend = CommandBackend::new("definitely-not-a-segmenter-3f9a", Vec::new());
        let err = backend.ensure_available().unwrap_err();
        assert!(matches!(err, CompositeError::SegmentationUnavailable(_)));
        assert!(err.to_string().contains("definitely-not-a-segmenter-3f9a"));

        let image = RgbaImage::new(2, 2);
        let err = backend.segment(&image).unwrap_err();
        assert!(matches!(err, CompositeError::SegmentationUnavailable(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_passthrough_program() {
        // `cat` echoes the PNG back, which normalizes to the unchanged input
        let mut backend = CommandBackend::new("cat", Vec::new());
        backend.ensure_available().unwrap();
        let image = RgbaImage::from_pixel(4, 3, image::Rgba([5, 6, 7, 255]));
        let output = backend.segment(&image).unwrap();
        assert_eq!(output.normalize((4, 3)).unwrap(), image);
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_program_reports_segmentation_error() {
        let mut backend = CommandBackend::new("false", Vec::new());
        let err = backend.segment(&RgbaImage::new(1, 1)).unwrap_err();
        assert!(matches!(err, CompositeError::Segmentation(_)));
    }
}
