//! Terminal progress display for the CLI

use crate::services::{
    ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressUpdate,
};
use crate::types::CompositeTimings;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter drawing a single `indicatif` bar over the stages
pub(crate) struct SpinnerProgressReporter {
    bar: ProgressBar,
}

impl SpinnerProgressReporter {
    pub(crate) fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }
}

impl ProgressReporter for SpinnerProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.bar.set_position(u64::from(update.progress));
        self.bar.set_message(update.description);
    }

    fn report_completion(&self, timings: &CompositeTimings) {
        self.bar
            .finish_with_message(format!("Done in {}ms", timings.total_ms));
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.bar
            .abandon_with_message(format!("Failed while {}: {}", stage.description().to_lowercase(), error));
    }
}

/// Pick the reporter matching the requested output style
///
/// Verbose runs log each stage instead of drawing a bar, so the bar never
/// fights with log lines for the terminal.
pub(crate) fn create_cli_progress_reporter(quiet: bool, verbose: bool) -> Box<dyn ProgressReporter> {
    if quiet {
        Box::new(NoOpProgressReporter)
    } else if verbose {
        Box::new(ConsoleProgressReporter::new(true))
    } else {
        Box::new(SpinnerProgressReporter::new())
    }
}
