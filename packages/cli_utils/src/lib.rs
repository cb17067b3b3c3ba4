#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for the carbon map toolchain.
//!
//! Provides an `indicatif` spinner behind the ingestion [`StatusSink`]
//! trait, plus [`init_logger`] which sets up `indicatif-log-bridge` so that
//! `log::info!` and friends are suspended while the spinner redraws.

use std::time::Duration;

use carbon_map_ingest::status::StatusSink;
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

/// An `indicatif` spinner that shows the latest ingestion status message.
pub struct IndicatifStatus {
    bar: ProgressBar,
}

impl IndicatifStatus {
    /// Creates a spinner attached to `multi`, initially showing `message`.
    #[must_use]
    pub fn spinner(multi: &MultiProgress, message: &str) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());

        Self { bar }
    }

    /// Stops the spinner and leaves `message` on screen.
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Stops the spinner and removes it.
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl StatusSink for IndicatifStatus {
    fn status(&self, message: &str) {
        log::debug!("{message}");
        self.bar.set_message(message.to_string());
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge` so that
/// `log::info!` and friends are suspended while progress bars redraw.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // Already set in tests

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spinner_tracks_latest_status() {
        let multi = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        let status = IndicatifStatus::spinner(&multi, "Starting...");

        status.status("Parsing KML structure...");
        assert_eq!(status.bar.message(), "Parsing KML structure...");

        status.finish("Done");
        assert!(status.bar.is_finished());
        assert_eq!(status.bar.message(), "Done");
    }
}
