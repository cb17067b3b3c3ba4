//! Status reporting for ingestion progress.
//!
//! [`StatusSink`] decouples the human-readable progress messages emitted by
//! the pipeline from whatever displays them (an upload notification, a
//! terminal spinner, the log, or nothing).

/// Receives human-readable status messages from the ingestion pipeline.
///
/// Messages are fire-and-forget. Implementations must be `Send + Sync` so
/// an ingestion future can move across runtime worker threads.
pub trait StatusSink: Send + Sync {
    /// Reports a single status message (e.g. `"Parsing KML structure..."`).
    fn status(&self, message: &str);
}

impl<F> StatusSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn status(&self, message: &str) {
        self(message);
    }
}

/// A [`StatusSink`] that silently discards every message.
pub struct NullStatus;

impl StatusSink for NullStatus {
    fn status(&self, _message: &str) {}
}

/// A [`StatusSink`] that forwards every message to `log::info!`.
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn status(&self, message: &str) {
        log::info!("{message}");
    }
}
