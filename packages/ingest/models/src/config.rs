//! Tunables for the ingestion pipeline.
//!
//! Every field has a default matching the upload control's behaviour, so
//! an empty TOML document (or no config at all) yields the stock limits.

use serde::{Deserialize, Serialize};

/// Upload size ceiling: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Emit a progress message every this many features.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 100;

/// Widest plausible feature, in degrees of longitude.
pub const DEFAULT_MAX_LNG_SPAN: f64 = 180.0;

/// Tallest plausible feature, in degrees of latitude.
pub const DEFAULT_MAX_LAT_SPAN: f64 = 90.0;

/// Configuration for a single ingestion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct IngestConfig {
    /// Largest accepted upload, in bytes (inclusive).
    pub max_file_size: u64,
    /// Features between progress messages during normalization.
    pub progress_interval: usize,
    /// Features spanning more longitude than this are rejected.
    pub max_lng_span: f64,
    /// Features spanning more latitude than this are rejected.
    pub max_lat_span: f64,
    /// Use a shapefile's `.prj` to force Web Mercator unprojection when it
    /// declares EPSG:3857. When off, only coordinate bounds are inspected.
    pub honor_prj: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            max_lng_span: DEFAULT_MAX_LNG_SPAN,
            max_lat_span: DEFAULT_MAX_LAT_SPAN,
            honor_prj: true,
        }
    }
}

impl IngestConfig {
    /// The size ceiling expressed in megabytes, as shown to users.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn max_file_size_mb(&self) -> f64 {
        self.max_file_size as f64 / 1024.0 / 1024.0
    }
}
