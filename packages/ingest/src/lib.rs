#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Upload ingestion: turns a user-supplied GIS file into a canonical WGS84
//! `GeoJSON` layer.
//!
//! [`ingest`] validates the upload, dispatches to the matching format
//! parser, flattens `GeometryCollection` features, then normalizes and
//! validates every feature independently. Features that fail are dropped;
//! the upload only fails as a whole when the container itself is unusable
//! or nothing survives. Every stage reports a human-readable message
//! through a [`StatusSink`].

pub mod config;
pub mod normalize;
pub mod parsers;
pub mod status;
pub mod structure;
pub mod validate;

use std::path::Path;

use carbon_map_ingest_models::{
    FileFormat, IngestConfig, IngestErrorKind, IngestFailure, IngestedLayer, RawFile,
};
use geojson::FeatureCollection;

use crate::{parsers::ParsedDocument, status::StatusSink, validate::FeatureValidator};

/// Outcome of one ingestion call.
pub type IngestionResult = Result<IngestedLayer, IngestError>;

/// Terminal ingestion failures. Display strings are meant for users.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The extension is not one of the accepted upload extensions.
    #[error(
        "Unsupported file format. Accepted formats: {}",
        FileFormat::accepted_formats_label()
    )]
    UnsupportedFormat { file_name: String },

    /// The upload is larger than the configured ceiling.
    #[error("File size exceeds the maximum limit of {max_mb}MB")]
    FileTooLarge { size: u64, max_mb: f64 },

    /// The container could not be decoded.
    #[error("Invalid {format} file: {message}")]
    Parse { format: FileFormat, message: String },

    /// An archive lacks the entry its format requires.
    #[error("{message}")]
    NotFound { message: String },

    /// The container decoded but yielded no features.
    #[error("Could not convert {format} to GeoJSON")]
    Conversion { format: FileFormat },

    /// Every feature was dropped.
    #[error("No valid features found in {file_name}")]
    NoValidFeatures { file_name: String },

    /// The file could not be read from disk.
    #[error("Could not read {file_name}: {source}")]
    Read {
        file_name: String,
        source: std::io::Error,
    },
}

impl IngestError {
    /// Classification of this failure.
    #[must_use]
    pub const fn kind(&self) -> IngestErrorKind {
        match self {
            Self::UnsupportedFormat { .. } => IngestErrorKind::UnsupportedFormat,
            Self::FileTooLarge { .. } => IngestErrorKind::FileTooLarge,
            Self::Parse { .. } => IngestErrorKind::ParseError,
            Self::NotFound { .. } => IngestErrorKind::NotFound,
            Self::Conversion { .. } => IngestErrorKind::ConversionError,
            Self::NoValidFeatures { .. } => IngestErrorKind::NoValidFeatures,
            Self::Read { .. } => IngestErrorKind::ReadError,
        }
    }

    /// Serializable view for callers that hand failures to a UI.
    #[must_use]
    pub fn to_failure(&self) -> IngestFailure {
        IngestFailure {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Checks an upload's name and size before any bytes are decoded.
///
/// A file of exactly `config.max_file_size` bytes is accepted.
///
/// # Errors
///
/// * If the extension is not an accepted upload extension
/// * If `size` exceeds `config.max_file_size`
pub fn validate_file(
    file_name: &str,
    size: u64,
    config: &IngestConfig,
) -> Result<FileFormat, IngestError> {
    let format =
        FileFormat::from_file_name(file_name).ok_or_else(|| IngestError::UnsupportedFormat {
            file_name: file_name.to_string(),
        })?;

    if size > config.max_file_size {
        return Err(IngestError::FileTooLarge {
            size,
            max_mb: config.max_file_size_mb(),
        });
    }

    Ok(format)
}

/// Ingests an in-memory upload.
///
/// On failure the error message is also sent to `status` as the final
/// message.
///
/// # Errors
///
/// * If the upload fails [`validate_file`]
/// * If its container cannot be parsed or lacks a required entry
/// * If no feature survives normalization and validation
pub async fn ingest(
    raw: &RawFile,
    config: &IngestConfig,
    status: &dyn StatusSink,
) -> IngestionResult {
    run(raw, config, status)
        .await
        .map_err(|e| report_failure(&raw.name, e, status))
}

/// Reads `path` from disk and ingests it.
///
/// Extension and on-disk size are checked before the file is read.
///
/// # Errors
///
/// * If the file cannot be inspected or read
/// * If ingestion fails (see [`ingest`])
pub async fn ingest_path(
    path: &Path,
    config: &IngestConfig,
    status: &dyn StatusSink,
) -> IngestionResult {
    let file_name = path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    );

    let raw = match read_upload(path, &file_name, config).await {
        Ok(raw) => raw,
        Err(e) => return Err(report_failure(&file_name, e, status)),
    };

    ingest(&raw, config, status).await
}

async fn read_upload(
    path: &Path,
    file_name: &str,
    config: &IngestConfig,
) -> Result<RawFile, IngestError> {
    let read_error = |source| IngestError::Read {
        file_name: file_name.to_string(),
        source,
    };

    let metadata = tokio::fs::metadata(path).await.map_err(read_error)?;
    validate_file(file_name, metadata.len(), config)?;

    let bytes = tokio::fs::read(path).await.map_err(read_error)?;
    log::debug!("Read {} bytes from {}", bytes.len(), path.display());

    Ok(RawFile::new(file_name, bytes))
}

fn report_failure(file_name: &str, error: IngestError, status: &dyn StatusSink) -> IngestError {
    log::warn!("Failed to ingest {file_name}: {error}");
    status.status(&error.to_string());
    error
}

async fn run(raw: &RawFile, config: &IngestConfig, status: &dyn StatusSink) -> IngestionResult {
    let format = validate_file(&raw.name, raw.size(), config)?;

    match format {
        FileFormat::Shapefile => status.status("Extracting Shapefile..."),
        other => status.status(&format!("Processing {other} file...")),
    }

    let ParsedDocument {
        content,
        declared_projection,
    } = parsers::parse(format, raw, config, status)?;
    tokio::task::yield_now().await;

    let features = structure::flatten_geometry_collections(content.into_features());
    let input_features = features.len();
    let features = structure::drop_empty_geometries(features);
    let empty_features = input_features - features.len();

    status.status("Processing features...");
    let validator = FeatureValidator::from(config);
    let interval = config.progress_interval.max(1);
    let total = features.len();
    let mut valid = Vec::with_capacity(total);

    for (index, feature) in features.into_iter().enumerate() {
        match normalize::normalize_feature(feature, declared_projection) {
            Some(normalized) if validator.is_reasonable(&normalized) => valid.push(normalized),
            Some(_) => log::debug!("Dropping feature {index}: implausible extent"),
            None => log::debug!("Dropping feature {index}: coordinates could not be normalized"),
        }

        let processed = index + 1;
        if processed.is_multiple_of(interval) || processed == total {
            status.status(&format!("Processed {processed} of {total} features..."));
            tokio::task::yield_now().await;
        }
    }

    let dropped_features = input_features - valid.len();
    if dropped_features > 0 {
        log::warn!(
            "Dropped {dropped_features} of {input_features} features from {} ({empty_features} without coordinates)",
            raw.name
        );
    }

    let Some(bounds) = validate::collection_bounds(&valid) else {
        return Err(IngestError::NoValidFeatures {
            file_name: raw.name.clone(),
        });
    };

    status.status(&format!("Successfully processed {} features", valid.len()));
    log::info!(
        "Ingested {} as {format}: {} features, bounds {:?}",
        raw.name,
        valid.len(),
        bounds.as_array()
    );

    Ok(IngestedLayer {
        file_name: raw.name.clone(),
        format,
        collection: FeatureCollection {
            bbox: None,
            features: valid,
            foreign_members: None,
        },
        bounds,
        input_features,
        dropped_features,
    })
}
