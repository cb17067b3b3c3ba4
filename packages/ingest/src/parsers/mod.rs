//! Format parsers: raw upload bytes to loosely-typed `GeoJSON`.
//!
//! Each parser turns its container into a [`ParsedDocument`] and reports
//! progress through a [`StatusSink`]. Coordinates come out exactly as they
//! were stored; projection and axis order are fixed later by
//! [`crate::normalize`].

pub mod archive;
pub mod json;
pub mod kml;
pub mod kmz;
pub mod shapefile;
pub mod xml;

use carbon_map_ingest_models::{FileFormat, IngestConfig, ProjectionHint, RawFile};
use geojson::Feature;

use crate::{IngestError, status::StatusSink};

/// Parser output before structural normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawGeoJson {
    /// A `FeatureCollection`, features in document order.
    FeatureCollection(Vec<Feature>),
    /// A lone `Feature`, treated as a one-element collection.
    Feature(Box<Feature>),
}

impl RawGeoJson {
    /// Flattens either shape into an ordered feature list.
    #[must_use]
    pub fn into_features(self) -> Vec<Feature> {
        match self {
            Self::FeatureCollection(features) => features,
            Self::Feature(feature) => vec![*feature],
        }
    }

    /// Number of top-level features.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::FeatureCollection(features) => features.len(),
            Self::Feature(_) => 1,
        }
    }

    /// Whether there are no features at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A parsed upload plus whatever its container said about projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub content: RawGeoJson,
    /// Only shapefiles (via `.prj`) ever declare anything; every other
    /// format reports [`ProjectionHint::Unknown`].
    pub declared_projection: ProjectionHint,
}

impl ParsedDocument {
    /// A document with no projection metadata.
    #[must_use]
    pub const fn undeclared(content: RawGeoJson) -> Self {
        Self {
            content,
            declared_projection: ProjectionHint::Unknown,
        }
    }
}

/// Runs the parser for `format` over `raw`.
///
/// # Errors
///
/// * If the container cannot be decoded
/// * If an archive lacks the entry the format needs
/// * If a KML document yields nothing convertible
pub fn parse(
    format: FileFormat,
    raw: &RawFile,
    config: &IngestConfig,
    status: &dyn StatusSink,
) -> Result<ParsedDocument, IngestError> {
    match format {
        FileFormat::GeoJson => json::parse(&raw.bytes, status),
        FileFormat::Kml => kml::parse(&raw.bytes, status),
        FileFormat::Kmz => kmz::parse(&raw.bytes, status),
        FileFormat::Shapefile => shapefile::parse(&raw.bytes, config, status),
    }
}

/// Decodes text content, dropping a leading UTF-8 byte-order mark.
pub(crate) fn decode_utf8(bytes: &[u8], format: FileFormat) -> Result<&str, IngestError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    std::str::from_utf8(bytes).map_err(|e| IngestError::Parse {
        format,
        message: format!("content is not valid UTF-8 ({e})"),
    })
}
