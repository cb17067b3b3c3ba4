#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Upload ingestion configuration, file and result types.
//!
//! These types describe a user-supplied overlay file on its way into the
//! map: the raw upload, the format it was recognised as, and the canonical
//! `GeoJSON` layer (or classified failure) that comes out the other end.
//! They carry no behaviour beyond small helpers so that both the ingestion
//! core and its callers (CLI, map layer) can share them.

pub mod config;

use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use config::IngestConfig;

/// Extensions accepted for upload, in the order they are advertised.
pub const ACCEPTED_EXTENSIONS: &[&str] = &[".geojson", ".json", ".kml", ".kmz", ".zip"];

/// An uploaded file: the declared file name plus its raw bytes.
///
/// Created per upload and dropped once the ingestion result is handed off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    /// File name as declared by the picker or drop event (e.g. `"parcels.zip"`).
    pub name: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl RawFile {
    /// Creates a new raw upload.
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Size of the upload in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Lowercased extension of `name` including the leading dot.
///
/// Returns `None` when the name has no dot at all.
#[must_use]
pub fn file_extension(name: &str) -> Option<String> {
    name.rfind('.').map(|idx| name[idx..].to_ascii_lowercase())
}

/// The upload formats the ingestion pipeline understands.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileFormat {
    /// `GeoJSON` text (`.geojson` / `.json`).
    #[strum(serialize = "GeoJSON")]
    GeoJson,
    /// Keyhole Markup Language (`.kml`).
    #[strum(serialize = "KML")]
    Kml,
    /// Zipped KML (`.kmz`).
    #[strum(serialize = "KMZ")]
    Kmz,
    /// Zipped ESRI shapefile set (`.zip` holding `.shp`/`.dbf`/`.prj`).
    #[strum(serialize = "Shapefile")]
    Shapefile,
}

impl FileFormat {
    /// Every supported format, in advertised order.
    pub const ALL: &[Self] = &[Self::GeoJson, Self::Kml, Self::Kmz, Self::Shapefile];

    /// Maps a lowercased, dotted extension to its format.
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            ".geojson" | ".json" => Some(Self::GeoJson),
            ".kml" => Some(Self::Kml),
            ".kmz" => Some(Self::Kmz),
            ".zip" => Some(Self::Shapefile),
            _ => None,
        }
    }

    /// Detects the format from a file name's extension (case-insensitive).
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        file_extension(name).and_then(|ext| Self::from_extension(&ext))
    }

    /// Name used in user-facing messages.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::GeoJson => "GeoJSON",
            Self::Kml => "KML",
            Self::Kmz => "KMZ",
            Self::Shapefile => "Shapefile",
        }
    }

    /// Extensions that map to this format.
    #[must_use]
    pub const fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::GeoJson => &[".geojson", ".json"],
            Self::Kml => &[".kml"],
            Self::Kmz => &[".kmz"],
            Self::Shapefile => &[".zip"],
        }
    }

    /// Comma-separated display names of every accepted format.
    #[must_use]
    pub fn accepted_formats_label() -> String {
        Self::ALL
            .iter()
            .map(|f| f.display_name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Coordinate reference system a coordinate block appears to be in.
///
/// Derived per feature (or declared per file by a `.prj`), never stored.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectionHint {
    /// Longitude/latitude degrees; coordinates are used as given.
    Wgs84,
    /// EPSG:3857 meters; coordinates are unprojected to WGS84.
    WebMercator,
    /// Nothing known; per-coordinate heuristics decide.
    #[default]
    Unknown,
}

/// An axis-aligned longitude/latitude bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    /// Western edge.
    pub min_lng: f64,
    /// Southern edge.
    pub min_lat: f64,
    /// Eastern edge.
    pub max_lng: f64,
    /// Northern edge.
    pub max_lat: f64,
}

impl Bounds {
    /// A degenerate box around a single `[lng, lat]` pair.
    #[must_use]
    pub const fn from_point(lng: f64, lat: f64) -> Self {
        Self {
            min_lng: lng,
            min_lat: lat,
            max_lng: lng,
            max_lat: lat,
        }
    }

    /// Grows the box to include `[lng, lat]`.
    pub fn extend_point(&mut self, lng: f64, lat: f64) {
        self.min_lng = self.min_lng.min(lng);
        self.min_lat = self.min_lat.min(lat);
        self.max_lng = self.max_lng.max(lng);
        self.max_lat = self.max_lat.max(lat);
    }

    /// Smallest box containing both `self` and `other`.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            min_lng: self.min_lng.min(other.min_lng),
            min_lat: self.min_lat.min(other.min_lat),
            max_lng: self.max_lng.max(other.max_lng),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }

    /// Longitude extent in degrees.
    #[must_use]
    pub fn lng_span(&self) -> f64 {
        self.max_lng - self.min_lng
    }

    /// Latitude extent in degrees.
    #[must_use]
    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Whether every edge lies inside the WGS84 range.
    #[must_use]
    pub fn is_within_wgs84(&self) -> bool {
        self.min_lng >= -180.0
            && self.max_lng <= 180.0
            && self.min_lat >= -90.0
            && self.max_lat <= 90.0
    }

    /// `[[west, south], [east, north]]`, the shape map `fitBounds` calls take.
    #[must_use]
    pub const fn as_array(&self) -> [[f64; 2]; 2] {
        [[self.min_lng, self.min_lat], [self.max_lng, self.max_lat]]
    }
}

/// Classification of a terminal ingestion failure.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestErrorKind {
    /// Extension is not one of [`ACCEPTED_EXTENSIONS`].
    UnsupportedFormat,
    /// Upload exceeds the configured size ceiling.
    FileTooLarge,
    /// Container could not be decoded (bad JSON, bad XML, corrupt zip).
    ParseError,
    /// An expected entry is missing from an archive.
    NotFound,
    /// Container parsed but yielded nothing convertible.
    ConversionError,
    /// Every feature failed coordinate normalization or validation.
    NoValidFeatures,
    /// The file could not be read from disk.
    ReadError,
}

/// Serializable view of a failed ingestion, ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestFailure {
    /// What went wrong.
    pub kind: IngestErrorKind,
    /// Human-readable message suitable for direct display.
    pub message: String,
}

/// A successfully ingested upload, ready for the map layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestedLayer {
    /// Original file name, for display.
    pub file_name: String,
    /// Format the upload was parsed as.
    pub format: FileFormat,
    /// Canonical features: non-empty, WGS84 `[lng, lat]`, no
    /// `GeometryCollection` members.
    pub collection: FeatureCollection,
    /// Extent of all surviving features.
    pub bounds: Bounds,
    /// Features seen after structural flattening.
    pub input_features: usize,
    /// Features dropped by the empty-geometry filter or validation.
    pub dropped_features: usize,
}

impl IngestedLayer {
    /// Number of canonical features in the layer.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.collection.features.len()
    }
}
