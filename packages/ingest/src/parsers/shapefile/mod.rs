//! Zipped ESRI shapefile parser.
//!
//! The archive must hold a `.shp`; the `.dbf` attribute table and `.prj`
//! projection are optional. Companion files are matched to the `.shp` by
//! base name first and fall back to the first entry with the right
//! extension.

pub mod dbf;
pub mod prj;
pub mod shp;

use carbon_map_ingest_models::{FileFormat, IngestConfig, ProjectionHint};
use geojson::{Feature, Geometry};

use super::{
    ParsedDocument, RawGeoJson,
    archive::{self, ArchiveEntry, MemoryArchive},
};
use crate::{IngestError, status::StatusSink};

/// Errors from decoding a zipped shapefile.
#[derive(Debug, thiserror::Error)]
pub enum ShapefileError {
    /// The archive has no `.shp` entry.
    #[error("No shapefile (.shp) found in the zip archive")]
    MissingShp,

    /// Zip error.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `.shp` shorter than its fixed header.
    #[error("shapefile header is truncated")]
    TruncatedHeader,

    /// `.shp` does not start with the shapefile magic number.
    #[error("not a shapefile (file code {0})")]
    FileCode(i32),

    /// A record's declared length runs past the end of the file.
    #[error("record {record} is truncated")]
    TruncatedRecord { record: i32 },

    /// A record body could not be decoded.
    #[error("record {record}: {source}")]
    Record {
        record: i32,
        source: std::io::Error,
    },

    /// `.dbf` table error.
    #[error("invalid attribute table: {0}")]
    Dbf(String),
}

impl From<ShapefileError> for IngestError {
    fn from(error: ShapefileError) -> Self {
        match error {
            missing @ ShapefileError::MissingShp => Self::NotFound {
                message: missing.to_string(),
            },
            other => Self::Parse {
                format: FileFormat::Shapefile,
                message: other.to_string(),
            },
        }
    }
}

/// Decodes a zipped shapefile into one feature per `.shp` record.
///
/// # Errors
///
/// * If the bytes are not a readable zip archive
/// * If the archive has no `.shp` entry
/// * If the `.shp` or `.dbf` cannot be decoded
pub fn parse(
    bytes: &[u8],
    config: &IngestConfig,
    status: &dyn StatusSink,
) -> Result<ParsedDocument, IngestError> {
    read_archive(bytes, config, status).map_err(IngestError::from)
}

fn read_archive(
    bytes: &[u8],
    config: &IngestConfig,
    status: &dyn StatusSink,
) -> Result<ParsedDocument, ShapefileError> {
    status.status("Reading zip file...");
    let mut zip = archive::open(bytes)?;
    let entries = archive::list_entries(&mut zip);

    let shp_entry = entries
        .iter()
        .find(|e| e.has_extension(".shp"))
        .ok_or(ShapefileError::MissingShp)?;
    let stem = shp_entry.stem();
    let dbf_entry = companion(&entries, &stem, ".dbf");
    let prj_entry = companion(&entries, &stem, ".prj");

    status.status("Processing shapefile...");
    let shapes = shp::read_shapes(&archive::read_entry(&mut zip, shp_entry)?)?;

    let records = match dbf_entry {
        Some(entry) => dbf::read_records(&archive::read_entry(&mut zip, entry)?)?,
        None => Vec::new(),
    };
    if dbf_entry.is_some() && records.len() != shapes.len() {
        log::warn!(
            "{} has {} shapes but {} attribute records",
            shp_entry.name,
            shapes.len(),
            records.len()
        );
    }

    let declared_projection = match prj_entry {
        Some(entry) if config.honor_prj => read_projection(&mut zip, entry)?,
        _ => ProjectionHint::Unknown,
    };

    log::info!(
        "Decoded {} shapes from {} (declared projection {declared_projection})",
        shapes.len(),
        shp_entry.name
    );

    let mut records = records.into_iter();
    let features = shapes
        .into_iter()
        .map(|shape| Feature {
            bbox: None,
            geometry: shape.map(Geometry::new),
            id: None,
            properties: Some(records.next().unwrap_or_default()),
            foreign_members: None,
        })
        .collect();

    Ok(ParsedDocument {
        content: RawGeoJson::FeatureCollection(features),
        declared_projection,
    })
}

fn read_projection(
    zip: &mut MemoryArchive<'_>,
    entry: &ArchiveEntry,
) -> Result<ProjectionHint, ShapefileError> {
    let contents = archive::read_entry(zip, entry)?;
    Ok(prj::projection_from_wkt(&String::from_utf8_lossy(
        &contents,
    )))
}

/// The entry with `extension` sharing the `.shp`'s base name, else the
/// first entry with that extension.
fn companion<'a>(
    entries: &'a [ArchiveEntry],
    stem: &str,
    extension: &str,
) -> Option<&'a ArchiveEntry> {
    let mut candidates = entries.iter().filter(|e| e.has_extension(extension));
    let first = candidates.clone().next();
    candidates.find(|e| e.stem() == stem).or(first)
}
