//! KMZ parser: the first `.kml` entry of a zip archive.

use carbon_map_ingest_models::FileFormat;

use super::{ParsedDocument, archive, decode_utf8, kml};
use crate::{IngestError, status::StatusSink};

/// Extracts and converts the first KML document in a KMZ archive.
///
/// # Errors
///
/// * If the bytes are not a readable zip archive
/// * If the archive holds no `.kml` entry
/// * If the KML document fails to parse or convert
pub fn parse(bytes: &[u8], status: &dyn StatusSink) -> Result<ParsedDocument, IngestError> {
    status.status("Reading KMZ file...");
    let mut zip = archive::open(bytes).map_err(|e| parse_error(&e))?;

    let Some(entry) = archive::list_entries(&mut zip)
        .into_iter()
        .find(|entry| entry.has_extension(".kml"))
    else {
        return Err(IngestError::NotFound {
            message: "No KML file found in KMZ archive".to_string(),
        });
    };

    status.status("Extracting KML from KMZ...");
    log::debug!("Using {} from KMZ archive", entry.name);
    let contents = archive::read_entry(&mut zip, &entry).map_err(|e| parse_error(&e))?;
    let text = decode_utf8(&contents, FileFormat::Kmz)?;

    kml::convert_text(text, FileFormat::Kmz, status)
}

fn parse_error(error: &zip::result::ZipError) -> IngestError {
    IngestError::Parse {
        format: FileFormat::Kmz,
        message: error.to_string(),
    }
}
