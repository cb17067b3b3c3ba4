//! `GeoJSON` parser.
//!
//! Coordinates are trusted to be `[lng, lat]` here; normalization
//! re-checks them afterwards anyway.

use carbon_map_ingest_models::FileFormat;
use geojson::Feature;
use serde::Deserialize as _;
use serde_json::Value;

use super::{ParsedDocument, RawGeoJson, decode_utf8};
use crate::{IngestError, status::StatusSink};

/// Parses `GeoJSON` bytes into a feature collection or single feature.
///
/// # Errors
///
/// * If the bytes are not UTF-8 or not JSON
/// * If the top-level object lacks `type`, or has neither `features`
///   nor `geometry`
pub fn parse(bytes: &[u8], status: &dyn StatusSink) -> Result<ParsedDocument, IngestError> {
    status.status("Reading GeoJSON content...");
    let text = decode_utf8(bytes, FileFormat::GeoJson)?;

    status.status("Parsing GeoJSON structure...");
    let document: Value = serde_json::from_str(text).map_err(|e| parse_error(e.to_string()))?;
    let content = to_raw_geojson(document)?;

    status.status("Validating GeoJSON features...");
    log::debug!("Parsed {} top-level GeoJSON features", content.len());

    Ok(ParsedDocument::undeclared(content))
}

fn parse_error(message: impl Into<String>) -> IngestError {
    IngestError::Parse {
        format: FileFormat::GeoJson,
        message: message.into(),
    }
}

fn to_raw_geojson(document: Value) -> Result<RawGeoJson, IngestError> {
    let Value::Object(mut object) = document else {
        return Err(parse_error("top-level value is not an object"));
    };

    if !object.contains_key("type") {
        return Err(parse_error("missing \"type\" member"));
    }

    if let Some(features) = object.remove("features") {
        let Value::Array(features) = features else {
            return Err(parse_error("\"features\" is not an array"));
        };
        return Ok(RawGeoJson::FeatureCollection(
            features.into_iter().map(decode_member).collect(),
        ));
    }

    if object.contains_key("geometry") {
        let feature = Feature::deserialize(&Value::Object(object))
            .map_err(|e| parse_error(e.to_string()))?;
        return Ok(RawGeoJson::Feature(Box::new(feature)));
    }

    Err(parse_error("missing \"features\" or \"geometry\" member"))
}

/// Decodes one collection member. Members that are not valid features
/// become geometry-less features carrying whatever properties they had,
/// so the empty-geometry filter drops them individually.
fn decode_member(value: Value) -> Feature {
    match Feature::deserialize(&value) {
        Ok(feature) => feature,
        Err(e) => {
            log::debug!("Keeping undecodable GeoJSON feature without geometry: {e}");
            let properties = value
                .get("properties")
                .and_then(Value::as_object)
                .cloned();
            Feature {
                bbox: None,
                geometry: None,
                id: None,
                properties,
                foreign_members: None,
            }
        }
    }
}
