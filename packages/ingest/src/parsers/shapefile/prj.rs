//! `.prj` (ESRI WKT) projection sniffing.
//!
//! Only two systems matter for display: plain WGS84 degrees and Web
//! Mercator meters. Everything else is reported as unknown and left to
//! coordinate-bounds detection.

use carbon_map_ingest_models::ProjectionHint;

/// Names and authority codes that identify EPSG:3857 and its aliases.
const WEB_MERCATOR_MARKERS: &[&str] = &[
    "WEB_MERCATOR",
    "WEB MERCATOR",
    "PSEUDO_MERCATOR",
    "PSEUDO-MERCATOR",
    "MERCATOR_AUXILIARY_SPHERE",
    "POPULAR VISUALISATION",
    "\"3857\"",
    "\"900913\"",
    "\"102100\"",
    "\"102113\"",
];

const WGS84_MARKERS: &[&str] = &["WGS_1984", "WGS 84", "WGS84", "\"4326\""];

/// Classifies a `.prj` WKT string.
#[must_use]
pub fn projection_from_wkt(wkt: &str) -> ProjectionHint {
    let upper = wkt.to_ascii_uppercase();
    let trimmed = upper.trim_start();

    if trimmed.starts_with("PROJCS") {
        if WEB_MERCATOR_MARKERS.iter().any(|m| upper.contains(m)) {
            ProjectionHint::WebMercator
        } else {
            ProjectionHint::Unknown
        }
    } else if trimmed.starts_with("GEOGCS") && WGS84_MARKERS.iter().any(|m| upper.contains(m)) {
        ProjectionHint::Wgs84
    } else {
        ProjectionHint::Unknown
    }
}
