//! Structural cleanup applied to parsed features before normalization.

use geojson::{Feature, Geometry, Value};

/// Splits every feature whose geometry is a `GeometryCollection` into one
/// feature per member, recursing into nested collections.
///
/// Each emitted feature gets a clone of the parent's properties (an empty
/// object if the parent had none) and no id. All other features pass
/// through unchanged, in order.
#[must_use]
pub fn flatten_geometry_collections(features: Vec<Feature>) -> Vec<Feature> {
    let mut flattened = Vec::with_capacity(features.len());

    for feature in features {
        match feature.geometry {
            Some(Geometry {
                value: Value::GeometryCollection(members),
                ..
            }) => {
                let properties = feature.properties.unwrap_or_default();
                push_members(members, &properties, &mut flattened);
            }
            _ => flattened.push(feature),
        }
    }

    flattened
}

fn push_members(
    members: Vec<Geometry>,
    properties: &geojson::JsonObject,
    out: &mut Vec<Feature>,
) {
    for member in members {
        match member.value {
            Value::GeometryCollection(nested) => push_members(nested, properties, out),
            value => out.push(Feature {
                bbox: None,
                geometry: Some(Geometry { value, ..member }),
                id: None,
                properties: Some(properties.clone()),
                foreign_members: None,
            }),
        }
    }
}

/// Whether a geometry value has at least one coordinate leaf.
#[must_use]
pub fn has_coordinates(value: &Value) -> bool {
    match value {
        Value::Point(position) => !position.is_empty(),
        Value::MultiPoint(positions) | Value::LineString(positions) => !positions.is_empty(),
        Value::MultiLineString(lines) | Value::Polygon(lines) => {
            lines.iter().any(|line| !line.is_empty())
        }
        Value::MultiPolygon(polygons) => polygons
            .iter()
            .flatten()
            .any(|ring| !ring.is_empty()),
        Value::GeometryCollection(geometries) => {
            geometries.iter().any(|g| has_coordinates(&g.value))
        }
    }
}

/// Drops features that have no geometry or an empty coordinate array.
#[must_use]
pub fn drop_empty_geometries(features: Vec<Feature>) -> Vec<Feature> {
    features
        .into_iter()
        .filter(|feature| {
            feature
                .geometry
                .as_ref()
                .is_some_and(|geometry| has_coordinates(&geometry.value))
        })
        .collect()
}
