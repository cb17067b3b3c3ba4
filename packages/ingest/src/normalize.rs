//! Coordinate normalization to canonical WGS84 `[lng, lat]`.
//!
//! Uploads arrive with inconsistent axis order and a mix of geographic and
//! Web Mercator coordinates, and metadata saying which is rarely present.
//! Projection is therefore decided from coordinate bounds: once per feature
//! (so every leaf of a feature is treated the same way), then each leaf is
//! swapped, unprojected or left alone and finally range-checked. A single
//! bad leaf rejects the whole feature.

use carbon_map_ingest_models::ProjectionHint;
use geojson::{Feature, Geometry, Position, Value};

/// Sphere radius used by EPSG:3857, in meters.
pub const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Whether `[lng, lat]` lies inside the WGS84 range.
#[must_use]
pub fn is_valid_wgs84(lng: f64, lat: f64) -> bool {
    (-180.0..=180.0).contains(&lng) && (-90.0..=90.0).contains(&lat)
}

/// Whether a pair is too large to be degrees and is probably meters.
#[must_use]
pub fn looks_like_web_mercator(x: f64, y: f64) -> bool {
    x.abs() > 180.0 || y.abs() > 90.0
}

/// Whether a pair is invalid as given but valid once its axes are swapped,
/// i.e. it was most likely written `[lat, lng]`.
#[must_use]
pub fn looks_axis_swapped(first: f64, second: f64) -> bool {
    let first_abs = first.abs();
    let second_abs = second.abs();

    (first_abs <= 90.0 && second_abs > 90.0 && second_abs <= 180.0)
        || (!is_valid_wgs84(first, second) && is_valid_wgs84(second, first))
}

/// Inverse spherical Mercator: EPSG:3857 meters to WGS84 degrees.
#[must_use]
pub fn web_mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lng = (x / WEB_MERCATOR_RADIUS).to_degrees();
    let lat = (2.0 * (y / WEB_MERCATOR_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2)
        .to_degrees();
    (lng, lat)
}

/// Calls `f` with every coordinate leaf under `value`, in document order.
pub fn for_each_position(value: &Value, f: &mut impl FnMut(&[f64])) {
    match value {
        Value::Point(position) => f(position.as_slice()),
        Value::MultiPoint(positions) | Value::LineString(positions) => {
            positions.iter().for_each(|p| f(p.as_slice()));
        }
        Value::MultiLineString(lines) | Value::Polygon(lines) => {
            lines.iter().flatten().for_each(|p| f(p.as_slice()));
        }
        Value::MultiPolygon(polygons) => {
            polygons
                .iter()
                .flatten()
                .flatten()
                .for_each(|p| f(p.as_slice()));
        }
        Value::GeometryCollection(geometries) => {
            for geometry in geometries {
                for_each_position(&geometry.value, f);
            }
        }
    }
}

/// Classifies a feature's coordinate tree before any leaf is touched.
///
/// * [`ProjectionHint::WebMercator`] if any leaf is out of WGS84 range in
///   both axis orders (so no swap could rescue it),
/// * [`ProjectionHint::Wgs84`] if every leaf is already valid as given,
/// * [`ProjectionHint::Unknown`] otherwise, leaving per-leaf swap
///   detection to decide.
#[must_use]
pub fn detect_projection(value: &Value) -> ProjectionHint {
    let mut mercator = false;
    let mut all_valid = true;

    for_each_position(value, &mut |position| {
        let (Some(&x), Some(&y)) = (position.first(), position.get(1)) else {
            return;
        };
        if !is_valid_wgs84(x, y) {
            all_valid = false;
            if !is_valid_wgs84(y, x) {
                mercator = true;
            }
        }
    });

    if mercator {
        ProjectionHint::WebMercator
    } else if all_valid {
        ProjectionHint::Wgs84
    } else {
        ProjectionHint::Unknown
    }
}

/// Normalizes one coordinate leaf to `[lng, lat]`.
///
/// Returns `None` when the leaf has fewer than two ordinates, holds a
/// non-finite value, or cannot be brought into WGS84 range. Ordinates past
/// the second (altitude, measure) are dropped.
#[must_use]
pub fn normalize_position(position: &[f64], hint: ProjectionHint) -> Option<Position> {
    let (&x, &y) = (position.first()?, position.get(1)?);
    if !x.is_finite() || !y.is_finite() {
        return None;
    }

    let (lng, lat) = match hint {
        ProjectionHint::WebMercator => web_mercator_to_wgs84(x, y),
        ProjectionHint::Wgs84 => (x, y),
        ProjectionHint::Unknown => {
            let (x, y) = if looks_axis_swapped(x, y) { (y, x) } else { (x, y) };
            if looks_like_web_mercator(x, y) {
                web_mercator_to_wgs84(x, y)
            } else {
                (x, y)
            }
        }
    };

    is_valid_wgs84(lng, lat).then(|| vec![lng, lat])
}

fn normalize_positions(positions: &[Position], hint: ProjectionHint) -> Option<Vec<Position>> {
    positions
        .iter()
        .map(|p| normalize_position(p, hint))
        .collect()
}

fn normalize_lines(lines: &[Vec<Position>], hint: ProjectionHint) -> Option<Vec<Vec<Position>>> {
    lines
        .iter()
        .map(|line| normalize_positions(line, hint))
        .collect()
}

/// Normalizes every leaf of a geometry value with a single shared `hint`.
///
/// Any rejected leaf rejects the whole value.
#[must_use]
pub fn normalize_value(value: &Value, hint: ProjectionHint) -> Option<Value> {
    Some(match value {
        Value::Point(position) => Value::Point(normalize_position(position, hint)?),
        Value::MultiPoint(positions) => Value::MultiPoint(normalize_positions(positions, hint)?),
        Value::LineString(positions) => Value::LineString(normalize_positions(positions, hint)?),
        Value::MultiLineString(lines) => Value::MultiLineString(normalize_lines(lines, hint)?),
        Value::Polygon(rings) => Value::Polygon(normalize_lines(rings, hint)?),
        Value::MultiPolygon(polygons) => Value::MultiPolygon(
            polygons
                .iter()
                .map(|rings| normalize_lines(rings, hint))
                .collect::<Option<_>>()?,
        ),
        Value::GeometryCollection(geometries) => Value::GeometryCollection(
            geometries
                .iter()
                .map(|g| normalize_value(&g.value, hint).map(Geometry::new))
                .collect::<Option<_>>()?,
        ),
    })
}

/// Normalizes a feature's geometry, detecting its projection first.
///
/// A file-level `declared` hint of [`ProjectionHint::WebMercator`] (from a
/// shapefile `.prj`) overrides detection; any other declaration falls back
/// to bounds detection. Returns `None` for features without geometry or
/// whose coordinates cannot be normalized. Stale `bbox` members are
/// cleared.
#[must_use]
pub fn normalize_feature(feature: Feature, declared: ProjectionHint) -> Option<Feature> {
    let Feature {
        geometry,
        id,
        properties,
        foreign_members,
        ..
    } = feature;
    let geometry = geometry?;

    let hint = match declared {
        ProjectionHint::WebMercator => ProjectionHint::WebMercator,
        ProjectionHint::Wgs84 | ProjectionHint::Unknown => detect_projection(&geometry.value),
    };
    let value = normalize_value(&geometry.value, hint)?;

    Some(Feature {
        bbox: None,
        geometry: Some(Geometry {
            bbox: None,
            value,
            foreign_members: geometry.foreign_members,
        }),
        id,
        properties,
        foreign_members,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(value: Value) -> Feature {
        Feature {
            bbox: None,
            geometry: Some(Geometry::new(value)),
            id: None,
            properties: None,
            foreign_members: None,
        }
    }

    fn coords(feature: &Feature) -> &Value {
        &feature.geometry.as_ref().unwrap().value
    }

    #[test]
    fn valid_pairs_are_unchanged() {
        for hint in [ProjectionHint::Unknown, ProjectionHint::Wgs84] {
            assert_eq!(
                normalize_position(&[-122.4194, 37.7749], hint),
                Some(vec![-122.4194, 37.7749])
            );
            assert_eq!(normalize_position(&[180.0, -90.0], hint), Some(vec![180.0, -90.0]));
        }
    }

    #[test]
    fn normalizing_twice_is_a_no_op() {
        let once = normalize_position(&[-13_627_506.0, 4_547_675.0], ProjectionHint::Unknown)
            .unwrap();
        let twice = normalize_position(&once, ProjectionHint::Unknown).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn swaps_lat_lng_pairs() {
        assert_eq!(
            normalize_position(&[37.7749, -122.4194], ProjectionHint::Unknown),
            Some(vec![-122.4194, 37.7749])
        );
    }

    #[test]
    fn unprojects_web_mercator_pairs() {
        let position =
            normalize_position(&[-13_627_506.0, 4_547_675.0], ProjectionHint::Unknown).unwrap();
        assert!((position[0] - -122.42).abs() < 0.01, "lng was {}", position[0]);
        assert!((position[1] - 37.77).abs() < 0.01, "lat was {}", position[1]);
    }

    #[test]
    fn mercator_hint_rejects_out_of_world_results() {
        // 30,000 km east of Greenwich is past the antimeridian.
        assert_eq!(
            normalize_position(&[30_000_000.0, 0.0], ProjectionHint::WebMercator),
            None
        );
    }

    #[test]
    fn rejects_short_and_non_finite_leaves() {
        assert_eq!(normalize_position(&[1.0], ProjectionHint::Unknown), None);
        assert_eq!(normalize_position(&[f64::NAN, 1.0], ProjectionHint::Unknown), None);
        assert_eq!(
            normalize_position(&[f64::INFINITY, 1.0], ProjectionHint::WebMercator),
            None
        );
    }

    #[test]
    fn drops_altitude() {
        assert_eq!(
            normalize_position(&[-105.0, 40.0, 1609.0], ProjectionHint::Unknown),
            Some(vec![-105.0, 40.0])
        );
    }

    #[test]
    fn detects_projection_per_feature() {
        let wgs = Value::LineString(vec![vec![-105.0, 40.0], vec![-104.0, 41.0]]);
        assert_eq!(detect_projection(&wgs), ProjectionHint::Wgs84);

        let swapped = Value::LineString(vec![vec![40.0, -105.0], vec![41.0, -104.0]]);
        assert_eq!(detect_projection(&swapped), ProjectionHint::Unknown);

        let mercator = Value::Point(vec![-11_688_546.0, 4_865_942.0]);
        assert_eq!(detect_projection(&mercator), ProjectionHint::WebMercator);
    }

    #[test]
    fn mercator_detection_is_shared_by_every_leaf() {
        // The first vertex is small enough to pass as degrees on its own,
        // but the feature as a whole is clearly in meters.
        let polygon = Value::Polygon(vec![vec![
            vec![50.0, 50.0],
            vec![-13_627_506.0, 4_547_675.0],
            vec![-13_627_000.0, 4_548_000.0],
            vec![50.0, 50.0],
        ]]);
        let normalized = normalize_feature(feature(polygon), ProjectionHint::Unknown).unwrap();

        let Value::Polygon(rings) = coords(&normalized) else {
            panic!("expected polygon");
        };
        let first = &rings[0][0];
        assert!(first[0].abs() < 0.001 && first[1].abs() < 0.001);
        assert!((rings[0][1][0] - -122.42).abs() < 0.01);
    }

    #[test]
    fn swapped_feature_is_corrected() {
        let line = Value::LineString(vec![vec![37.7749, -122.4194], vec![37.8, -122.3]]);
        let normalized = normalize_feature(feature(line), ProjectionHint::Unknown).unwrap();
        assert_eq!(
            coords(&normalized),
            &Value::LineString(vec![vec![-122.4194, 37.7749], vec![-122.3, 37.8]])
        );
    }

    #[test]
    fn one_bad_leaf_rejects_the_feature() {
        let line = Value::LineString(vec![vec![-105.0, 40.0], vec![f64::NAN, 40.0]]);
        assert!(normalize_feature(feature(line), ProjectionHint::Unknown).is_none());

        let multi = Value::MultiPolygon(vec![
            vec![vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0], vec![0.0, 0.0]]],
            vec![vec![vec![30_000_000.0, 0.0]]],
        ]);
        assert!(normalize_feature(feature(multi), ProjectionHint::WebMercator).is_none());
    }

    #[test]
    fn declared_mercator_overrides_detection() {
        // 100 m east, 50 m north of null island also reads as valid degrees.
        let point = Value::Point(vec![100.0, 50.0]);
        let normalized =
            normalize_feature(feature(point.clone()), ProjectionHint::WebMercator).unwrap();
        let Value::Point(position) = coords(&normalized) else {
            panic!("expected point");
        };
        assert!(position[0] > 0.0 && position[0] < 0.001);
        assert!(position[1] > 0.0 && position[1] < 0.001);

        let detected = normalize_feature(feature(point), ProjectionHint::Wgs84).unwrap();
        assert_eq!(coords(&detected), &Value::Point(vec![100.0, 50.0]));
    }

    #[test]
    fn features_without_geometry_are_rejected() {
        let empty = Feature {
            bbox: None,
            geometry: None,
            id: None,
            properties: None,
            foreign_members: None,
        };
        assert!(normalize_feature(empty, ProjectionHint::Unknown).is_none());
    }

    #[test]
    fn clears_stale_bbox() {
        let mut input = feature(Value::Point(vec![-13_627_506.0, 4_547_675.0]));
        input.bbox = Some(vec![-13_627_506.0, 4_547_675.0, -13_627_506.0, 4_547_675.0]);
        let normalized = normalize_feature(input, ProjectionHint::Unknown).unwrap();
        assert!(normalized.bbox.is_none());
    }
}
