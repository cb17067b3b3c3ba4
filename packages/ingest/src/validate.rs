//! Aggregate sanity checks for normalized features.
//!
//! Per-leaf normalization can still let through features that are clearly
//! artifacts of a bad projection guess: a polygon whose vertices are each
//! valid degrees but that wraps half the planet. Uploaded areas of interest
//! are regional, so anything wider than [`FeatureValidator::max_lng_span`]
//! or taller than [`FeatureValidator::max_lat_span`] is rejected.

use carbon_map_ingest_models::{Bounds, IngestConfig};
use geojson::{Feature, Value};

use crate::normalize::for_each_position;

/// Extent limits applied to each normalized feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureValidator {
    /// Widest accepted feature, in degrees of longitude.
    pub max_lng_span: f64,
    /// Tallest accepted feature, in degrees of latitude.
    pub max_lat_span: f64,
}

impl Default for FeatureValidator {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

impl From<&IngestConfig> for FeatureValidator {
    fn from(config: &IngestConfig) -> Self {
        Self {
            max_lng_span: config.max_lng_span,
            max_lat_span: config.max_lat_span,
        }
    }
}

impl FeatureValidator {
    /// Whether `feature` has a plausible WGS84 extent.
    ///
    /// Fails for features with no coordinates, malformed leaves, any edge
    /// outside WGS84, or a span beyond the configured limits.
    #[must_use]
    pub fn is_reasonable(&self, feature: &Feature) -> bool {
        let Some(bounds) = feature_bounds(feature) else {
            log::debug!("Feature has no usable coordinates");
            return false;
        };

        if !bounds.is_within_wgs84() {
            log::debug!("Feature has invalid WGS84 bounds: {:?}", bounds.as_array());
            return false;
        }

        let lng_span = bounds.lng_span();
        let lat_span = bounds.lat_span();
        if lng_span > self.max_lng_span || lat_span > self.max_lat_span {
            log::debug!("Feature spans unrealistic area: lng {lng_span}, lat {lat_span}");
            return false;
        }

        true
    }
}

/// Bounding box over every coordinate leaf of a geometry value.
///
/// Returns `None` if there are no leaves, or if any leaf has fewer than
/// two ordinates or a non-finite one.
#[must_use]
pub fn value_bounds(value: &Value) -> Option<Bounds> {
    let mut bounds: Option<Bounds> = None;
    let mut malformed = false;

    for_each_position(value, &mut |position| {
        match (position.first(), position.get(1)) {
            (Some(&lng), Some(&lat)) if lng.is_finite() && lat.is_finite() => match &mut bounds {
                Some(b) => b.extend_point(lng, lat),
                None => bounds = Some(Bounds::from_point(lng, lat)),
            },
            _ => malformed = true,
        }
    });

    if malformed { None } else { bounds }
}

/// Bounding box of a feature's geometry, if it has one.
#[must_use]
pub fn feature_bounds(feature: &Feature) -> Option<Bounds> {
    feature
        .geometry
        .as_ref()
        .and_then(|geometry| value_bounds(&geometry.value))
}

/// Combined extent of a set of features, used to fit the map to an upload.
#[must_use]
pub fn collection_bounds(features: &[Feature]) -> Option<Bounds> {
    features
        .iter()
        .filter_map(feature_bounds)
        .reduce(Bounds::union)
}
