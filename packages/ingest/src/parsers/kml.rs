//! KML parser and KML to `GeoJSON` conversion.
//!
//! Documents are read with the `kml` crate after a streaming outline pass
//! (see [`super::xml`]) has bounded their nesting. Every `Placemark` with
//! at least one geometry becomes a feature. A placemark holding several
//! geometries through `MultiGeometry` becomes a `GeometryCollection`,
//! which ingestion later flattens.

use carbon_map_ingest_models::FileFormat;
use geojson::{Feature, Geometry, JsonObject, Position, Value, feature::Id};
use kml::{
    Kml,
    types::{Coord, Element, Geometry as KmlGeometry, Placemark},
};
use serde_json::json;

use super::{ParsedDocument, RawGeoJson, decode_utf8, xml};
use crate::{IngestError, status::StatusSink};

/// Parses KML bytes into a feature collection.
///
/// # Errors
///
/// * If the bytes are not UTF-8 or not well-formed KML
/// * If the document contains no convertible placemark
pub fn parse(bytes: &[u8], status: &dyn StatusSink) -> Result<ParsedDocument, IngestError> {
    status.status("Reading KML content...");
    let text = decode_utf8(bytes, FileFormat::Kml)?;
    convert_text(text, FileFormat::Kml, status)
}

/// Parses and converts KML text. `format` names the container in errors,
/// so KMZ uploads report themselves as KMZ.
///
/// # Errors
///
/// * If `text` is not well-formed, nests too deeply, or is rejected by the
///   KML reader
/// * If the document contains no convertible placemark
pub fn convert_text(
    text: &str,
    format: FileFormat,
    status: &dyn StatusSink,
) -> Result<ParsedDocument, IngestError> {
    let parse_error = |message: String| IngestError::Parse { format, message };

    status.status("Parsing KML structure...");
    let outline = xml::scan(text, xml::MAX_DEPTH).map_err(|e| parse_error(e.to_string()))?;
    log::debug!(
        "KML outline: {} placemarks, depth {}",
        outline.placemarks,
        outline.depth
    );
    let document = if outline.placemarks == 0 {
        None
    } else {
        Some(text.parse::<Kml>().map_err(|e| parse_error(e.to_string()))?)
    };

    status.status("Converting KML to GeoJSON...");
    let features = document.as_ref().map(to_features).unwrap_or_default();
    if features.is_empty() {
        return Err(IngestError::Conversion { format });
    }
    log::info!("Converted {} placemarks from {format}", features.len());

    status.status("Validating converted features...");
    Ok(ParsedDocument::undeclared(RawGeoJson::FeatureCollection(
        features,
    )))
}

/// Converts every placemark in `document`, in document order.
#[must_use]
pub fn to_features(document: &Kml) -> Vec<Feature> {
    let mut features = Vec::new();
    let mut stack = vec![document];

    while let Some(node) = stack.pop() {
        match node {
            Kml::KmlDocument(document) => stack.extend(document.elements.iter().rev()),
            Kml::Document { elements, .. } => stack.extend(elements.iter().rev()),
            Kml::Folder(folder) => stack.extend(folder.elements.iter().rev()),
            Kml::Placemark(placemark) => features.extend(placemark_to_feature(placemark)),
            _ => {}
        }
    }

    features
}

fn placemark_to_feature(placemark: &Placemark) -> Option<Feature> {
    let mut geometries = Vec::new();
    if let Some(geometry) = &placemark.geometry {
        collect_geometries(geometry, &mut geometries);
    }

    let value = match geometries.len() {
        0 => {
            log::debug!("Skipping placemark without geometry");
            return None;
        }
        1 => geometries.pop()?,
        _ => Value::GeometryCollection(geometries.into_iter().map(Geometry::new).collect()),
    };

    Some(Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: placemark
            .attrs
            .get("id")
            .map(|id| Id::String(id.clone())),
        properties: Some(properties(placemark)),
        foreign_members: None,
    })
}

/// Flattens `geometry` into `out`, expanding `MultiGeometry` members in
/// order. A bare `LinearRing` is read as a one-ring polygon.
fn collect_geometries(geometry: &KmlGeometry, out: &mut Vec<Value>) {
    let mut stack = vec![geometry];

    while let Some(geometry) = stack.pop() {
        match geometry {
            KmlGeometry::Point(point) => out.push(Value::Point(position(&point.coord))),
            KmlGeometry::LineString(line) if !line.coords.is_empty() => {
                out.push(Value::LineString(positions(&line.coords)));
            }
            KmlGeometry::LinearRing(ring) if !ring.coords.is_empty() => {
                out.push(Value::Polygon(vec![positions(&ring.coords)]));
            }
            KmlGeometry::Polygon(polygon) => {
                let rings: Vec<Vec<Position>> = std::iter::once(&polygon.outer)
                    .chain(&polygon.inner)
                    .filter(|ring| !ring.coords.is_empty())
                    .map(|ring| positions(&ring.coords))
                    .collect();
                if !rings.is_empty() {
                    out.push(Value::Polygon(rings));
                }
            }
            KmlGeometry::MultiGeometry(multi) => stack.extend(multi.geometries.iter().rev()),
            _ => {}
        }
    }
}

fn position(coord: &Coord) -> Position {
    let mut position = vec![coord.x, coord.y];
    position.extend(coord.z);
    position
}

fn positions(coords: &[Coord]) -> Vec<Position> {
    coords.iter().map(position).collect()
}

/// Mirrors togeojson's property mapping for the elements a placemark
/// carries beyond its geometry.
fn properties(placemark: &Placemark) -> JsonObject {
    let mut properties = JsonObject::new();
    let children = placemark.children.as_slice();

    if let Some(name) = &placemark.name {
        properties.insert("name".to_string(), json!(name.trim()));
    }
    if let Some(address) = child_text(children, "address") {
        properties.insert("address".to_string(), json!(address));
    }
    if let Some(description) = &placemark.description {
        properties.insert("description".to_string(), json!(description.trim()));
    }

    if let Some(when) =
        child(children, "TimeStamp").and_then(|stamp| child_text(&stamp.children, "when"))
    {
        properties.insert("timestamp".to_string(), json!(when));
    }

    if let Some(span) = child(children, "TimeSpan") {
        properties.insert(
            "timespan".to_string(),
            json!({
                "begin": child_text(&span.children, "begin"),
                "end": child_text(&span.children, "end"),
            }),
        );
    }

    if let Some(extended) = child(children, "ExtendedData") {
        for data in children_named(&extended.children, "Data") {
            if let Some(name) = data.attrs.get("name") {
                let value = child_text(&data.children, "value").unwrap_or_default();
                properties.insert(name.clone(), json!(value));
            }
        }
        for schema_data in children_named(&extended.children, "SchemaData") {
            for simple in children_named(&schema_data.children, "SimpleData") {
                if let Some(name) = simple.attrs.get("name") {
                    properties.insert(name.clone(), json!(text(simple).unwrap_or_default()));
                }
            }
        }
    }

    if let Some(style) = child(children, "Style") {
        apply_style(style, &mut properties);
    }

    properties
}

fn apply_style(style: &Element, properties: &mut JsonObject) {
    if let Some(line) = child(&style.children, "LineStyle") {
        if let Some((hex, opacity)) = child_text(&line.children, "color").and_then(kml_color) {
            properties.insert("stroke".to_string(), json!(hex));
            properties.insert("stroke-opacity".to_string(), json!(opacity));
        }
        if let Some(width) =
            child_text(&line.children, "width").and_then(|w| w.parse::<f64>().ok())
        {
            properties.insert("stroke-width".to_string(), json!(width));
        }
    }

    if let Some(poly) = child(&style.children, "PolyStyle")
        && let Some((hex, opacity)) = child_text(&poly.children, "color").and_then(kml_color)
    {
        properties.insert("fill".to_string(), json!(hex));
        properties.insert("fill-opacity".to_string(), json!(opacity));
    }
}

/// Converts a KML `aabbggrr` colour to `#rrggbb` plus opacity in `0..=1`.
#[must_use]
pub fn kml_color(text: &str) -> Option<(String, f64)> {
    let hex = text.trim().trim_start_matches('#');
    if hex.len() != 8 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let alpha = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let (blue, green, red) = (&hex[2..4], &hex[4..6], &hex[6..8]);

    Some((
        format!("#{red}{green}{blue}").to_ascii_lowercase(),
        f64::from(alpha) / 255.0,
    ))
}

/// Element name without any namespace prefix.
fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

fn children_named<'a>(
    children: &'a [Element],
    name: &'a str,
) -> impl Iterator<Item = &'a Element> + 'a {
    children
        .iter()
        .filter(move |element| local_name(&element.name) == name)
}

fn child<'a>(children: &'a [Element], name: &str) -> Option<&'a Element> {
    children
        .iter()
        .find(|element| local_name(&element.name) == name)
}

fn text(element: &Element) -> Option<&str> {
    element.content.as_deref().map(str::trim)
}

fn child_text<'a>(children: &'a [Element], name: &str) -> Option<&'a str> {
    child(children, name).and_then(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::NullStatus;

    fn convert(kml: &str) -> Vec<Feature> {
        parse(kml.as_bytes(), &NullStatus)
            .unwrap()
            .content
            .into_features()
    }

    fn value(feature: &Feature) -> &Value {
        &feature.geometry.as_ref().unwrap().value
    }

    #[test]
    fn converts_points_and_lines() {
        let features = convert(
            r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Document>
                <Placemark id="pier"><name>Pier 39</name>
                  <Point><coordinates>-122.41,37.80,0</coordinates></Point></Placemark>
                <Placemark><LineString><coordinates>
                  -122.4,37.7 -122.3,37.8
                </coordinates></LineString></Placemark>
            </Document></kml>"#,
        );

        assert_eq!(features.len(), 2);
        assert_eq!(value(&features[0]), &Value::Point(vec![-122.41, 37.80, 0.0]));
        assert_eq!(features[0].id, Some(Id::String("pier".to_string())));
        assert_eq!(
            features[0].properties.as_ref().unwrap()["name"],
            json!("Pier 39")
        );
        assert_eq!(
            value(&features[1]),
            &Value::LineString(vec![vec![-122.4, 37.7], vec![-122.3, 37.8]])
        );
    }

    #[test]
    fn walks_folders_in_document_order() {
        let features = convert(
            "<kml><Document>\
               <Placemark><name>a</name><Point><coordinates>1,1</coordinates></Point></Placemark>\
               <Folder><name>inner</name>\
                 <Placemark><name>b</name><Point><coordinates>2,2</coordinates></Point></Placemark>\
               </Folder>\
               <Placemark><name>c</name><Point><coordinates>3,3</coordinates></Point></Placemark>\
             </Document></kml>",
        );
        let names: Vec<_> = features
            .iter()
            .map(|f| f.properties.as_ref().unwrap()["name"].clone())
            .collect();
        assert_eq!(names, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[test]
    fn converts_polygons_with_holes() {
        let features = convert(
            "<kml><Placemark><Polygon>\
               <outerBoundaryIs><LinearRing><coordinates>0,0 10,0 10,10 0,10 0,0</coordinates></LinearRing></outerBoundaryIs>\
               <innerBoundaryIs><LinearRing><coordinates>2,2 3,2 3,3 2,2</coordinates></LinearRing></innerBoundaryIs>\
             </Polygon></Placemark></kml>",
        );
        let Value::Polygon(rings) = value(&features[0]) else {
            panic!("expected polygon");
        };
        assert_eq!(rings.len(), 2);
        assert_eq!(rings[0].len(), 5);
        assert_eq!(rings[1][0], vec![2.0, 2.0]);
    }

    #[test]
    fn multi_geometry_becomes_collection() {
        let features = convert(
            "<kml><Placemark><MultiGeometry>\
               <Point><coordinates>1,2</coordinates></Point>\
               <LineString><coordinates>3,4 5,6</coordinates></LineString>\
             </MultiGeometry></Placemark></kml>",
        );
        let Value::GeometryCollection(members) = value(&features[0]) else {
            panic!("expected collection");
        };
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].value, Value::Point(vec![1.0, 2.0]));
    }

    #[test]
    fn collects_extended_data_and_times() {
        let features = convert(
            r##"<kml><Placemark>
                 <TimeSpan><begin>2001</begin><end>2002</end></TimeSpan>
                 <ExtendedData>
                   <Data name="owner"><value>City</value></Data>
                   <SchemaData schemaUrl="#s"><SimpleData name="acres">12.5</SimpleData></SchemaData>
                 </ExtendedData>
                 <Point><coordinates>1,2</coordinates></Point>
               </Placemark></kml>"##,
        );
        let props = features[0].properties.as_ref().unwrap();
        assert_eq!(props["owner"], json!("City"));
        assert_eq!(props["acres"], json!("12.5"));
        assert_eq!(props["timespan"], json!({"begin": "2001", "end": "2002"}));
    }

    #[test]
    fn applies_inline_styles() {
        let features = convert(
            "<kml><Placemark>\
               <Style>\
                 <LineStyle><color>ff0000ff</color><width>3</width></LineStyle>\
                 <PolyStyle><color>7f00ff00</color></PolyStyle>\
               </Style>\
               <Point><coordinates>1,2</coordinates></Point>\
             </Placemark></kml>",
        );
        let props = features[0].properties.as_ref().unwrap();
        assert_eq!(props["stroke"], json!("#ff0000"));
        assert_eq!(props["stroke-opacity"], json!(1.0));
        assert_eq!(props["stroke-width"], json!(3.0));
        assert_eq!(props["fill"], json!("#00ff00"));
    }

    #[test]
    fn kml_colors_are_reordered() {
        assert_eq!(kml_color("ff0000ff"), Some(("#ff0000".to_string(), 1.0)));
        assert_eq!(kml_color("00FFAA11").unwrap().0, "#11aaff");
        assert_eq!(kml_color("red"), None);
    }

    #[test]
    fn empty_documents_fail_conversion() {
        let err = parse(b"<kml><Document/></kml>", &NullStatus).unwrap_err();
        assert!(matches!(
            err,
            IngestError::Conversion {
                format: FileFormat::Kml
            }
        ));

        let err = parse(b"<kml><Placemark><name>x</name></Placemark></kml>", &NullStatus)
            .unwrap_err();
        assert!(matches!(err, IngestError::Conversion { .. }));
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let err = parse(b"<kml><Placemark></kml>", &NullStatus).unwrap_err();
        assert!(matches!(
            err,
            IngestError::Parse {
                format: FileFormat::Kml,
                ..
            }
        ));
    }

    #[test]
    fn deeply_nested_folders_are_a_parse_error() {
        let depth = 200_000;
        let text = format!(
            "<kml>{}<Placemark><Point><coordinates>1,2</coordinates></Point></Placemark>{}</kml>",
            "<Folder>".repeat(depth),
            "</Folder>".repeat(depth)
        );

        let IngestError::Parse { format, message } = parse(text.as_bytes(), &NullStatus).unwrap_err()
        else {
            panic!("expected a parse error");
        };
        assert_eq!(format, FileFormat::Kml);
        assert!(message.contains("deeper than"), "{message}");
    }
}
