//! `.shp` geometry decoding.
//!
//! The main file is a 100-byte header followed by records, each a
//! big-endian `(record number, content length in 16-bit words)` pair and a
//! little-endian shape body. Only the 2-D part of every shape is read; Z
//! and M arrays trail the X/Y data and are skipped along with the rest of
//! the record.

use std::io::{self, Cursor, Read as _};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt as _};
use geo::{Contains as _, Winding as _};
use geojson::{Position, Value};

use super::ShapefileError;

/// Magic number at the start of every `.shp` file.
pub const FILE_CODE: i32 = 9994;

/// Fixed main-file header length in bytes.
pub const HEADER_LEN: usize = 100;

const RECORD_HEADER_LEN: usize = 8;

type Ring = Vec<(f64, f64)>;

/// Decodes every record of a `.shp` file, in file order.
///
/// Null shapes and shape types without a `GeoJSON` equivalent
/// (`MultiPatch`) come back as `None` so record indices stay aligned with
/// the attribute table.
///
/// # Errors
///
/// * If the header is short or has the wrong file code
/// * If a record is truncated or its counts do not fit its length
pub fn read_shapes(bytes: &[u8]) -> Result<Vec<Option<Value>>, ShapefileError> {
    let header = bytes
        .get(..HEADER_LEN)
        .ok_or(ShapefileError::TruncatedHeader)?;
    let file_code = Cursor::new(header).read_i32::<BigEndian>()?;
    if file_code != FILE_CODE {
        return Err(ShapefileError::FileCode(file_code));
    }

    let mut shapes = Vec::new();
    let mut offset = HEADER_LEN;

    while let Some(record_header) = bytes.get(offset..offset + RECORD_HEADER_LEN) {
        let mut cursor = Cursor::new(record_header);
        let record = cursor.read_i32::<BigEndian>()?;
        let words = cursor.read_i32::<BigEndian>()?;

        let start = offset + RECORD_HEADER_LEN;
        let content = usize::try_from(words)
            .ok()
            .and_then(|words| start.checked_add(words * 2))
            .and_then(|end| bytes.get(start..end))
            .ok_or(ShapefileError::TruncatedRecord { record })?;

        let shape =
            read_shape(content).map_err(|source| ShapefileError::Record { record, source })?;
        shapes.push(shape);
        offset = start + content.len();
    }

    Ok(shapes)
}

/// Decodes a single record body.
fn read_shape(content: &[u8]) -> io::Result<Option<Value>> {
    let mut r = Cursor::new(content);
    let shape_type = r.read_i32::<LittleEndian>()?;

    Ok(match shape_type {
        0 => None,
        // Point, PointZ, PointM
        1 | 11 | 21 => {
            let (x, y) = read_xy(&mut r)?;
            Some(Value::Point(vec![x, y]))
        }
        // PolyLine, PolyLineZ, PolyLineM
        3 | 13 | 23 => {
            let mut parts = read_parts(&mut r)?;
            Some(if parts.len() == 1 {
                Value::LineString(to_positions(parts.remove(0)))
            } else {
                Value::MultiLineString(parts.into_iter().map(to_positions).collect())
            })
        }
        // Polygon, PolygonZ, PolygonM
        5 | 15 | 25 => Some(assemble_polygons(read_parts(&mut r)?)),
        // MultiPoint, MultiPointZ, MultiPointM
        8 | 18 | 28 => {
            skip_bbox(&mut r)?;
            let count = read_count(&mut r)?;
            ensure_remaining(&r, count * 16)?;
            let mut points = (0..count)
                .map(|_| read_xy(&mut r).map(|(x, y)| vec![x, y]))
                .collect::<io::Result<Vec<_>>>()?;
            Some(if points.len() == 1 {
                Value::Point(points.remove(0))
            } else {
                Value::MultiPoint(points)
            })
        }
        other => {
            log::debug!("Skipping unsupported shape type {other}");
            None
        }
    })
}

fn read_xy(r: &mut Cursor<&[u8]>) -> io::Result<(f64, f64)> {
    Ok((r.read_f64::<LittleEndian>()?, r.read_f64::<LittleEndian>()?))
}

fn read_count(r: &mut Cursor<&[u8]>) -> io::Result<usize> {
    let value = r.read_i32::<LittleEndian>()?;
    usize::try_from(value).map_err(|_| invalid_data(format!("negative count {value}")))
}

fn skip_bbox(r: &mut Cursor<&[u8]>) -> io::Result<()> {
    let mut bbox = [0u8; 32];
    r.read_exact(&mut bbox)
}

fn remaining(r: &Cursor<&[u8]>) -> usize {
    let position = usize::try_from(r.position()).unwrap_or(usize::MAX);
    r.get_ref().len().saturating_sub(position)
}

fn ensure_remaining(r: &Cursor<&[u8]>, needed: usize) -> io::Result<()> {
    if remaining(r) < needed {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("record needs {needed} more bytes"),
        ));
    }
    Ok(())
}

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

/// Reads the shared PolyLine/Polygon body and splits points into parts.
fn read_parts(r: &mut Cursor<&[u8]>) -> io::Result<Vec<Ring>> {
    skip_bbox(r)?;
    let num_parts = read_count(r)?;
    let num_points = read_count(r)?;
    ensure_remaining(r, num_parts * 4 + num_points * 16)?;

    let starts = (0..num_parts)
        .map(|_| read_count(r))
        .collect::<io::Result<Vec<_>>>()?;
    let points = (0..num_points)
        .map(|_| read_xy(r))
        .collect::<io::Result<Vec<_>>>()?;

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(num_points);
            points
                .get(start..end)
                .map(<[(f64, f64)]>::to_vec)
                .ok_or_else(|| invalid_data(format!("part {i} spans {start}..{end}")))
        })
        .collect()
}

fn to_positions(ring: Ring) -> Vec<Position> {
    ring.into_iter().map(|(x, y)| vec![x, y]).collect()
}

/// Groups shapefile rings into polygons by winding order.
///
/// Clockwise rings are exteriors. Counter-clockwise rings are holes of the
/// exterior containing their first vertex, or of the most recent exterior
/// when none does. A hole seen before any exterior is promoted to one.
fn assemble_polygons(rings: Vec<Ring>) -> Value {
    let mut polygons: Vec<(geo::Polygon<f64>, Vec<Ring>)> = Vec::new();

    for ring in rings {
        let line = geo::LineString::from(ring.clone());
        let first = ring.first().copied();

        match first {
            Some((x, y)) if line.is_ccw() && !polygons.is_empty() => {
                let point = geo::Point::new(x, y);
                let owner = polygons
                    .iter()
                    .position(|(exterior, _)| exterior.contains(&point))
                    .unwrap_or(polygons.len() - 1);
                polygons[owner].1.push(ring);
            }
            _ => polygons.push((geo::Polygon::new(line, vec![]), vec![ring])),
        }
    }

    let mut grouped: Vec<Vec<Vec<Position>>> = polygons
        .into_iter()
        .map(|(_, rings)| rings.into_iter().map(to_positions).collect())
        .collect();

    if grouped.len() == 1 {
        Value::Polygon(grouped.remove(0))
    } else {
        Value::MultiPolygon(grouped)
    }
}
