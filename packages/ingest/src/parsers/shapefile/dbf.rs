//! dBase III attribute table decoding.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt as _};
use geojson::JsonObject;
use serde_json::{Value, json};

use super::ShapefileError;

const HEADER_LEN: usize = 32;
const DESCRIPTOR_LEN: usize = 32;
const DESCRIPTOR_TERMINATOR: u8 = 0x0D;

/// One column of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    /// dBase type code (`C`, `N`, `F`, `L`, `D`, ...).
    pub kind: u8,
    pub length: usize,
    pub decimals: u8,
}

/// Decodes every record of a `.dbf` table into a property object.
///
/// Deleted records are kept so that record `i` still lines up with shape
/// `i`. A table that ends early is cut short with a warning; the header's
/// record count is never trusted beyond what the file actually holds.
///
/// # Errors
///
/// * If the header or field descriptors are truncated
/// * If the declared record length cannot hold the declared fields
pub fn read_records(bytes: &[u8]) -> Result<Vec<JsonObject>, ShapefileError> {
    let header = bytes
        .get(..HEADER_LEN)
        .ok_or_else(|| ShapefileError::Dbf("header is truncated".to_string()))?;
    let mut cursor = Cursor::new(header);
    cursor.set_position(4);
    let record_count = cursor.read_u32::<LittleEndian>()? as usize;
    let header_len = usize::from(cursor.read_u16::<LittleEndian>()?);
    let record_len = usize::from(cursor.read_u16::<LittleEndian>()?);

    let fields = read_fields(bytes, header_len)?;

    // Deletion flag plus every column.
    let expected = 1 + fields.iter().map(|field| field.length).sum::<usize>();
    if record_len < expected {
        return Err(ShapefileError::Dbf(format!(
            "record length {record_len} is shorter than its {expected}-byte fields"
        )));
    }

    let available = bytes.len().saturating_sub(header_len) / record_len;
    let count = record_count.min(available);
    if count < record_count {
        log::warn!("dBase table ends after {count} of {record_count} records");
    }

    let records: Vec<JsonObject> = (0..count)
        .map(|index| {
            let start = header_len + index * record_len;
            decode_record(&bytes[start..start + record_len], &fields)
        })
        .collect();

    Ok(records)
}

fn read_fields(bytes: &[u8], header_len: usize) -> Result<Vec<Field>, ShapefileError> {
    let mut fields = Vec::new();
    let mut offset = HEADER_LEN;

    while offset < header_len {
        match bytes.get(offset) {
            Some(&DESCRIPTOR_TERMINATOR) => break,
            Some(_) => {}
            None => {
                return Err(ShapefileError::Dbf(
                    "field descriptors are truncated".to_string(),
                ));
            }
        }

        let descriptor = bytes
            .get(offset..offset + DESCRIPTOR_LEN)
            .ok_or_else(|| ShapefileError::Dbf("field descriptors are truncated".to_string()))?;
        let name_end = descriptor[..11].iter().position(|&b| b == 0).unwrap_or(11);

        fields.push(Field {
            name: String::from_utf8_lossy(&descriptor[..name_end])
                .trim()
                .to_string(),
            kind: descriptor[11].to_ascii_uppercase(),
            length: usize::from(descriptor[16]),
            decimals: descriptor[17],
        });
        offset += DESCRIPTOR_LEN;
    }

    Ok(fields)
}

fn decode_record(record: &[u8], fields: &[Field]) -> JsonObject {
    let mut properties = JsonObject::new();
    // Byte 0 is the deletion flag.
    let mut offset = 1;

    for field in fields {
        let raw = record.get(offset..offset + field.length).unwrap_or_default();
        offset += field.length;
        properties.insert(field.name.clone(), decode_value(raw, field));
    }

    properties
}

fn decode_value(raw: &[u8], field: &Field) -> Value {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');

    match field.kind {
        b'N' | b'F' => {
            if text.is_empty() || text.chars().all(|c| c == '*') {
                Value::Null
            } else if field.decimals == 0
                && let Ok(integer) = text.parse::<i64>()
            {
                json!(integer)
            } else {
                text.parse::<f64>().map_or(Value::Null, |float| json!(float))
            }
        }
        b'L' => match text.chars().next() {
            Some('T' | 't' | 'Y' | 'y') => Value::Bool(true),
            Some('F' | 'f' | 'N' | 'n') => Value::Bool(false),
            _ => Value::Null,
        },
        b'D' if text.is_empty() => Value::Null,
        _ => json!(text),
    }
}

#[cfg(test)]
mod tests {
    use super::{super::test_support::dbf_bytes, *};

    #[test]
    fn decodes_typed_columns() {
        let bytes = dbf_bytes(
            &[
                ("NAME", 'C', 12, 0),
                ("ACRES", 'N', 8, 2),
                ("COUNT", 'N', 4, 0),
                ("ACTIVE", 'L', 1, 0),
                ("SURVEYED", 'D', 8, 0),
            ],
            &[
                &["Oak Flat", "12.50", "7", "T", "20230415"],
                &["", "", "", "?", ""],
            ],
        );
        let records = read_records(&bytes).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["NAME"], json!("Oak Flat"));
        assert_eq!(records[0]["ACRES"], json!(12.5));
        assert_eq!(records[0]["COUNT"], json!(7));
        assert_eq!(records[0]["ACTIVE"], json!(true));
        assert_eq!(records[0]["SURVEYED"], json!("20230415"));

        assert_eq!(records[1]["NAME"], json!(""));
        assert_eq!(records[1]["ACRES"], Value::Null);
        assert_eq!(records[1]["ACTIVE"], Value::Null);
        assert_eq!(records[1]["SURVEYED"], Value::Null);
    }

    #[test]
    fn short_tables_stop_early() {
        let mut bytes = dbf_bytes(&[("ID", 'N', 3, 0)], &[&["1"], &["2"]]);
        // Drop the end-of-file marker and half of the second record.
        bytes.truncate(bytes.len() - 3);
        let records = read_records(&bytes).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["ID"], json!(1));
    }

    #[test]
    fn rejects_truncated_headers() {
        assert!(matches!(read_records(&[3, 0, 0]), Err(ShapefileError::Dbf(_))));
    }

    #[test]
    fn rejects_zero_length_records() {
        let mut bytes = dbf_bytes(&[("ID", 'N', 3, 0)], &[&["1"]]);
        bytes[4..8].copy_from_slice(&2_000_000_u32.to_le_bytes());
        bytes[10..12].copy_from_slice(&0_u16.to_le_bytes());

        let Err(ShapefileError::Dbf(message)) = read_records(&bytes) else {
            panic!("expected a dBase error");
        };
        assert!(message.contains("record length 0"), "{message}");
    }

    #[test]
    fn rejects_records_shorter_than_their_fields() {
        let mut bytes = dbf_bytes(&[("NAME", 'C', 10, 0)], &[&["Oak"]]);
        bytes[10..12].copy_from_slice(&4_u16.to_le_bytes());
        assert!(matches!(read_records(&bytes), Err(ShapefileError::Dbf(_))));
    }

    #[test]
    fn inflated_record_counts_are_capped_by_the_file() {
        let mut bytes = dbf_bytes(&[("ID", 'N', 3, 0)], &[&["1"], &["2"]]);
        bytes[4..8].copy_from_slice(&u32::MAX.to_le_bytes());

        let records = read_records(&bytes).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["ID"], json!(2));
    }
}
