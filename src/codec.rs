//! Byte encoding of column values and composite column names.
//!
//! Integers and timestamps (epoch millis) are 8-byte big-endian, floats are
//! IEEE-754 bits, booleans one byte, text/enum/decimal UTF-8, relation lists a
//! JSON array of ids. An empty value is null.

use crate::core::{DbError, Result, Value};
use crate::model::FieldKind;
use chrono::DateTime;
use rust_decimal::Decimal;

pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let bytes = match value {
        Value::Null => Vec::new(),
        Value::Integer(i) => i.to_be_bytes().to_vec(),
        Value::Float(f) => f.to_bits().to_be_bytes().to_vec(),
        Value::Boolean(b) => vec![u8::from(*b)],
        Value::Text(s) | Value::Reference(s) => s.as_bytes().to_vec(),
        Value::Decimal(d) => d.to_string().into_bytes(),
        Value::Timestamp(ts) => ts.timestamp_millis().to_be_bytes().to_vec(),
        Value::ReferenceList(ids) => serde_json::to_vec(ids)?,
        Value::Dictionaries(_) => {
            return Err(DbError::TypeMismatch(
                "dictionaries are stored as composite columns".to_string(),
            ));
        }
    };
    Ok(bytes)
}

pub fn decode(kind: &FieldKind, bytes: &[u8]) -> Result<Value> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }

    let value = match kind {
        FieldKind::Integer => Value::Integer(i64::from_be_bytes(fixed(bytes)?)),
        FieldKind::Float => Value::Float(f64::from_bits(u64::from_be_bytes(fixed(bytes)?))),
        FieldKind::Boolean => Value::Boolean(bytes[0] != 0),
        FieldKind::Text | FieldKind::Enum => Value::Text(utf8(bytes)?),
        FieldKind::Decimal => {
            let text = utf8(bytes)?;
            let decimal: Decimal = text
                .trim()
                .parse()
                .map_err(|_| DbError::Validation(format!("'{}' is not a decimal", text)))?;
            Value::Decimal(decimal)
        }
        FieldKind::Timestamp => {
            let millis = i64::from_be_bytes(fixed(bytes)?);
            let ts = DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| DbError::Validation(format!("timestamp {} out of range", millis)))?;
            Value::Timestamp(ts)
        }
        FieldKind::Relation { .. } => Value::Reference(utf8(bytes)?),
        FieldKind::RelationList { .. } => Value::ReferenceList(serde_json::from_slice(bytes)?),
        FieldKind::DictionaryList { family } => {
            return Err(DbError::TypeMismatch(format!(
                "dictionary family {} has no column encoding",
                family
            )));
        }
    };
    Ok(value)
}

pub fn encode_counter(ticks: i64) -> Vec<u8> {
    ticks.to_be_bytes().to_vec()
}

pub fn decode_counter(bytes: &[u8]) -> Result<i64> {
    Ok(i64::from_be_bytes(fixed(bytes)?))
}

const END_OF_COMPONENT: u8 = 0;

/// Encodes a composite column name: per component a 2-byte length, the bytes
/// and an end-of-component marker.
pub fn encode_composite(components: &[&str]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for component in components {
        let bytes = component.as_bytes();
        let len = u16::try_from(bytes.len()).map_err(|_| {
            DbError::Validation(format!("composite component of {} bytes", bytes.len()))
        })?;
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(bytes);
        out.push(END_OF_COMPONENT);
    }
    Ok(out)
}

/// Decodes every component of a composite column name. Callers read the
/// leading components they know about and ignore the rest.
pub fn decode_composite(bytes: &[u8]) -> Result<Vec<String>> {
    let mut components = Vec::new();
    let mut rest = bytes;
    while !rest.is_empty() {
        if rest.len() < 2 {
            return Err(DbError::Validation("truncated composite length".to_string()));
        }
        let len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        let end = 2 + len;
        if rest.len() < end + 1 {
            return Err(DbError::Validation("truncated composite component".to_string()));
        }
        components.push(utf8(&rest[2..end])?);
        rest = &rest[end + 1..];
    }
    Ok(components)
}

fn fixed(bytes: &[u8]) -> Result<[u8; 8]> {
    bytes
        .try_into()
        .map_err(|_| DbError::Validation(format!("expected 8 bytes, found {}", bytes.len())))
}

fn utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|err| DbError::Validation(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_integer_is_big_endian() {
        assert_eq!(encode(&Value::Integer(1)).unwrap(), vec![0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(decode(&FieldKind::Integer, &[0, 0, 0, 0, 0, 0, 1, 0]).unwrap(), Value::Integer(256));
    }

    #[test]
    fn test_empty_bytes_decode_to_null() {
        assert_eq!(decode(&FieldKind::Text, &[]).unwrap(), Value::Null);
        assert_eq!(decode(&FieldKind::Integer, &[]).unwrap(), Value::Null);
        assert!(encode(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_relation_list_is_json() {
        let ids = Value::ReferenceList(vec!["g1".into(), "g2".into()]);
        let bytes = encode(&ids).unwrap();
        assert_eq!(bytes, br#"["g1","g2"]"#.to_vec());
        let kind = FieldKind::RelationList { target: "Game" };
        assert_eq!(decode(&kind, &bytes).unwrap(), ids);
    }

    #[test]
    fn test_timestamp_keeps_millis() {
        let ts = Utc.with_ymd_and_hms(2012, 4, 26, 12, 55, 0).unwrap();
        let bytes = encode(&Value::Timestamp(ts)).unwrap();
        assert_eq!(decode(&FieldKind::Timestamp, &bytes).unwrap(), Value::Timestamp(ts));
    }

    #[test]
    fn test_malformed_values_are_validation_failures() {
        assert!(matches!(
            decode(&FieldKind::Decimal, b"12,50"),
            Err(DbError::Validation(_))
        ));
        assert!(matches!(
            decode(&FieldKind::Integer, &[1, 2, 3]),
            Err(DbError::Validation(_))
        ));
    }

    #[test]
    fn test_composite_layout() {
        let name = encode_composite(&["weekly", "score"]).unwrap();
        assert_eq!(&name[..2], &[0, 6]);
        assert_eq!(name[8], END_OF_COMPONENT);
        assert_eq!(decode_composite(&name).unwrap(), vec!["weekly", "score"]);
    }

    #[test]
    fn test_composite_tolerates_reserved_component() {
        let name = encode_composite(&["weekly", "score", "0"]).unwrap();
        let parts = decode_composite(&name).unwrap();
        assert_eq!(&parts[..2], &["weekly".to_string(), "score".to_string()]);
    }
}
