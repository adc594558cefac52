//! Object stream (`/Type /ObjStm`) parsing.
//!
//! Object streams pack several non-stream objects into one compressed
//! stream (PDF 1.5+). The decoded payload opens with `/N` pairs of
//! integers `(objnum offset)` and `/First` points at the first object's
//! data; offsets are relative to `/First`.
//!
//! Streams are parsed lazily: the xref layer asks for one only when a
//! compressed entry is actually resolved, and the raw document caches the
//! result.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::object::Object;
use crate::parser::parse_object;

/// Parse an object stream and extract every packed object.
///
/// # Errors
///
/// Fails when the object is not an `/ObjStm` stream, `/N`/`/First` are
/// missing or implausible, or the payload cannot be decoded. Individual
/// objects that fail to parse are skipped with a warning.
pub fn parse_object_stream(stream_obj: &Object) -> Result<HashMap<u32, Object>> {
    let dict = match stream_obj {
        Object::Stream { dict, .. } => dict,
        other => {
            return Err(Error::Parse {
                offset: 0,
                reason: format!("object stream is a {}, not a Stream", other.type_name()),
            });
        },
    };

    if let Some(type_name) = dict.get("Type").and_then(|o| o.as_name()) {
        if type_name != "ObjStm" {
            return Err(Error::Parse {
                offset: 0,
                reason: format!("expected /Type /ObjStm, got /{}", type_name),
            });
        }
    }

    let n = dict
        .get("N")
        .and_then(|o| o.as_integer())
        .ok_or_else(|| Error::Malformed {
            entity: "ObjStm".to_string(),
            field: "N".to_string(),
        })?;
    let first = dict
        .get("First")
        .and_then(|o| o.as_integer())
        .ok_or_else(|| Error::Malformed {
            entity: "ObjStm".to_string(),
            field: "First".to_string(),
        })?;

    if !(0..=1_000_000).contains(&n) || !(0..=10_000_000).contains(&first) {
        return Err(Error::Parse {
            offset: 0,
            reason: format!("implausible object stream header: N={} First={}", n, first),
        });
    }
    let n = n as usize;
    let first = first as usize;

    let decoded = stream_obj.decode_stream_data()?;
    if decoded.len() < first {
        return Err(Error::Parse {
            offset: 0,
            reason: format!("object stream shorter ({}) than /First ({})", decoded.len(), first),
        });
    }

    let pairs = parse_pair_table(&decoded[..first], n)?;
    let objects_data = &decoded[first..];
    let mut result = HashMap::with_capacity(pairs.len());

    for (obj_num, offset) in pairs {
        if offset >= objects_data.len() {
            log::warn!(
                "object {} offset {} beyond stream payload of {} bytes",
                obj_num,
                offset,
                objects_data.len()
            );
            continue;
        }
        match parse_object(&objects_data[offset..]) {
            Ok((_, obj)) => {
                result.insert(obj_num, obj);
            },
            Err(e) => {
                log::warn!("object {} in stream unparseable at offset {}: {:?}", obj_num, offset, e);
            },
        }
    }

    Ok(result)
}

/// Parse the leading `(objnum offset)*` integer pair table.
fn parse_pair_table(data: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let text = String::from_utf8_lossy(data);
    let numbers: Vec<i64> = text
        .split_ascii_whitespace()
        .map(|tok| {
            tok.parse::<i64>().map_err(|_| Error::Parse {
                offset: 0,
                reason: format!("non-integer {:?} in object stream pair table", tok),
            })
        })
        .collect::<Result<_>>()?;

    if numbers.len() < count * 2 {
        return Err(Error::Parse {
            offset: 0,
            reason: format!(
                "object stream pair table has {} integers, expected {}",
                numbers.len(),
                count * 2
            ),
        });
    }

    Ok(numbers
        .chunks(2)
        .take(count)
        .map(|pair| (pair[0] as u32, pair[1] as usize))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Dict;
    use bytes::Bytes;

    fn build_objstm(pairs: &str, objects: &str) -> Object {
        let first = pairs.len();
        let payload = format!("{}{}", pairs, objects);
        let n = pairs.split_ascii_whitespace().count() / 2;

        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::Name("ObjStm".to_string()));
        dict.insert("N".to_string(), Object::Integer(n as i64));
        dict.insert("First".to_string(), Object::Integer(first as i64));
        dict.insert("Length".to_string(), Object::Integer(payload.len() as i64));
        Object::Stream {
            dict,
            data: Bytes::from(payload.into_bytes()),
        }
    }

    #[test]
    fn test_parse_simple_object_stream() {
        let stm = build_objstm("10 0 11 15 ", "<< /A 1 >>     42");
        let objects = parse_object_stream(&stm).unwrap();
        assert_eq!(objects.len(), 2);
        assert!(objects.get(&10).unwrap().as_dict().is_some());
        assert_eq!(objects.get(&11).unwrap().as_integer(), Some(42));
    }

    #[test]
    fn test_offset_beyond_payload_skipped() {
        let stm = build_objstm("10 0 11 9999 ", "<< /A 1 >>");
        let objects = parse_object_stream(&stm).unwrap();
        assert_eq!(objects.len(), 1);
        assert!(objects.contains_key(&10));
    }

    #[test]
    fn test_missing_n_rejected() {
        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::Name("ObjStm".to_string()));
        dict.insert("First".to_string(), Object::Integer(0));
        let stm = Object::Stream {
            dict,
            data: Bytes::new(),
        };
        assert!(matches!(parse_object_stream(&stm), Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_not_a_stream_rejected() {
        assert!(parse_object_stream(&Object::Integer(1)).is_err());
    }

    #[test]
    fn test_short_pair_table_rejected() {
        let stm = build_objstm("10 ", "42");
        assert!(parse_object_stream(&stm).is_err());
    }
}
