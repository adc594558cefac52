//! PDF object serialization.
//!
//! Serializes raw objects to their byte syntax. In deterministic mode
//! dictionary entries are emitted in lexicographic key order; otherwise
//! insertion order is kept, which preserves the layout of round-tripped
//! documents.

use std::io::Write;

use crate::object::{Dict, Object};

/// Serializer for PDF objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectSerializer {
    /// Sort dictionary keys lexicographically for byte-stable output
    deterministic: bool,
}

impl ObjectSerializer {
    /// Serializer that keeps dictionary insertion order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializer with canonical (sorted) dictionary ordering.
    pub fn deterministic() -> Self {
        Self {
            deterministic: true,
        }
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj).unwrap();
        buf
    }

    /// Serialize to a string, for assertions and debugging.
    pub fn serialize_to_string(&self, obj: &Object) -> String {
        String::from_utf8_lossy(&self.serialize(obj)).to_string()
    }

    /// Serialize an indirect object definition:
    /// `{id} {gen} obj\n{object}\nendobj\n`.
    pub fn serialize_indirect(&self, id: u32, gen: u16, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        writeln!(buf, "{} {} obj", id, gen).unwrap();
        self.write_object(&mut buf, obj).unwrap();
        write!(buf, "\nendobj\n").unwrap();
        buf
    }

    /// Write an object to a buffer.
    pub fn write_object<W: Write>(&self, w: &mut W, obj: &Object) -> std::io::Result<()> {
        match obj {
            Object::Null => write!(w, "null"),
            Object::Boolean(b) => write!(w, "{}", if *b { "true" } else { "false" }),
            Object::Integer(i) => write!(w, "{}", i),
            Object::Real(r) => self.write_real(w, *r),
            Object::String(s) => self.write_string(w, s),
            Object::Name(n) => self.write_name(w, n),
            Object::Array(arr) => self.write_array(w, arr),
            Object::Dictionary(dict) => self.write_dictionary(w, dict),
            Object::Stream { dict, data } => self.write_stream(w, dict, data),
            Object::Reference(r) => write!(w, "{} {} R", r.id, r.gen),
        }
    }

    /// Real numbers print with up to five decimals, trailing zeros trimmed.
    fn write_real<W: Write>(&self, w: &mut W, value: f64) -> std::io::Result<()> {
        if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            write!(w, "{}", value as i64)
        } else {
            let formatted = format!("{:.5}", value);
            let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
            write!(w, "{}", trimmed)
        }
    }

    /// Strings use literal syntax when printable, hex syntax otherwise.
    fn write_string<W: Write>(&self, w: &mut W, data: &[u8]) -> std::io::Result<()> {
        let is_printable = data
            .iter()
            .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

        if is_printable {
            write!(w, "(")?;
            for &byte in data {
                match byte {
                    b'(' => write!(w, "\\(")?,
                    b')' => write!(w, "\\)")?,
                    b'\\' => write!(w, "\\\\")?,
                    b'\n' => write!(w, "\\n")?,
                    b'\r' => write!(w, "\\r")?,
                    b'\t' => write!(w, "\\t")?,
                    _ => w.write_all(&[byte])?,
                }
            }
            write!(w, ")")
        } else {
            write!(w, "<")?;
            for byte in data {
                write!(w, "{:02X}", byte)?;
            }
            write!(w, ">")
        }
    }

    /// Names escape delimiter and non-regular bytes as `#xx`.
    fn write_name<W: Write>(&self, w: &mut W, name: &str) -> std::io::Result<()> {
        write!(w, "/")?;
        for byte in name.bytes() {
            let regular = (0x21..=0x7E).contains(&byte)
                && !matches!(byte, b'#' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%');
            if regular {
                w.write_all(&[byte])?;
            } else {
                write!(w, "#{:02X}", byte)?;
            }
        }
        Ok(())
    }

    fn write_array<W: Write>(&self, w: &mut W, arr: &[Object]) -> std::io::Result<()> {
        write!(w, "[")?;
        for (i, obj) in arr.iter().enumerate() {
            if i > 0 {
                write!(w, " ")?;
            }
            self.write_object(w, obj)?;
        }
        write!(w, "]")
    }

    fn write_dictionary<W: Write>(&self, w: &mut W, dict: &Dict) -> std::io::Result<()> {
        write!(w, "<<")?;

        let mut keys: Vec<&String> = dict.keys().collect();
        if self.deterministic {
            keys.sort();
        }

        for key in keys {
            write!(w, " ")?;
            self.write_name(w, key)?;
            write!(w, " ")?;
            self.write_object(w, &dict[key.as_str()])?;
        }

        write!(w, " >>")
    }

    /// Streams always carry a `/Length` matching the stored bytes.
    fn write_stream<W: Write>(&self, w: &mut W, dict: &Dict, data: &[u8]) -> std::io::Result<()> {
        let mut dict_with_length = dict.clone();
        dict_with_length.insert("Length".to_string(), Object::Integer(data.len() as i64));

        self.write_dictionary(w, &dict_with_length)?;
        write!(w, "\nstream\n")?;
        w.write_all(data)?;
        write!(w, "\nendstream")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectRef;

    #[test]
    fn test_serialize_primitives() {
        let s = ObjectSerializer::new();
        assert_eq!(s.serialize_to_string(&Object::Null), "null");
        assert_eq!(s.serialize_to_string(&Object::Boolean(true)), "true");
        assert_eq!(s.serialize_to_string(&Object::Integer(-123)), "-123");
        assert_eq!(s.serialize_to_string(&Object::Real(1.0)), "1");
        assert_eq!(s.serialize_to_string(&Object::Real(0.5)), "0.5");
        assert_eq!(s.serialize_to_string(&Object::Real(3.14258)), "3.14258");
    }

    #[test]
    fn test_serialize_strings() {
        let s = ObjectSerializer::new();
        assert_eq!(s.serialize_to_string(&Object::String(b"Hello".to_vec())), "(Hello)");
        assert_eq!(
            s.serialize_to_string(&Object::String(b"Test (parens)".to_vec())),
            "(Test \\(parens\\))"
        );
        assert_eq!(s.serialize_to_string(&Object::String(vec![0x00, 0xFF, 0x80])), "<00FF80>");
    }

    #[test]
    fn test_serialize_names() {
        let s = ObjectSerializer::new();
        assert_eq!(s.serialize_to_string(&Object::Name("Type".to_string())), "/Type");
        assert_eq!(
            s.serialize_to_string(&Object::Name("Name With Space".to_string())),
            "/Name#20With#20Space"
        );
    }

    #[test]
    fn test_serialize_array_and_reference() {
        let s = ObjectSerializer::new();
        let arr = Object::Array(vec![
            Object::Integer(1),
            Object::Reference(ObjectRef::new(10, 0)),
        ]);
        assert_eq!(s.serialize_to_string(&arr), "[1 10 0 R]");
    }

    #[test]
    fn test_dictionary_order_modes() {
        let mut dict = Dict::new();
        dict.insert("Zeta".to_string(), Object::Integer(1));
        dict.insert("Alpha".to_string(), Object::Integer(2));

        let keep = ObjectSerializer::new();
        assert_eq!(
            keep.serialize_to_string(&Object::Dictionary(dict.clone())),
            "<< /Zeta 1 /Alpha 2 >>"
        );

        let canonical = ObjectSerializer::deterministic();
        assert_eq!(
            canonical.serialize_to_string(&Object::Dictionary(dict)),
            "<< /Alpha 2 /Zeta 1 >>"
        );
    }

    #[test]
    fn test_serialize_stream_sets_length() {
        let s = ObjectSerializer::new();
        let stream = Object::Stream {
            dict: Dict::new(),
            data: bytes::Bytes::from_static(b"stream data"),
        };
        let out = s.serialize_to_string(&stream);
        assert!(out.contains("/Length 11"));
        assert!(out.contains("stream\nstream data\nendstream"));
    }

    #[test]
    fn test_serialize_indirect() {
        let s = ObjectSerializer::new();
        let out = String::from_utf8(s.serialize_indirect(7, 0, &Object::Integer(42))).unwrap();
        assert_eq!(out, "7 0 obj\n42\nendobj\n");
    }

    #[test]
    fn test_deterministic_output_is_stable() {
        let mut dict = Dict::new();
        dict.insert("B".to_string(), Object::Integer(1));
        dict.insert("A".to_string(), Object::Array(vec![Object::Real(2.5)]));
        let obj = Object::Dictionary(dict);

        let s = ObjectSerializer::deterministic();
        assert_eq!(s.serialize(&obj), s.serialize(&obj));
    }
}
