//! Raw PDF object model.
//!
//! Objects form a tagged closed enumeration; new shapes of value are added
//! by extending the enum, never by subclassing. Dictionaries preserve
//! insertion order so that rewriting a document does not shuffle entries.

use bytes::Bytes;
use indexmap::IndexMap;

use crate::error::{Error, Result};

/// Ordered PDF dictionary.
pub type Dict = IndexMap<String, Object>;

/// Raw PDF object.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value (written without a decimal point)
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String bytes from a literal or hex string, escapes resolved
    String(Vec<u8>),
    /// Name with `#xx` escapes resolved
    Name(String),
    /// Ordered array of objects
    Array(Vec<Object>),
    /// Dictionary, insertion order preserved
    Dictionary(Dict),
    /// Stream: dictionary plus on-disk bytes (decoded on demand)
    Stream {
        /// Stream dictionary
        dict: Dict,
        /// Stored bytes exactly as they appear between `stream` and `endstream`
        data: Bytes,
    },
    /// Indirect object reference
    Reference(ObjectRef),
}

/// Cross-reference identity of an indirect object.
///
/// Generation monotonically increases on reuse; generation 65535 with
/// offset 0 terminates the free list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl Object {
    /// Human-readable type name without the data content.
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream { .. } => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to cast to a number, accepting both integer and real.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Works for both Dictionary and Stream.
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Mutable dictionary access for Dictionary and Stream objects.
    pub fn as_dict_mut(&mut self) -> Option<&mut Dict> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to cast to string bytes.
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Decode stream data using the filters named in the stream dictionary.
    ///
    /// Leading PDF whitespace is trimmed before decoding; some generators
    /// emit extra EOL bytes after the `stream` keyword.
    ///
    /// # Errors
    ///
    /// `Error::UnknownFilter` for unrecognised names, `Error::FilterError`
    /// on a decode fault, or an error when `self` is not a stream.
    pub fn decode_stream_data(&self) -> Result<Vec<u8>> {
        match self {
            Object::Stream { dict, data } => {
                let trimmed = trim_leading_stream_whitespace(data);

                let filters = dict
                    .get("Filter")
                    .map(extract_filter_names)
                    .unwrap_or_default();

                if filters.is_empty() {
                    return Ok(trimmed.to_vec());
                }

                let params = extract_decode_params(dict.get("DecodeParms"));
                crate::decoders::decode_stream_with_params(trimmed, &filters, params.as_ref())
            },
            _ => Err(Error::Parse {
                offset: 0,
                reason: format!("expected Stream, found {}", self.type_name()),
            }),
        }
    }
}

/// Trim leading PDF whitespace (NUL, HT, LF, FF, CR, SP) from stream data.
fn trim_leading_stream_whitespace(data: &[u8]) -> &[u8] {
    let mut start = 0;
    while start < data.len() {
        match data[start] {
            0x00 | 0x09 | 0x0A | 0x0C | 0x0D | 0x20 => start += 1,
            _ => break,
        }
    }
    &data[start..]
}

/// Extract filter names from a `/Filter` entry.
///
/// The entry can be a single name or an array of names applied in order.
pub(crate) fn extract_filter_names(filter_obj: &Object) -> Vec<String> {
    match filter_obj {
        Object::Name(name) => vec![name.clone()],
        Object::Array(arr) => arr
            .iter()
            .filter_map(|obj| obj.as_name().map(|s| s.to_string()))
            .collect(),
        _ => vec![],
    }
}

/// Extract predictor parameters from a `/DecodeParms` entry.
///
/// DecodeParms can be a dictionary, an array of dictionaries (one per
/// filter), or absent. Only the first dictionary carries predictor state
/// for the pipelines this engine decodes.
pub(crate) fn extract_decode_params(params_obj: Option<&Object>) -> Option<crate::decoders::DecodeParams> {
    let dict = match params_obj? {
        Object::Dictionary(d) => d,
        Object::Array(arr) => arr.iter().filter_map(|obj| obj.as_dict()).next()?,
        _ => return None,
    };

    let predictor = dict
        .get("Predictor")
        .and_then(|obj| obj.as_integer())
        .unwrap_or(1);

    let columns = dict
        .get("Columns")
        .and_then(|obj| obj.as_integer())
        .unwrap_or(1) as usize;

    let colors = dict
        .get("Colors")
        .and_then(|obj| obj.as_integer())
        .unwrap_or(1) as usize;

    let bits_per_component = dict
        .get("BitsPerComponent")
        .and_then(|obj| obj.as_integer())
        .unwrap_or(8) as usize;

    Some(crate::decoders::DecodeParams {
        predictor,
        columns,
        colors,
        bits_per_component,
    })
}
