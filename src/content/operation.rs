//! Content operations and their byte-level serialization.
//!
//! Content streams are postfix: operands come before their operator. An
//! operation keeps the operator string and the operand list; operand kinds
//! mirror raw object values, plus the inline-image operand synthesised for
//! `BI`/`ID`/`EI` sequences.

use std::io::Write;

use crate::object::{Dict, Object};
use crate::writer::serializer::ObjectSerializer;

/// Operator name of the synthesised inline-image operation.
pub const INLINE_IMAGE_OPERATOR: &str = "INLINE_IMAGE";

/// An inline image: abbreviated-key dictionary plus raw image bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    /// Key-value pairs between `BI` and `ID`
    pub dict: Dict,
    /// Bytes between `ID` and `EI`
    pub data: Vec<u8>,
}

/// One operand of a content operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Any raw object value (number, name, string, array, dict, ...)
    Value(Object),
    /// The single operand of an `INLINE_IMAGE` operation
    InlineImage(InlineImage),
}

impl Operand {
    /// The operand's object value, when it is one.
    pub fn as_value(&self) -> Option<&Object> {
        match self {
            Operand::Value(obj) => Some(obj),
            Operand::InlineImage(_) => None,
        }
    }

    /// Name operand shortcut.
    pub fn as_name(&self) -> Option<&str> {
        self.as_value().and_then(|o| o.as_name())
    }

    /// String operand shortcut.
    pub fn as_string(&self) -> Option<&[u8]> {
        self.as_value().and_then(|o| o.as_string())
    }
}

/// One content operation: operator string plus ordered operands.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Operator as written in the stream (`Tj`, `Do`, `cm`, ...)
    pub operator: String,
    /// Operands preceding the operator
    pub operands: Vec<Operand>,
}

impl Operation {
    /// Build an operation from object-valued operands.
    pub fn new(operator: impl Into<String>, operands: Vec<Object>) -> Self {
        Self {
            operator: operator.into(),
            operands: operands.into_iter().map(Operand::Value).collect(),
        }
    }

    /// Build the synthesised inline-image operation.
    pub fn inline_image(dict: Dict, data: Vec<u8>) -> Self {
        Self {
            operator: INLINE_IMAGE_OPERATOR.to_string(),
            operands: vec![Operand::InlineImage(InlineImage { dict, data })],
        }
    }
}

/// Serialize operations back to content-stream bytes.
///
/// Inline images are re-emitted as `BI <pairs> ID <data> EI` with the
/// single whitespace after `ID` the tokenizer consumed.
pub fn serialize_operations(operations: &[Operation]) -> Vec<u8> {
    let serializer = ObjectSerializer::new();
    let mut out = Vec::new();

    for op in operations {
        if op.operator == INLINE_IMAGE_OPERATOR {
            if let Some(Operand::InlineImage(image)) = op.operands.first() {
                out.extend_from_slice(b"BI");
                for (key, value) in &image.dict {
                    write!(out, " /{} ", key).unwrap();
                    serializer.write_object(&mut out, value).unwrap();
                }
                out.extend_from_slice(b" ID ");
                out.extend_from_slice(&image.data);
                out.extend_from_slice(b" EI\n");
            }
            continue;
        }

        for operand in &op.operands {
            if let Operand::Value(obj) = operand {
                serializer.write_object(&mut out, obj).unwrap();
                out.push(b' ');
            }
        }
        out.extend_from_slice(op.operator.as_bytes());
        out.push(b'\n');
    }

    out
}
