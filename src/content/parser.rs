//! Content-stream tokenizer and operator parser.
//!
//! Content streams are postfix: operands accumulate until an operator
//! name flushes them into an operation. The parser is resilient to
//! malformed streams: an unparseable byte is skipped rather than aborting
//! the page.
//!
//! Inline images get special handling: `BI` buffers key-value pairs into a
//! dict until `ID`, a single whitespace byte is consumed, and everything
//! up to the next `EI` at a token boundary becomes the image data.

use crate::content::operation::Operation;
use crate::error::Result;
use crate::lexer::{is_pdf_delimiter, is_pdf_whitespace};
use crate::object::{Dict, Object};
use crate::parser::parse_object;
use nom::IResult;

/// Parse a decoded content-stream byte slice into ordered operations.
pub fn parse_operations(data: &[u8]) -> Result<Vec<Operation>> {
    let mut operations = Vec::new();
    let mut input = data;

    while !input.is_empty() {
        input = skip_stream_whitespace(input);
        if input.is_empty() {
            break;
        }

        match parse_one(input) {
            Ok((rest, op)) => {
                operations.push(op);
                input = rest;
            },
            Err(_) => {
                // Lenient: skip the offending byte and resynchronise
                input = &input[1..];
            },
        }
    }

    Ok(operations)
}

fn skip_stream_whitespace(input: &[u8]) -> &[u8] {
    let start = input
        .iter()
        .position(|&c| !is_pdf_whitespace(c))
        .unwrap_or(input.len());
    &input[start..]
}

/// Parse operands up to and including one operator.
fn parse_one(input: &[u8]) -> IResult<&[u8], Operation> {
    let mut operands: Vec<Object> = Vec::new();
    let mut remaining = input;

    loop {
        remaining = skip_stream_whitespace(remaining);
        if remaining.is_empty() {
            return Err(nom::Err::Error(nom::error::Error::new(
                remaining,
                nom::error::ErrorKind::Eof,
            )));
        }

        if is_operator_start(remaining[0]) {
            let (rest, name) = parse_operator_name(remaining)?;

            // Keyword operands share the operator alphabet
            match name {
                "true" => {
                    operands.push(Object::Boolean(true));
                    remaining = rest;
                    continue;
                },
                "false" => {
                    operands.push(Object::Boolean(false));
                    remaining = rest;
                    continue;
                },
                "null" => {
                    operands.push(Object::Null);
                    remaining = rest;
                    continue;
                },
                "BI" => return parse_inline_image(rest),
                _ => {},
            }

            return Ok((rest, Operation::new(name, operands)));
        }

        let (rest, obj) = parse_object(remaining)?;
        operands.push(obj);
        remaining = rest;
    }
}

/// Operators start with a letter, `'`, `"` or `*`.
fn is_operator_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'\'' || byte == b'"' || byte == b'*'
}

fn parse_operator_name(input: &[u8]) -> IResult<&[u8], &str> {
    let end = input
        .iter()
        .position(|&c| !(c.is_ascii_alphanumeric() || c == b'\'' || c == b'"' || c == b'*'))
        .unwrap_or(input.len());
    if end == 0 {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Alpha)));
    }
    let name = std::str::from_utf8(&input[..end])
        .map_err(|_| nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Char)))?;
    Ok((&input[end..], name))
}

/// Parse `BI <pairs> ID <data> EI` after `BI` was consumed.
fn parse_inline_image(input: &[u8]) -> IResult<&[u8], Operation> {
    let mut dict = Dict::new();
    let mut remaining = input;

    // Key-value pairs until ID
    loop {
        remaining = skip_stream_whitespace(remaining);
        if remaining.is_empty() {
            return Err(nom::Err::Error(nom::error::Error::new(
                remaining,
                nom::error::ErrorKind::Eof,
            )));
        }

        if remaining.len() >= 2
            && &remaining[0..2] == b"ID"
            && (remaining.len() == 2 || is_pdf_whitespace(remaining[2]))
        {
            remaining = &remaining[2..];
            break;
        }

        let (rest, key_obj) = parse_object(remaining)?;
        let (rest, value_obj) = parse_object(skip_stream_whitespace(rest))?;
        if let Some(key) = key_obj.as_name() {
            dict.insert(key.to_string(), value_obj);
        }
        remaining = rest;
    }

    // ID is followed by exactly one whitespace byte, then raw data
    if remaining.first().is_some_and(|&c| is_pdf_whitespace(c)) {
        remaining = &remaining[1..];
    }

    let ei_pos = find_ei(remaining).ok_or(nom::Err::Error(nom::error::Error::new(
        remaining,
        nom::error::ErrorKind::Tag,
    )))?;

    // One whitespace byte separates the data from EI
    let mut data_end = ei_pos;
    if data_end > 0 && is_pdf_whitespace(remaining[data_end - 1]) {
        data_end -= 1;
    }
    let data = remaining[..data_end].to_vec();
    let remaining = &remaining[ei_pos + 2..];

    Ok((remaining, Operation::inline_image(dict, data)))
}

/// Find `EI` at a token boundary: preceded by whitespace (or data start)
/// and followed by whitespace, a delimiter or end of stream.
fn find_ei(input: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i + 2 <= input.len() {
        if &input[i..i + 2] == b"EI"
            && (i == 0 || is_pdf_whitespace(input[i - 1]))
            && (i + 2 == input.len()
                || is_pdf_whitespace(input[i + 2])
                || is_pdf_delimiter(input[i + 2]))
        {
            return Some(i);
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::operation::{INLINE_IMAGE_OPERATOR, Operand};

    #[test]
    fn test_parse_simple_text() {
        let ops = parse_operations(b"BT /F1 12 Tf 100 700 Td (Hello) Tj ET").unwrap();
        assert_eq!(ops.len(), 5);
        assert_eq!(ops[0].operator, "BT");
        assert_eq!(ops[1].operator, "Tf");
        assert_eq!(ops[1].operands[0].as_name(), Some("F1"));
        assert_eq!(
            ops[1].operands[1].as_value().and_then(|o| o.as_integer()),
            Some(12)
        );
        assert_eq!(ops[3].operator, "Tj");
        assert_eq!(ops[3].operands[0].as_string(), Some(&b"Hello"[..]));
        assert_eq!(ops[4].operator, "ET");
    }

    #[test]
    fn test_parse_postfix_numbers() {
        let ops = parse_operations(b"1 0 0 1 100 200 cm").unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operator, "cm");
        assert_eq!(ops[0].operands.len(), 6);
    }

    #[test]
    fn test_parse_tj_array() {
        let ops = parse_operations(b"[(Hello) -100 (World)] TJ").unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operator, "TJ");
        let array = ops[0].operands[0]
            .as_value()
            .and_then(|o| o.as_array())
            .unwrap();
        assert_eq!(array.len(), 3);
        assert_eq!(array[1].as_integer(), Some(-100));
    }

    #[test]
    fn test_parse_star_and_quote_operators() {
        let ops = parse_operations(b"T* (x) ' 1 0.5 (y) \"").unwrap();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].operator, "T*");
        assert_eq!(ops[1].operator, "'");
        assert_eq!(ops[2].operator, "\"");
        assert_eq!(ops[2].operands.len(), 3);
    }

    #[test]
    fn test_keyword_operands_are_not_operators() {
        let ops = parse_operations(b"/OC true gs").unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operator, "gs");
        assert_eq!(ops[0].operands.len(), 2);
        assert_eq!(
            ops[0].operands[1].as_value().and_then(|o| o.as_bool()),
            Some(true)
        );
    }

    #[test]
    fn test_inline_image_tokenising() {
        // The literal stream from the engine's contract
        let stream = b"q\nBI\n/W 10 /H 10 /BPC 8 /CS /RGB\nID \x00\x01\x02\x03\nEI\nQ";
        let ops = parse_operations(stream).unwrap();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].operator, "q");
        assert_eq!(ops[2].operator, "Q");

        assert_eq!(ops[1].operator, INLINE_IMAGE_OPERATOR);
        match &ops[1].operands[0] {
            Operand::InlineImage(image) => {
                assert_eq!(image.dict.get("W").unwrap().as_integer(), Some(10));
                assert_eq!(image.dict.get("H").unwrap().as_integer(), Some(10));
                assert_eq!(image.dict.get("BPC").unwrap().as_integer(), Some(8));
                assert_eq!(image.dict.get("CS").unwrap().as_name(), Some("RGB"));
                assert_eq!(image.data, vec![0x00, 0x01, 0x02, 0x03]);
            },
            other => panic!("expected inline image operand, got {:?}", other),
        }
    }

    #[test]
    fn test_inline_image_data_containing_ei_bytes() {
        // "EI" inside the data is not at a token boundary (no leading ws)
        let stream = b"BI /W 1 ID xEIx EI Q";
        let ops = parse_operations(stream).unwrap();
        assert_eq!(ops.len(), 2);
        match &ops[0].operands[0] {
            Operand::InlineImage(image) => assert_eq!(image.data, b"xEIx"),
            _ => panic!("expected inline image"),
        }
    }

    #[test]
    fn test_empty_and_whitespace_streams() {
        assert!(parse_operations(b"").unwrap().is_empty());
        assert!(parse_operations(b"  \n\t ").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_bytes_skipped() {
        let ops = parse_operations(b"q ) Q").unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].operator, "q");
        assert_eq!(ops[1].operator, "Q");
    }
}
