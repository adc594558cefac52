//! PDF object parser.
//!
//! Recursive descent over the lexer, producing raw `Object` values:
//! primitives, arrays, dictionaries, streams and indirect references.
//! An indirect reference is recognised by the `int int R` pattern with two
//! tokens of lookahead. A stream is a dictionary immediately followed by
//! the `stream` keyword; its byte span is captured verbatim and not decoded
//! here.

use crate::error::{Error, Result};
use crate::lexer::{Token, token};
use crate::object::{Dict, Object, ObjectRef};
use nom::IResult;

/// Decode escape sequences in a PDF literal string.
///
/// Handled sequences: `\n \r \t \b \f \( \) \\`, octal `\ddd` with 1-3
/// digits, and backslash-newline line continuations. Unknown escapes keep
/// the backslash literal.
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] == b'\\' && i + 1 < raw.len() {
            match raw[i + 1] {
                b'n' => {
                    result.push(b'\n');
                    i += 2;
                },
                b'r' => {
                    result.push(b'\r');
                    i += 2;
                },
                b't' => {
                    result.push(b'\t');
                    i += 2;
                },
                b'b' => {
                    result.push(8);
                    i += 2;
                },
                b'f' => {
                    result.push(12);
                    i += 2;
                },
                b'(' => {
                    result.push(b'(');
                    i += 2;
                },
                b')' => {
                    result.push(b')');
                    i += 2;
                },
                b'\\' => {
                    result.push(b'\\');
                    i += 2;
                },
                // Line continuation: backslash-EOL disappears
                b'\n' => {
                    i += 2;
                },
                b'\r' => {
                    i += 2;
                    if i < raw.len() && raw[i] == b'\n' {
                        i += 1;
                    }
                },
                c if (b'0'..b'8').contains(&c) => {
                    let start = i + 1;
                    let mut octal_value = 0u32;
                    let mut octal_len = 0;
                    for j in 0..3 {
                        match raw.get(start + j) {
                            Some(&d) if (b'0'..b'8').contains(&d) => {
                                octal_value = octal_value * 8 + (d - b'0') as u32;
                                octal_len += 1;
                            },
                            _ => break,
                        }
                    }
                    result.push((octal_value & 0xFF) as u8);
                    i += 1 + octal_len;
                },
                _ => {
                    result.push(b'\\');
                    i += 1;
                },
            }
        } else {
            result.push(raw[i]);
            i += 1;
        }
    }

    result
}

/// Parse a single PDF object from input bytes.
///
/// # Errors
///
/// Returns `Err` when the input does not start with a valid object, or a
/// nested structure is malformed beyond the lenient tolerances below
/// (unclosed arrays/dictionaries at end of input return what was read).
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    let (input, tok) = token(input)?;

    match tok {
        Token::Null => Ok((input, Object::Null)),
        Token::True => Ok((input, Object::Boolean(true))),
        Token::False => Ok((input, Object::Boolean(false))),

        Token::Integer(i) => {
            // `int int R` lookahead for an indirect reference
            if let Ok((input2, Token::Integer(gen))) = token(input) {
                if let Ok((input3, Token::R)) = token(input2) {
                    return Ok((input3, Object::Reference(ObjectRef::new(i as u32, gen as u16))));
                }
            }
            Ok((input, Object::Integer(i)))
        },

        Token::Real(r) => Ok((input, Object::Real(r))),

        Token::LiteralString(bytes) => {
            let decoded = decode_literal_string_escapes(bytes);
            Ok((input, Object::String(decoded)))
        },

        Token::HexString(hex_bytes) => match decode_hex(hex_bytes) {
            Ok(decoded) => Ok((input, Object::String(decoded))),
            Err(_) => {
                Err(nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Fail)))
            },
        },

        Token::Name(name) => Ok((input, Object::Name(name))),

        Token::ArrayOpen => parse_array(input),

        Token::DictOpen => {
            let (remaining, dict) = parse_dictionary(input)?;

            // A dictionary followed by `stream` is a stream object
            if let Ok((stream_input, Token::Stream)) = token(remaining) {
                let (final_input, stream_data) = parse_stream_data(stream_input, &dict)?;
                return Ok((
                    final_input,
                    Object::Stream {
                        dict,
                        data: bytes::Bytes::from(stream_data),
                    },
                ));
            }

            Ok((remaining, Object::Dictionary(dict)))
        },

        _ => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))),
    }
}

/// Capture the stream byte span after the `stream` keyword.
///
/// The keyword must be followed by CRLF or LF; a lone CR or no EOL at all
/// is tolerated with a warning. With a usable `/Length` the span is exactly
/// that many bytes; otherwise a scan for `endstream` bounds it, dropping
/// the EOL that precedes the keyword.
fn parse_stream_data<'a>(input: &'a [u8], dict: &Dict) -> IResult<&'a [u8], Vec<u8>> {
    let input = if input.starts_with(b"\r\n") {
        &input[2..]
    } else if input.starts_with(b"\n") {
        &input[1..]
    } else if input.starts_with(b"\r") {
        log::warn!("stream keyword followed by CR alone; accepting leniently");
        &input[1..]
    } else {
        log::warn!("no EOL after stream keyword; accepting leniently");
        input
    };

    if let Some(length) = dict.get("Length").and_then(|o| o.as_integer()) {
        let length = length as usize;
        if input.len() >= length {
            let candidate = &input[length..];
            // Trust /Length only if endstream actually follows
            let (after_ws, _) =
                nom::bytes::complete::take_while::<_, _, nom::error::Error<&[u8]>>(
                    crate::lexer::is_pdf_whitespace,
                )(candidate)?;
            if after_ws.starts_with(b"endstream") {
                let stream_data = input[..length].to_vec();
                let (remaining, _) = token(after_ws)?;
                return Ok((remaining, stream_data));
            }
            log::warn!("/Length {} does not land on endstream; falling back to scan", length);
        }
    }

    // Missing or wrong /Length: bound the span by scanning for `endstream`
    if let Some(pos) = find_endstream(input) {
        let mut end = pos;
        // The EOL before endstream is not part of the data
        if end > 0 && input[end - 1] == b'\n' {
            end -= 1;
            if end > 0 && input[end - 1] == b'\r' {
                end -= 1;
            }
        } else if end > 0 && input[end - 1] == b'\r' {
            end -= 1;
        }
        let stream_data = input[..end].to_vec();
        let remaining = &input[pos..];
        let (remaining, _) = token(remaining)?;
        return Ok((remaining, stream_data));
    }

    Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Eof)))
}

fn find_endstream(input: &[u8]) -> Option<usize> {
    let keyword = b"endstream";
    input
        .windows(keyword.len())
        .position(|window| window == keyword)
}

/// Parse `obj1 obj2 ... ]` after the opening bracket was consumed.
///
/// Unclosed arrays at end of input return the elements read so far.
fn parse_array(input: &[u8]) -> IResult<&[u8], Object> {
    let mut objects = Vec::new();
    let mut remaining = input;

    loop {
        match token(remaining) {
            Ok((inp, Token::ArrayClose)) => return Ok((inp, Object::Array(objects))),
            Ok(_) => match parse_object(remaining) {
                Ok((inp, obj)) => {
                    objects.push(obj);
                    remaining = inp;
                },
                Err(e) => {
                    if remaining.is_empty() {
                        return Ok((remaining, Object::Array(objects)));
                    }
                    return Err(e);
                },
            },
            Err(nom::Err::Incomplete(_)) | Err(nom::Err::Error(_)) if remaining.is_empty() => {
                return Ok((remaining, Object::Array(objects)));
            },
            Err(e) => return Err(e),
        }
    }
}

/// Parse `/Key value ... >>` after the opening `<<` was consumed.
///
/// Keys must be names. Insertion order is kept. Unclosed dictionaries at
/// end of input return the entries read so far.
fn parse_dictionary(input: &[u8]) -> IResult<&[u8], Dict> {
    let mut dict = Dict::new();
    let mut remaining = input;

    loop {
        match token(remaining) {
            Ok((inp, Token::DictClose)) => return Ok((inp, dict)),
            Ok((inp, Token::Name(key))) => match parse_object(inp) {
                Ok((inp, value)) => {
                    dict.insert(key, value);
                    remaining = inp;
                },
                Err(e) => {
                    if inp.is_empty() {
                        return Ok((inp, dict));
                    }
                    return Err(e);
                },
            },
            Ok(_) => {
                if remaining.is_empty() {
                    return Ok((remaining, dict));
                }
                return Err(nom::Err::Error(nom::error::Error::new(
                    remaining,
                    nom::error::ErrorKind::Tag,
                )));
            },
            Err(nom::Err::Incomplete(_)) | Err(nom::Err::Error(_)) if remaining.is_empty() => {
                return Ok((remaining, dict));
            },
            Err(e) => return Err(e),
        }
    }
}

/// Decode a hex string to bytes.
///
/// Whitespace is ignored; a trailing odd nibble is padded with 0.
pub fn decode_hex(hex_bytes: &[u8]) -> Result<Vec<u8>> {
    let hex_str: Vec<u8> = hex_bytes
        .iter()
        .filter(|&&c| !crate::lexer::is_pdf_whitespace(c))
        .copied()
        .collect();

    if hex_str.is_empty() {
        return Ok(Vec::new());
    }

    let mut result = Vec::with_capacity(hex_str.len() / 2 + 1);
    for chunk in hex_str.chunks(2) {
        let hi = hex_digit(chunk[0]).ok_or_else(|| Error::Parse {
            offset: 0,
            reason: format!("invalid hex digit: {:?}", chunk[0] as char),
        })?;
        let lo = match chunk.get(1) {
            Some(&c) => hex_digit(c).ok_or_else(|| Error::Parse {
                offset: 0,
                reason: format!("invalid hex digit: {:?}", c as char),
            })?,
            None => 0, // odd nibble padded with 0
        };
        result.push((hi << 4) | lo);
    }

    Ok(result)
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Primitive Types
    // ========================================================================

    #[test]
    fn test_parse_primitives() {
        assert_eq!(parse_object(b"null").unwrap().1, Object::Null);
        assert_eq!(parse_object(b"true").unwrap().1, Object::Boolean(true));
        assert_eq!(parse_object(b"false").unwrap().1, Object::Boolean(false));
        assert_eq!(parse_object(b"-123").unwrap().1, Object::Integer(-123));
        assert_eq!(parse_object(b"2.5").unwrap().1, Object::Real(2.5));
        assert_eq!(parse_object(b"/Type").unwrap().1, Object::Name("Type".to_string()));
    }

    #[test]
    fn test_parse_literal_string() {
        let (rest, obj) = parse_object(b"(Hello World)").unwrap();
        assert!(rest.is_empty());
        assert_eq!(obj, Object::String(b"Hello World".to_vec()));
    }

    // ========================================================================
    // Escape Sequences
    // ========================================================================

    #[test]
    fn test_escape_sequences() {
        assert_eq!(
            parse_object(b"(Line1\\nLine2)").unwrap().1,
            Object::String(b"Line1\nLine2".to_vec())
        );
        assert_eq!(
            parse_object(b"(Open \\( Close \\))").unwrap().1,
            Object::String(b"Open ( Close )".to_vec())
        );
        assert_eq!(
            parse_object(b"(Path\\\\to)").unwrap().1,
            Object::String(b"Path\\to".to_vec())
        );
    }

    #[test]
    fn test_octal_escapes() {
        // \247 = 0xA7 (section sign)
        assert_eq!(
            parse_object(b"(Section \\247)").unwrap().1,
            Object::String(b"Section \xa7".to_vec())
        );
        // \53 = '+'
        assert_eq!(parse_object(b"(Plus \\53)").unwrap().1, Object::String(b"Plus +".to_vec()));
        // \128 = \12 then literal '8'
        assert_eq!(
            parse_object(b"(Value \\128)").unwrap().1,
            Object::String(b"Value \n8".to_vec())
        );
    }

    #[test]
    fn test_line_continuation() {
        assert_eq!(
            parse_object(b"(This is a long \\\nstring)").unwrap().1,
            Object::String(b"This is a long string".to_vec())
        );
    }

    // ========================================================================
    // Hex Strings
    // ========================================================================

    #[test]
    fn test_hex_strings() {
        assert_eq!(parse_object(b"<48656C6C6F>").unwrap().1, Object::String(b"Hello".to_vec()));
        assert_eq!(
            parse_object(b"<48 65 6C 6C 6F>").unwrap().1,
            Object::String(b"Hello".to_vec())
        );
        // Odd nibble pads with 0: ABC -> AB C0
        assert_eq!(parse_object(b"<ABC>").unwrap().1, Object::String(vec![0xAB, 0xC0]));
    }

    #[test]
    fn test_decode_hex_directly() {
        assert_eq!(decode_hex(b"48656C6C6F").unwrap(), b"Hello");
        assert_eq!(decode_hex(b"").unwrap(), b"");
        assert_eq!(decode_hex(b"ABC").unwrap(), vec![0xAB, 0xC0]);
        assert!(decode_hex(b"XY").is_err());
    }

    // ========================================================================
    // References
    // ========================================================================

    #[test]
    fn test_indirect_reference() {
        assert_eq!(
            parse_object(b"10 0 R").unwrap().1,
            Object::Reference(ObjectRef::new(10, 0))
        );
        assert_eq!(parse_object(b"42 5 R").unwrap().1, Object::Reference(ObjectRef::new(42, 5)));
        // Bare integer does not become a reference
        assert_eq!(parse_object(b"10").unwrap().1, Object::Integer(10));
    }

    // ========================================================================
    // Arrays and Dictionaries
    // ========================================================================

    #[test]
    fn test_arrays() {
        assert_eq!(parse_object(b"[]").unwrap().1, Object::Array(vec![]));
        assert_eq!(
            parse_object(b"[ 1 [ 2 3 ] /N ]").unwrap().1,
            Object::Array(vec![
                Object::Integer(1),
                Object::Array(vec![Object::Integer(2), Object::Integer(3)]),
                Object::Name("N".to_string()),
            ])
        );
        assert_eq!(
            parse_object(b"[ 10 0 R 20 0 R ]").unwrap().1,
            Object::Array(vec![
                Object::Reference(ObjectRef::new(10, 0)),
                Object::Reference(ObjectRef::new(20, 0)),
            ])
        );
    }

    #[test]
    fn test_dictionaries() {
        let (_, obj) = parse_object(b"<< /Type /Page /Count 3 >>").unwrap();
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get("Type").unwrap().as_name(), Some("Page"));
        assert_eq!(dict.get("Count").unwrap().as_integer(), Some(3));
    }

    #[test]
    fn test_dictionary_insertion_order() {
        let (_, obj) = parse_object(b"<< /Zeta 1 /Alpha 2 >>").unwrap();
        let keys: Vec<&str> = obj.as_dict().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["Zeta", "Alpha"]);
    }

    #[test]
    fn test_nested_dictionaries() {
        let (_, obj) = parse_object(b"<< /Outer << /Inner /Value >> >>").unwrap();
        let dict = obj.as_dict().unwrap();
        let inner = dict.get("Outer").unwrap().as_dict().unwrap();
        assert_eq!(inner.get("Inner").unwrap().as_name(), Some("Value"));
    }

    // ========================================================================
    // Streams
    // ========================================================================

    #[test]
    fn test_stream_with_length() {
        let input = b"<< /Length 5 >>\nstream\nHello\nendstream";
        let (rest, obj) = parse_object(input).unwrap();
        assert!(rest.is_empty());
        match obj {
            Object::Stream { dict, data } => {
                assert_eq!(dict.get("Length").unwrap().as_integer(), Some(5));
                assert_eq!(&data[..], b"Hello");
            },
            other => panic!("expected stream, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_stream_crlf_after_keyword() {
        let input = b"<< /Length 3 >>\nstream\r\nabc\nendstream";
        let (_, obj) = parse_object(input).unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"abc"),
            _ => panic!("expected stream"),
        }
    }

    #[test]
    fn test_stream_missing_length_scans_for_endstream() {
        let input = b"<< /Type /XObject >>\nstream\nsome data\nendstream";
        let (_, obj) = parse_object(input).unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"some data"),
            _ => panic!("expected stream"),
        }
    }

    #[test]
    fn test_stream_wrong_length_falls_back() {
        let input = b"<< /Length 999 >>\nstream\nshort\nendstream";
        let (_, obj) = parse_object(input).unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"short"),
            _ => panic!("expected stream"),
        }
    }

    // ========================================================================
    // Lenient Edge Cases
    // ========================================================================

    #[test]
    fn test_unclosed_array_returns_partial() {
        let (_, obj) = parse_object(b"[ 1 2 3").unwrap();
        assert_eq!(obj.as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_unclosed_dictionary_returns_partial() {
        let (_, obj) = parse_object(b"<< /Type /Page").unwrap();
        assert_eq!(obj.as_dict().unwrap().get("Type").and_then(|o| o.as_name()), Some("Page"));
    }

    #[test]
    fn test_dictionary_non_name_key_fails() {
        assert!(parse_object(b"<< 123 /Value >>").is_err());
    }
}
