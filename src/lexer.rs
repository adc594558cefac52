//! PDF lexer (tokenizer).
//!
//! Single-pass tokenization of PDF byte streams. Recognized token kinds:
//! numbers (integer and real kept apart), literal and hex strings, names,
//! the boolean/null keywords, array and dictionary delimiters, the object
//! and stream markers, and the xref-layer keywords (`xref`, `trailer`,
//! `startxref`) so the cross-reference resolver shares this lexer.
//!
//! Whitespace is NUL, HT, LF, FF, CR and SP; comments run from `%` to end
//! of line. `<<` and `>>` are matched before single `<`/`>`.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_till, take_while},
    character::complete::{char, digit1, one_of},
    combinator::{map, opt, value},
    sequence::{delimited, preceded},
};

/// Token kinds produced by the lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (no decimal point in the source)
    Integer(i64),
    /// Real number (decimal point present in the source)
    Real(f64),
    /// Literal string content, escapes not yet decoded
    LiteralString(&'a [u8]),
    /// Hex string content, whitespace preserved, not yet decoded
    HexString(&'a [u8]),
    /// Name with `#xx` escapes already decoded
    Name(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `[`
    ArrayOpen,
    /// `]`
    ArrayClose,
    /// `<<`
    DictOpen,
    /// `>>`
    DictClose,
    /// `obj`
    Obj,
    /// `endobj`
    EndObj,
    /// `stream`
    Stream,
    /// `endstream`
    EndStream,
    /// `xref`
    Xref,
    /// `trailer`
    Trailer,
    /// `startxref`
    StartXref,
    /// `R` reference marker
    R,
}

/// PDF whitespace: NUL, HT, LF, FF, CR, SP.
pub(crate) fn is_pdf_whitespace(c: u8) -> bool {
    matches!(c, 0x00 | 0x09 | 0x0A | 0x0C | 0x0D | 0x20)
}

/// PDF delimiter characters.
pub(crate) fn is_pdf_delimiter(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn whitespace(input: &[u8]) -> IResult<&[u8], ()> {
    let (remaining, ws) = take_while(is_pdf_whitespace)(input)?;
    if ws.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Space)));
    }
    Ok((remaining, ()))
}

fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip whitespace and comments before a token.
pub(crate) fn skip_ws(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let mut remaining = input;
    loop {
        if let Ok((rest, _)) = whitespace(remaining) {
            remaining = rest;
            continue;
        }
        if let Ok((rest, _)) = comment(remaining) {
            remaining = rest;
            continue;
        }
        break;
    }
    Ok((remaining, input))
}

/// Parse an integer or real number.
///
/// Accepts a leading sign and a bare decimal point on either side
/// (`.5`, `5.`, `-.002`). Values with no `.` parse to exact integer form.
fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (input, sign) = opt(one_of("+-"))(input)?;
    let (input, int_part) = opt(digit1)(input)?;
    let (input, frac_part) = opt(preceded(char('.'), opt(digit1)))(input)?;

    if int_part.is_none() && frac_part.is_none() {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit)));
    }

    let digit_err = || nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit));

    if frac_part.is_some() {
        let mut num_str = String::new();
        if sign == Some('-') {
            num_str.push('-');
        }
        match int_part {
            Some(int) => num_str.push_str(std::str::from_utf8(int).map_err(|_| digit_err())?),
            None => num_str.push('0'),
        }
        num_str.push('.');
        if let Some(Some(frac)) = frac_part {
            num_str.push_str(std::str::from_utf8(frac).map_err(|_| digit_err())?);
        } else {
            num_str.push('0');
        }
        let num: f64 = num_str.parse().map_err(|_| digit_err())?;
        Ok((input, Token::Real(num)))
    } else {
        let int_bytes = int_part.ok_or_else(digit_err)?;
        let int_str = std::str::from_utf8(int_bytes).map_err(|_| digit_err())?;
        let mut num: i64 = int_str.parse().map_err(|_| digit_err())?;
        if sign == Some('-') {
            num = -num;
        }
        Ok((input, Token::Integer(num)))
    }
}

/// Parse a literal string, tracking balanced parentheses.
///
/// Escape sequences are skipped over but not decoded here; the object
/// parser expands them.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (mut remaining, _) = char('(')(input)?;
    let mut depth = 1;
    let mut pos = 0;

    while depth > 0 && pos < remaining.len() {
        match remaining[pos] {
            b'\\' => {
                pos += 1;
                if pos < remaining.len() {
                    if remaining[pos].is_ascii_digit() {
                        // 1-3 octal digits
                        pos += 1;
                        if pos < remaining.len() && remaining[pos].is_ascii_digit() {
                            pos += 1;
                        }
                        if pos < remaining.len() && remaining[pos].is_ascii_digit() {
                            pos += 1;
                        }
                    } else {
                        pos += 1;
                    }
                }
            },
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                pos += 1;
            },
            _ => pos += 1,
        }
    }

    if depth != 0 {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }

    let content = &remaining[..pos - 1];
    remaining = &remaining[pos..];
    Ok((remaining, Token::LiteralString(content)))
}

/// Parse a hex string. Must not fire on `<<`.
fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.len() >= 2 && input[0] == b'<' && input[1] == b'<' {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }

    delimited(
        char('<'),
        map(
            take_while(|c: u8| c.is_ascii_hexdigit() || is_pdf_whitespace(c)),
            Token::HexString,
        ),
        char('>'),
    )(input)
}

/// Decode `#XX` escape sequences in a PDF name.
///
/// Invalid sequences (`#` at the end, non-hex digits) keep the `#` literal.
pub fn decode_name_escapes(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '#' {
            let hex1 = chars.next();
            let hex2 = chars.next();
            if let (Some(h1), Some(h2)) = (hex1, hex2) {
                let hex_str = format!("{}{}", h1, h2);
                if let Ok(byte) = u8::from_str_radix(&hex_str, 16) {
                    result.push(byte as char);
                    continue;
                }
                result.push('#');
                result.push(h1);
                result.push(h2);
            } else if let Some(h1) = hex1 {
                result.push('#');
                result.push(h1);
            } else {
                result.push('#');
            }
        } else {
            result.push(ch);
        }
    }

    result
}

fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    preceded(
        char('/'),
        map(
            take_while(|c: u8| !is_pdf_whitespace(c) && !is_pdf_delimiter(c)),
            |bytes| {
                let name_str = std::str::from_utf8(bytes).unwrap_or("");
                Token::Name(decode_name_escapes(name_str))
            },
        ),
    )(input)
}

/// Keywords and delimiters. Multi-character alternatives come first;
/// `endstream` before `stream`, `startxref` before `xref`, `<<` before `<`.
fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        value(Token::False, tag(b"false")),
        value(Token::True, tag(b"true")),
        value(Token::Null, tag(b"null")),
        value(Token::EndObj, tag(b"endobj")),
        value(Token::Obj, tag(b"obj")),
        value(Token::EndStream, tag(b"endstream")),
        value(Token::StartXref, tag(b"startxref")),
        value(Token::Stream, tag(b"stream")),
        value(Token::Xref, tag(b"xref")),
        value(Token::Trailer, tag(b"trailer")),
        value(Token::DictOpen, tag(b"<<")),
        value(Token::DictClose, tag(b">>")),
        value(Token::ArrayOpen, tag(b"[")),
        value(Token::ArrayClose, tag(b"]")),
        value(Token::R, tag(b"R")),
    ))(input)
}

/// Parse a single token, skipping preceding whitespace and comments.
///
/// Keywords are tried before names, names before numbers, numbers before
/// strings; this ordering resolves every prefix ambiguity in PDF syntax.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (input, _) = skip_ws(input)?;
    alt((parse_keyword, parse_name, parse_number, parse_literal_string, parse_hex_string))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers() {
        assert_eq!(token(b"42"), Ok((&b""[..], Token::Integer(42))));
        assert_eq!(token(b"-123"), Ok((&b""[..], Token::Integer(-123))));
        assert_eq!(token(b"+17"), Ok((&b""[..], Token::Integer(17))));
        assert_eq!(token(b"0"), Ok((&b""[..], Token::Integer(0))));
    }

    #[test]
    fn test_reals() {
        assert_eq!(token(b"-2.5"), Ok((&b""[..], Token::Real(-2.5))));
        assert_eq!(token(b".5"), Ok((&b""[..], Token::Real(0.5))));
        assert_eq!(token(b"5."), Ok((&b""[..], Token::Real(5.0))));
        assert_eq!(token(b"-.002"), Ok((&b""[..], Token::Real(-0.002))));
    }

    #[test]
    fn test_integer_real_distinction() {
        assert!(matches!(token(b"42").unwrap().1, Token::Integer(42)));
        assert!(matches!(token(b"42.0").unwrap().1, Token::Real(_)));
    }

    #[test]
    fn test_literal_strings() {
        assert_eq!(token(b"(Hello)"), Ok((&b""[..], Token::LiteralString(b"Hello"))));
        assert_eq!(
            token(b"(Hello (nested) World)"),
            Ok((&b""[..], Token::LiteralString(b"Hello (nested) World")))
        );
        assert_eq!(token(b"()"), Ok((&b""[..], Token::LiteralString(b""))));
        // Escapes survive the lexer untouched
        assert_eq!(
            token(b"(Open \\( Close \\))"),
            Ok((&b""[..], Token::LiteralString(b"Open \\( Close \\)")))
        );
    }

    #[test]
    fn test_hex_strings() {
        assert_eq!(token(b"<48656C6C6F>"), Ok((&b""[..], Token::HexString(b"48656C6C6F"))));
        assert_eq!(
            token(b"<48 65 6C 6C 6F>"),
            Ok((&b""[..], Token::HexString(b"48 65 6C 6C 6F")))
        );
        assert_eq!(token(b"<>"), Ok((&b""[..], Token::HexString(b""))));
    }

    #[test]
    fn test_dict_open_beats_hex_string() {
        assert_eq!(token(b"<<"), Ok((&b""[..], Token::DictOpen)));
        assert_eq!(token(b"<ABC>"), Ok((&b""[..], Token::HexString(b"ABC"))));
    }

    #[test]
    fn test_names() {
        assert_eq!(token(b"/Type"), Ok((&b""[..], Token::Name("Type".to_string()))));
        assert_eq!(
            token(b"/A;Name_With-Various***Characters"),
            Ok((&b""[..], Token::Name("A;Name_With-Various***Characters".to_string())))
        );
        assert_eq!(token(b"/A#20B"), Ok((&b""[..], Token::Name("A B".to_string()))));
    }

    #[test]
    fn test_name_escape_decoding() {
        assert_eq!(decode_name_escapes("Type"), "Type");
        assert_eq!(decode_name_escapes("A#20B#23C"), "A B#C");
        assert_eq!(decode_name_escapes("A#"), "A#");
        assert_eq!(decode_name_escapes("A#2"), "A#2");
        assert_eq!(decode_name_escapes("A#ZZ"), "A#ZZ");
    }

    #[test]
    fn test_keywords() {
        assert_eq!(token(b"true"), Ok((&b""[..], Token::True)));
        assert_eq!(token(b"false"), Ok((&b""[..], Token::False)));
        assert_eq!(token(b"null"), Ok((&b""[..], Token::Null)));
        assert_eq!(token(b"obj"), Ok((&b""[..], Token::Obj)));
        assert_eq!(token(b"endobj"), Ok((&b""[..], Token::EndObj)));
        assert_eq!(token(b"stream"), Ok((&b""[..], Token::Stream)));
        assert_eq!(token(b"endstream"), Ok((&b""[..], Token::EndStream)));
        assert_eq!(token(b"R"), Ok((&b""[..], Token::R)));
    }

    #[test]
    fn test_xref_layer_keywords() {
        assert_eq!(token(b"xref"), Ok((&b""[..], Token::Xref)));
        assert_eq!(token(b"trailer"), Ok((&b""[..], Token::Trailer)));
        assert_eq!(token(b"startxref"), Ok((&b""[..], Token::StartXref)));
    }

    #[test]
    fn test_whitespace_and_comments_skipped() {
        assert_eq!(token(b"  \n\t42"), Ok((&b""[..], Token::Integer(42))));
        assert_eq!(token(b"% a comment\n42"), Ok((&b""[..], Token::Integer(42))));
        assert_eq!(token(b"\x00\x0C 42"), Ok((&b""[..], Token::Integer(42))));
    }

    #[test]
    fn test_object_header_sequence() {
        let input = b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj";
        let expect = [
            Token::Integer(1),
            Token::Integer(0),
            Token::Obj,
            Token::DictOpen,
            Token::Name("Type".to_string()),
            Token::Name("Catalog".to_string()),
            Token::Name("Pages".to_string()),
            Token::Integer(2),
            Token::Integer(0),
            Token::R,
            Token::DictClose,
            Token::EndObj,
        ];
        let mut rest: &[u8] = input;
        for want in expect {
            let (r, got) = token(rest).unwrap();
            assert_eq!(got, want);
            rest = r;
        }
        assert!(rest.is_empty());
    }
}
