//! ToUnicode CMap decoding.
//!
//! A ToUnicode CMap maps character codes to Unicode runes through
//! `bfchar` and `bfrange` sections:
//!
//! ```text
//! 2 beginbfchar
//! <0003> <0041>
//! <0004> <00660069>
//! endbfchar
//! 1 beginbfrange
//! <0005> <0008> <0061>
//! endbfrange
//! ```
//!
//! Destination strings are UTF-16BE; codes above the BMP arrive as
//! surrogate pairs. Only the sections named above are interpreted, the
//! surrounding PostScript scaffolding is skipped.

use std::collections::HashMap;

/// Parse a decoded ToUnicode CMap stream into a code-to-runes map.
pub fn parse_to_unicode(data: &[u8]) -> HashMap<u32, Vec<char>> {
    let mut map = HashMap::new();
    let tokens = tokenize(data);
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            CMapToken::Keyword(kw) if kw == "beginbfchar" => {
                i += 1;
                while i + 1 < tokens.len() {
                    match (&tokens[i], &tokens[i + 1]) {
                        (CMapToken::Hex(src), CMapToken::Hex(dst)) => {
                            if let Some(code) = bytes_to_code(src) {
                                map.insert(code, utf16_be_to_runes(dst));
                            }
                            i += 2;
                        },
                        _ => break,
                    }
                }
            },
            CMapToken::Keyword(kw) if kw == "beginbfrange" => {
                i += 1;
                loop {
                    match (tokens.get(i), tokens.get(i + 1), tokens.get(i + 2)) {
                        (
                            Some(CMapToken::Hex(lo)),
                            Some(CMapToken::Hex(hi)),
                            Some(CMapToken::Hex(dst)),
                        ) => {
                            expand_incrementing_range(&mut map, lo, hi, dst);
                            i += 3;
                        },
                        (
                            Some(CMapToken::Hex(lo)),
                            Some(CMapToken::Hex(hi)),
                            Some(CMapToken::ArrayOpen),
                        ) => {
                            let (consumed, targets) = collect_array(&tokens[i + 2..]);
                            expand_listed_range(&mut map, lo, hi, &targets);
                            i += 2 + consumed;
                        },
                        _ => break,
                    }
                }
            },
            _ => i += 1,
        }
    }

    map
}

#[derive(Debug, PartialEq)]
enum CMapToken {
    Hex(Vec<u8>),
    Keyword(String),
    ArrayOpen,
    ArrayClose,
}

fn tokenize(data: &[u8]) -> Vec<CMapToken> {
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < data.len() {
        match data[i] {
            c if crate::lexer::is_pdf_whitespace(c) => i += 1,
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            },
            b'<' => {
                let start = i + 1;
                let mut end = start;
                while end < data.len() && data[end] != b'>' {
                    end += 1;
                }
                if let Ok(bytes) = crate::parser::decode_hex(&data[start..end]) {
                    tokens.push(CMapToken::Hex(bytes));
                }
                i = end + 1;
            },
            b'[' => {
                tokens.push(CMapToken::ArrayOpen);
                i += 1;
            },
            b']' => {
                tokens.push(CMapToken::ArrayClose);
                i += 1;
            },
            b'(' => {
                // Literal strings occur in CIDSystemInfo; skip balanced
                let mut depth = 1;
                i += 1;
                while i < data.len() && depth > 0 {
                    match data[i] {
                        b'\\' => i += 1,
                        b'(' => depth += 1,
                        b')' => depth -= 1,
                        _ => {},
                    }
                    i += 1;
                }
            },
            b'/' => {
                i += 1;
                while i < data.len()
                    && !crate::lexer::is_pdf_whitespace(data[i])
                    && !crate::lexer::is_pdf_delimiter(data[i])
                {
                    i += 1;
                }
            },
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < data.len() && data[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                tokens.push(CMapToken::Keyword(
                    String::from_utf8_lossy(&data[start..i]).to_string(),
                ));
            },
            _ => i += 1,
        }
    }

    tokens
}

fn collect_array(tokens: &[CMapToken]) -> (usize, Vec<Vec<u8>>) {
    // tokens[0] is ArrayOpen
    let mut targets = Vec::new();
    let mut i = 1;
    while i < tokens.len() {
        match &tokens[i] {
            CMapToken::Hex(bytes) => targets.push(bytes.clone()),
            CMapToken::ArrayClose => {
                i += 1;
                break;
            },
            _ => break,
        }
        i += 1;
    }
    (i, targets)
}

/// Big-endian code value of up to 4 source bytes.
fn bytes_to_code(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || bytes.len() > 4 {
        return None;
    }
    Some(bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
}

/// Decode a UTF-16BE destination string, pairing surrogates.
fn utf16_be_to_runes(bytes: &[u8]) -> Vec<char> {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    char::decode_utf16(units.iter().copied())
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

fn expand_incrementing_range(
    map: &mut HashMap<u32, Vec<char>>,
    lo: &[u8],
    hi: &[u8],
    dst: &[u8],
) {
    let (Some(lo), Some(hi)) = (bytes_to_code(lo), bytes_to_code(hi)) else {
        return;
    };
    if hi < lo || hi - lo > 0xFFFF {
        return;
    }
    let base = utf16_be_to_runes(dst);
    if base.is_empty() {
        return;
    }

    for (offset, code) in (lo..=hi).enumerate() {
        // The last rune increments through the range
        let mut runes = base.clone();
        if let Some(last) = runes.last_mut() {
            let incremented = (*last as u32).wrapping_add(offset as u32);
            *last = char::from_u32(incremented).unwrap_or(char::REPLACEMENT_CHARACTER);
        }
        map.insert(code, runes);
    }
}

fn expand_listed_range(
    map: &mut HashMap<u32, Vec<char>>,
    lo: &[u8],
    hi: &[u8],
    targets: &[Vec<u8>],
) {
    let (Some(lo), Some(hi)) = (bytes_to_code(lo), bytes_to_code(hi)) else {
        return;
    };
    if hi < lo {
        return;
    }

    for (offset, code) in (lo..=hi).enumerate() {
        if let Some(dst) = targets.get(offset) {
            map.insert(code, utf16_be_to_runes(dst));
        }
    }
}
