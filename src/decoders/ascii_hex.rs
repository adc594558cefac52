//! ASCIIHexDecode.
//!
//! Pairs of hex digits, whitespace-tolerant, terminated by `>`; a trailing
//! odd nibble is padded with 0.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// ASCIIHexDecode filter.
pub struct AsciiHexDecoder;

impl StreamDecoder for AsciiHexDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len() / 2);
        let mut pending: Option<u8> = None;

        for &byte in input {
            match byte {
                b'>' => break,
                _ if crate::lexer::is_pdf_whitespace(byte) => {},
                _ => {
                    let digit = match byte {
                        b'0'..=b'9' => byte - b'0',
                        b'a'..=b'f' => byte - b'a' + 10,
                        b'A'..=b'F' => byte - b'A' + 10,
                        _ => {
                            return Err(Error::FilterError {
                                name: "ASCIIHexDecode".to_string(),
                                cause: format!("invalid hex character {:?}", byte as char),
                            });
                        },
                    };
                    match pending.take() {
                        Some(hi) => output.push((hi << 4) | digit),
                        None => pending = Some(digit),
                    }
                },
            }
        }

        // Odd trailing nibble pads with 0
        if let Some(hi) = pending {
            output.push(hi << 4);
        }

        Ok(output)
    }

    fn name(&self) -> &'static str {
        "ASCIIHexDecode"
    }
}

/// Hex-encode data with the `>` terminator.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len() * 2 + 1);
    for byte in data {
        output.push(HEX[(byte >> 4) as usize]);
        output.push(HEX[(byte & 0x0F) as usize]);
    }
    output.push(b'>');
    output
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";
