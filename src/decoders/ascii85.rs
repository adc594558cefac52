//! ASCII85Decode (Base85).
//!
//! Four bytes become five characters in `!`..`u`; `z` is shorthand for four
//! zero bytes and `~>` ends the data.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// ASCII85Decode filter.
pub struct Ascii85Decoder;

fn fault(cause: impl Into<String>) -> Error {
    Error::FilterError {
        name: "ASCII85Decode".to_string(),
        cause: cause.into(),
    }
}

impl StreamDecoder for Ascii85Decoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut acc: u32 = 0;
        let mut count = 0;

        // Skip the optional `<~` prologue some encoders emit
        let input = input.strip_prefix(b"<~").unwrap_or(input);

        for &byte in input {
            match byte {
                b'~' => break,
                b'z' => {
                    if count != 0 {
                        return Err(fault("'z' inside a group"));
                    }
                    output.extend_from_slice(&[0, 0, 0, 0]);
                },
                b'!'..=b'u' => {
                    acc = acc
                        .checked_mul(85)
                        .and_then(|v| v.checked_add((byte - b'!') as u32))
                        .ok_or_else(|| fault("group value overflow"))?;
                    count += 1;
                    if count == 5 {
                        output.extend_from_slice(&acc.to_be_bytes());
                        acc = 0;
                        count = 0;
                    }
                },
                _ if crate::lexer::is_pdf_whitespace(byte) => {},
                _ => return Err(fault(format!("invalid character {:?}", byte as char))),
            }
        }

        // Trailing partial group: pad with 'u', keep count-1 bytes
        if count > 0 {
            if count == 1 {
                return Err(fault("single-character trailing group"));
            }
            for _ in count..5 {
                acc = acc
                    .checked_mul(85)
                    .and_then(|v| v.checked_add(84))
                    .ok_or_else(|| fault("padding overflow"))?;
            }
            let bytes = acc.to_be_bytes();
            output.extend_from_slice(&bytes[..count - 1]);
        }

        Ok(output)
    }

    fn name(&self) -> &'static str {
        "ASCII85Decode"
    }
}

/// Base85-encode data with the `~>` terminator. The `z` shorthand is used
/// for all-zero groups.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len() / 4 * 5 + 8);

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if word == 0 {
            output.push(b'z');
        } else {
            push_group(&mut output, word, 5);
        }
    }

    let rest = chunks.remainder();
    if !rest.is_empty() {
        let mut padded = [0u8; 4];
        padded[..rest.len()].copy_from_slice(rest);
        let word = u32::from_be_bytes(padded);
        // A partial group of n bytes emits n+1 characters and never uses 'z'
        push_group(&mut output, word, rest.len() + 1);
    }

    output.extend_from_slice(b"~>");
    output
}

fn push_group(output: &mut Vec<u8>, word: u32, chars: usize) {
    let mut buf = [0u8; 5];
    let mut value = word;
    for slot in buf.iter_mut().rev() {
        *slot = (value % 85) as u8 + b'!';
        value /= 85;
    }
    output.extend_from_slice(&buf[..chars]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_simple() {
        assert_eq!(Ascii85Decoder.decode(b"<+U,m").unwrap(), b"Test");
    }

    #[test]
    fn test_decode_z_shorthand() {
        assert_eq!(Ascii85Decoder.decode(b"z~>").unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_z_inside_group_rejected() {
        assert!(Ascii85Decoder.decode(b"<+z").is_err());
    }

    #[test]
    fn test_decode_prologue_tolerated() {
        assert_eq!(Ascii85Decoder.decode(b"<~<+U,m~>").unwrap(), b"Test");
    }

    #[test]
    fn test_round_trip_partial_group() {
        for len in 0..=9 {
            let data: Vec<u8> = (0..len).map(|i| i as u8 * 37).collect();
            assert_eq!(Ascii85Decoder.decode(&encode(&data)).unwrap(), data, "len {}", len);
        }
    }

    #[test]
    fn test_round_trip_with_zero_runs() {
        let mut data = vec![1, 2, 3, 4];
        data.extend_from_slice(&[0; 8]);
        data.extend_from_slice(b"tail");
        assert_eq!(Ascii85Decoder.decode(&encode(&data)).unwrap(), data);
    }
}
