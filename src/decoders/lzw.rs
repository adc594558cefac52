//! LZWDecode.
//!
//! PDF's LZW variant uses MSB-first bit ordering, 9-bit initial codes,
//! clear code 256, EOD code 257 and EarlyChange=1 (the code width grows one
//! code earlier than in GIF). The weezl TIFF-style size switch matches the
//! EarlyChange=1 behavior.

use weezl::BitOrder;
use weezl::decode::Decoder as WeezlDecoder;
use weezl::encode::Encoder as WeezlEncoder;

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// LZWDecode filter.
pub struct LzwDecoder;

impl StreamDecoder for LzwDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        // EarlyChange=1 first (the PDF default), then the late-change
        // variant for streams written with /EarlyChange 0
        let mut early = WeezlDecoder::with_tiff_size_switch(BitOrder::Msb, 8);
        match early.decode(input) {
            Ok(output) => Ok(output),
            Err(early_err) => {
                let mut late = WeezlDecoder::new(BitOrder::Msb, 8);
                match late.decode(input) {
                    Ok(output) => {
                        log::debug!("LZWDecode: late-change fallback succeeded");
                        Ok(output)
                    },
                    Err(_) => Err(Error::FilterError {
                        name: "LZWDecode".to_string(),
                        cause: early_err.to_string(),
                    }),
                }
            },
        }
    }

    fn name(&self) -> &'static str {
        "LZWDecode"
    }
}

/// LZW-encode data with the PDF defaults (MSB, EarlyChange=1).
pub fn encode(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = WeezlEncoder::with_tiff_size_switch(BitOrder::Msb, 8);
    encoder.encode(data).map_err(|e| Error::FilterError {
        name: "LZWDecode".to_string(),
        cause: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let original = b"LZW round trip with repeated repeated repeated content";
        let encoded = encode(original).unwrap();
        assert_eq!(LzwDecoder.decode(&encoded).unwrap(), original);
    }

    #[test]
    fn test_round_trip_binary() {
        let original: Vec<u8> = (0u16..=255).map(|i| i as u8).cycle().take(2048).collect();
        let encoded = encode(&original).unwrap();
        assert_eq!(LzwDecoder.decode(&encoded).unwrap(), original);
    }

    #[test]
    fn test_garbage_fails() {
        assert!(LzwDecoder.decode(&[0xFF; 4]).is_err());
    }
}
