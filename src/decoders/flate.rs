//! FlateDecode (zlib/deflate), the workhorse filter of real-world PDFs.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// FlateDecode filter.
pub struct FlateDecoder;

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut decoder = ZlibDecoder::new(input);

        match decoder.read_to_end(&mut output) {
            Ok(_) => Ok(output),
            Err(zlib_err) => {
                // Partial data before the fault is still usable
                if !output.is_empty() {
                    log::warn!(
                        "FlateDecode partial recovery: {} bytes before corruption: {}",
                        output.len(),
                        zlib_err
                    );
                    return Ok(output);
                }

                // Some generators emit raw deflate without the zlib wrapper
                output.clear();
                let mut raw = DeflateDecoder::new(input);
                match raw.read_to_end(&mut output) {
                    Ok(_) if !output.is_empty() => {
                        log::debug!("FlateDecode: raw deflate fallback succeeded");
                        Ok(output)
                    },
                    _ => Err(Error::FilterError {
                        name: "FlateDecode".to_string(),
                        cause: zlib_err.to_string(),
                    }),
                }
            },
        }
    }

    fn name(&self) -> &'static str {
        "FlateDecode"
    }
}

/// Flate-encode data at the given level (0 = store, 9 = best).
pub fn encode(data: &[u8], level: u32) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
    // Writing to a Vec cannot fail
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}
