//! RunLengthDecode.
//!
//! Length byte 0-127 copies the next N+1 bytes literally; 129-255 repeats
//! the next byte 257-N times; 128 is end of data.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// RunLengthDecode filter.
pub struct RunLengthDecoder;

impl StreamDecoder for RunLengthDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut i = 0;

        while i < input.len() {
            let length = input[i];
            i += 1;

            match length {
                0..=127 => {
                    let count = length as usize + 1;
                    if i + count > input.len() {
                        return Err(Error::FilterError {
                            name: "RunLengthDecode".to_string(),
                            cause: format!(
                                "literal run needs {} bytes, {} remain",
                                count,
                                input.len() - i
                            ),
                        });
                    }
                    output.extend_from_slice(&input[i..i + count]);
                    i += count;
                },
                128 => break,
                129..=255 => {
                    let count = 257 - length as usize;
                    if i >= input.len() {
                        return Err(Error::FilterError {
                            name: "RunLengthDecode".to_string(),
                            cause: "missing byte for repeat run".to_string(),
                        });
                    }
                    let byte = input[i];
                    i += 1;
                    output.resize(output.len() + count, byte);
                },
            }
        }

        Ok(output)
    }

    fn name(&self) -> &'static str {
        "RunLengthDecode"
    }
}

/// Run-length encode data, emitting the 128 EOD marker.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::new();
    let mut i = 0;

    while i < data.len() {
        // Measure the run starting here
        let byte = data[i];
        let mut run = 1;
        while run < 128 && i + run < data.len() && data[i + run] == byte {
            run += 1;
        }

        if run >= 2 {
            output.push((257 - run) as u8);
            output.push(byte);
            i += run;
        } else {
            // Collect literals until the next run of 2+ (or 128 bytes)
            let start = i;
            i += 1;
            while i < data.len() && i - start < 128 {
                if i + 1 < data.len() && data[i] == data[i + 1] {
                    break;
                }
                i += 1;
            }
            output.push((i - start - 1) as u8);
            output.extend_from_slice(&data[start..i]);
        }
    }

    output.push(128);
    output
}
