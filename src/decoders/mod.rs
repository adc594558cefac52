//! Stream filter pipeline.
//!
//! Composable decoders for the PDF stream filters:
//! - FlateDecode (zlib/deflate) - most common
//! - LZWDecode
//! - ASCIIHexDecode / ASCII85Decode
//! - RunLengthDecode
//! - DCTDecode, JPXDecode, CCITTFaxDecode, JBIG2Decode (pass-through:
//!   image payloads stay in their native encoding)
//!
//! A pipeline applies a list of filters in order; PNG/TIFF predictors are
//! applied after Flate/LZW. The reversible filters also expose encoders so
//! the writer and the round-trip tests share one implementation.

use crate::error::{Error, Result};

mod ascii85;
mod ascii_hex;
mod flate;
mod lzw;
mod passthrough;
mod predictor;
mod runlength;

pub use ascii85::Ascii85Decoder;
pub use ascii_hex::AsciiHexDecoder;
pub use flate::FlateDecoder;
pub use lzw::LzwDecoder;
pub use passthrough::PassthroughDecoder;
pub use predictor::{DecodeParams, decode_predictor};

pub use ascii85::encode as encode_ascii85;
pub use ascii_hex::encode as encode_ascii_hex;
pub use flate::encode as encode_flate;
pub use lzw::encode as encode_lzw;
pub use runlength::encode as encode_runlength;
pub use runlength::RunLengthDecoder;

/// Decompression-bomb guards. The PDF spec sets no limits; these caps stop
/// memory exhaustion from hostile streams.
const MAX_DECOMPRESSION_RATIO: u64 = 1000;
const MAX_DECOMPRESSED_SIZE: usize = 256 * 1024 * 1024;

/// A decoder identified by its filter name.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Filter name as it appears in stream dictionaries.
    fn name(&self) -> &'static str;
}

/// Look up the decoder for a filter name.
///
/// # Errors
///
/// `Error::UnknownFilter` for unrecognised names.
pub fn decoder_for(name: &str) -> Result<Box<dyn StreamDecoder>> {
    match name {
        "FlateDecode" | "Fl" => Ok(Box::new(FlateDecoder)),
        "LZWDecode" | "LZW" => Ok(Box::new(LzwDecoder)),
        "ASCIIHexDecode" | "AHx" => Ok(Box::new(AsciiHexDecoder)),
        "ASCII85Decode" | "A85" => Ok(Box::new(Ascii85Decoder)),
        "RunLengthDecode" | "RL" => Ok(Box::new(RunLengthDecoder)),
        "DCTDecode" | "DCT" => Ok(Box::new(PassthroughDecoder::new("DCTDecode"))),
        "JPXDecode" => Ok(Box::new(PassthroughDecoder::new("JPXDecode"))),
        "CCITTFaxDecode" | "CCF" => Ok(Box::new(PassthroughDecoder::new("CCITTFaxDecode"))),
        "JBIG2Decode" => Ok(Box::new(PassthroughDecoder::new("JBIG2Decode"))),
        _ => Err(Error::UnknownFilter(name.to_string())),
    }
}

/// Decode stream data through a filter pipeline.
pub fn decode_stream(data: &[u8], filters: &[String]) -> Result<Vec<u8>> {
    decode_stream_with_params(data, filters, None)
}

/// Decode stream data through a filter pipeline with predictor parameters.
///
/// Filters apply in order; the predictor (when present and not 1) applies
/// to the final output, which is where Flate/LZW leave their PNG/TIFF
/// predicted rows.
pub fn decode_stream_with_params(
    data: &[u8],
    filters: &[String],
    params: Option<&DecodeParams>,
) -> Result<Vec<u8>> {
    let compressed_size = data.len().max(1) as u64;
    let mut current = data.to_vec();

    for filter_name in filters {
        let decoder = decoder_for(filter_name)?;
        current = decoder.decode(&current)?;

        if current.len() as u64 / compressed_size > MAX_DECOMPRESSION_RATIO
            || current.len() > MAX_DECOMPRESSED_SIZE
        {
            return Err(Error::FilterError {
                name: filter_name.clone(),
                cause: format!("decompression bomb: {} bytes from {}", current.len(), data.len()),
            });
        }
    }

    if let Some(params) = params {
        if params.predictor != 1 {
            current = decode_predictor(&current, params)?;
        }
    }

    Ok(current)
}

/// Encode data with a single reversible filter, by name.
///
/// Used by tests and by callers re-encoding rewritten streams; the writer
/// calls `encode_flate` directly.
pub fn encode_with_filter(name: &str, data: &[u8]) -> Result<Vec<u8>> {
    match name {
        "FlateDecode" => Ok(encode_flate(data, 6)),
        "LZWDecode" => encode_lzw(data),
        "ASCIIHexDecode" => Ok(encode_ascii_hex(data)),
        "ASCII85Decode" => Ok(encode_ascii85(data)),
        "RunLengthDecode" => Ok(encode_runlength(data)),
        _ => Err(Error::UnknownFilter(name.to_string())),
    }
}
