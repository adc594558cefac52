//! Pass-through recognisers for image codecs.
//!
//! DCTDecode (JPEG), JPXDecode (JPEG 2000), CCITTFaxDecode and JBIG2Decode
//! payloads are kept in their native encoding; downstream consumers that
//! actually rasterise images take the bytes verbatim.

use crate::decoders::StreamDecoder;
use crate::error::Result;

/// A recognised filter whose data is returned unchanged.
pub struct PassthroughDecoder {
    name: &'static str,
}

impl PassthroughDecoder {
    /// Create a pass-through for the given filter name.
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl StreamDecoder for PassthroughDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
