//! PNG and TIFF predictor reversal.
//!
//! Flate and LZW streams may carry predictor-encoded rows (Predictor 2 for
//! TIFF, 10-15 for PNG). PNG rows carry a per-row tag byte selecting the
//! filter; TIFF predicts each sample from its left neighbour.

use crate::error::{Error, Result};

/// Decode parameters from a `/DecodeParms` dictionary.
#[derive(Debug, Clone)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Number of columns (samples per row)
    pub columns: usize,
    /// Colour components per sample
    pub colors: usize,
    /// Bits per component
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    /// Bytes of pixel data per row, without any tag byte.
    pub fn pixel_bytes_per_row(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component + 7) / 8
    }

    /// Bytes per sample, at least 1. The PNG filters step by this amount.
    fn bytes_per_pixel(&self) -> usize {
        ((self.colors * self.bits_per_component) / 8).max(1)
    }
}

/// Reverse the predictor named in `params` over `data`.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => decode_tiff_predictor(data, params),
        10..=15 => decode_png_predictor(data, params),
        other => Err(Error::FilterError {
            name: "Predictor".to_string(),
            cause: format!("unsupported predictor {}", other),
        }),
    }
}

fn decode_tiff_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let bytes_per_row = params.pixel_bytes_per_row();
    let bpp = params.bytes_per_pixel();

    if bytes_per_row == 0 || data.len() % bytes_per_row != 0 {
        return Err(Error::FilterError {
            name: "Predictor".to_string(),
            cause: format!("data length {} not a multiple of row size {}", data.len(), bytes_per_row),
        });
    }

    let mut output = Vec::with_capacity(data.len());
    for row_data in data.chunks(bytes_per_row) {
        let row_start = output.len();
        for (i, &byte) in row_data.iter().enumerate() {
            if i < bpp {
                output.push(byte);
            } else {
                let left = output[row_start + i - bpp];
                output.push(byte.wrapping_add(left));
            }
        }
    }

    Ok(output)
}

fn decode_png_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let pixel_bytes = params.pixel_bytes_per_row();
    let bytes_per_row = pixel_bytes + 1; // tag byte leads each row
    let bpp = params.bytes_per_pixel();

    if pixel_bytes == 0 || data.len() % bytes_per_row != 0 {
        return Err(Error::FilterError {
            name: "Predictor".to_string(),
            cause: format!("data length {} not a multiple of row size {}", data.len(), bytes_per_row),
        });
    }

    let row_count = data.len() / bytes_per_row;
    let mut output: Vec<u8> = Vec::with_capacity(row_count * pixel_bytes);

    for row_idx in 0..row_count {
        let row = &data[row_idx * bytes_per_row..(row_idx + 1) * bytes_per_row];
        let tag = row[0];
        let encoded = &row[1..];
        let row_start = output.len();

        for (i, &byte) in encoded.iter().enumerate() {
            let left = if i >= bpp { output[row_start + i - bpp] } else { 0 };
            let above = if row_idx > 0 { output[row_start - pixel_bytes + i] } else { 0 };
            let upper_left = if row_idx > 0 && i >= bpp {
                output[row_start - pixel_bytes + i - bpp]
            } else {
                0
            };

            let reconstructed = match tag {
                0 => byte,
                1 => byte.wrapping_add(left),
                2 => byte.wrapping_add(above),
                3 => byte.wrapping_add(((left as u16 + above as u16) / 2) as u8),
                4 => byte.wrapping_add(paeth(left, above, upper_left)),
                other => {
                    return Err(Error::FilterError {
                        name: "Predictor".to_string(),
                        cause: format!("invalid PNG row filter tag {}", other),
                    });
                },
            };
            output.push(reconstructed);
        }
    }

    Ok(output)
}

/// Paeth predictor function from the PNG specification.
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
