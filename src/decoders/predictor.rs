//! Predictor reversal for FlateDecode data.
//!
//! Cross-reference streams are almost always written with PNG predictor 12
//! (Up). TIFF predictor 2 and the full PNG set (10-15) are supported.

use crate::error::{Error, Result};
use crate::object::Object;

/// `/DecodeParms` values relevant to predictors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Number of samples per row
    pub columns: usize,
    /// Number of color components per sample
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
    /// Read parameters from a `/DecodeParms` dictionary. `null` and
    /// non-dictionaries mean "no parameters".
    pub fn from_object(obj: &Object) -> Option<Self> {
        let dict = obj.as_dict()?;
        let int = |key: &str, default: i64| dict.get(key).and_then(Object::as_integer).unwrap_or(default);
        let count = |key: &str, default: i64| usize::try_from(int(key, default).max(1)).unwrap_or(usize::MAX);
        Some(Self {
            predictor: int("Predictor", 1),
            columns: count("Columns", 1),
            colors: count("Colors", 1),
            bits_per_component: count("BitsPerComponent", 8),
        })
    }

    /// Bytes of sample data per row (without the PNG tag byte).
    pub fn pixel_bytes_per_row(&self) -> Result<usize> {
        self.columns
            .checked_mul(self.colors)
            .and_then(|n| n.checked_mul(self.bits_per_component))
            .map(|bits| bits.div_ceil(8))
            .ok_or_else(|| self.overflow())
    }

    /// Bytes per complete pixel, at least 1.
    pub fn bytes_per_pixel(&self) -> Result<usize> {
        self.colors
            .checked_mul(self.bits_per_component)
            .map(|bits| bits.div_ceil(8).max(1))
            .ok_or_else(|| self.overflow())
    }

    fn overflow(&self) -> Error {
        Error::Decode(format!(
            "Predictor row size overflows: {} columns, {} colors, {} bits",
            self.columns, self.colors, self.bits_per_component
        ))
    }

    /// Row size for `data`, rejecting rows longer than the data itself.
    fn checked_row_len(&self, data: &[u8], tag_bytes: usize) -> Result<usize> {
        let row_len = self
            .pixel_bytes_per_row()?
            .checked_add(tag_bytes)
            .ok_or_else(|| self.overflow())?;
        if row_len > data.len() {
            return Err(Error::Decode(format!(
                "Predictor row size {} exceeds data length {}",
                row_len,
                data.len()
            )));
        }
        Ok(row_len)
    }
}

/// Reverse the predictor described by `params`.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => decode_tiff_predictor(data, params),
        10..=15 => decode_png_predictor(data, params),
        other => Err(Error::Decode(format!("Unsupported predictor: {}", other))),
    }
}

/// TIFF predictor 2, 8-bit components only.
fn decode_tiff_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(Error::Decode(format!(
            "TIFF predictor with {} bits per component",
            params.bits_per_component
        )));
    }
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let row_len = params.checked_row_len(data, 0)?;
    let colors = params.colors;
    let mut output = Vec::with_capacity(data.len());

    for row in data.chunks(row_len) {
        let row_start = output.len();
        for (i, &byte) in row.iter().enumerate() {
            let left = if i >= colors { output[row_start + i - colors] } else { 0 };
            output.push(byte.wrapping_add(left));
        }
    }
    Ok(output)
}

/// PNG predictors. Every row starts with a tag byte naming the algorithm
/// actually used for it; a trailing partial row is dropped.
fn decode_png_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let row_len = params.checked_row_len(data, 1)?;
    let pixel_bytes = row_len - 1;
    let bpp = params.bytes_per_pixel()?;

    if data.len() % row_len != 0 {
        log::warn!(
            "Predictor data length {} is not a multiple of row size {}; dropping partial row",
            data.len(),
            row_len
        );
    }

    let rows = data.len() / row_len;
    let mut output = Vec::with_capacity(rows * pixel_bytes);
    let mut prev = vec![0u8; pixel_bytes];

    for row in data.chunks_exact(row_len) {
        let tag = row[0];
        let encoded = &row[1..];
        let mut current = vec![0u8; pixel_bytes];

        for i in 0..pixel_bytes {
            let left = if i >= bpp { current[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => {
                    return Err(Error::Decode(format!("Invalid PNG predictor tag: {}", other)));
                },
            };
            current[i] = encoded[i].wrapping_add(predicted);
        }

        output.extend_from_slice(&current);
        prev = current;
    }

    Ok(output)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let (ai, bi, ci) = (a as i16, b as i16, c as i16);
    let p = ai + bi - ci;
    let pa = (p - ai).abs();
    let pb = (p - bi).abs();
    let pc = (p - ci).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
