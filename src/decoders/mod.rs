//! Stream filter decoders.
//!
//! Only the filters that cross-reference streams and object streams use in
//! practice are implemented here:
//! - FlateDecode (zlib/deflate), with PNG and TIFF predictors
//! - ASCIIHexDecode
//!
//! Any other filter is reported as [`Error::UnsupportedFilter`]. Content
//! streams, images and fonts are decoded downstream.

use crate::error::{Error, Result};
use crate::object::{Object, Stream};
use crate::parser_config::ParserOptions;

mod ascii_hex;
mod flate;
mod predictor;

pub use ascii_hex::AsciiHexDecoder;
pub use flate::FlateDecoder;
pub use predictor::{decode_predictor, DecodeParams};

/// Used when no [`ParserOptions`] are supplied.
const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 100 * 1024 * 1024;

/// A single filter algorithm.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Filter name (e.g., "FlateDecode").
    fn name(&self) -> &str;
}

/// Look up a decoder by filter name, including the inline-image
/// abbreviations.
pub fn decoder_for(filter: &str) -> Result<Box<dyn StreamDecoder>> {
    match filter {
        "FlateDecode" | "Fl" => Ok(Box::new(FlateDecoder)),
        "ASCIIHexDecode" | "AHx" => Ok(Box::new(AsciiHexDecoder)),
        other => Err(Error::UnsupportedFilter(other.to_string())),
    }
}

/// Read `/Filter` and `/DecodeParms` into a list of (filter, params) steps.
pub fn filter_chain(stream: &Stream) -> Result<Vec<(String, Option<DecodeParams>)>> {
    let filters: Vec<String> = match stream.dict.get("Filter") {
        None | Some(Object::Null) => return Ok(Vec::new()),
        Some(Object::Name(name)) => vec![name.clone()],
        Some(Object::Array(arr)) => arr
            .iter()
            .map(|f| {
                f.as_name()
                    .map(str::to_string)
                    .ok_or_else(|| Error::InvalidPdf(format!("invalid /Filter entry: {}", f.type_name())))
            })
            .collect::<Result<_>>()?,
        Some(other) => {
            return Err(Error::InvalidObjectType {
                expected: "Name or Array".to_string(),
                found: other.type_name().to_string(),
            })
        },
    };

    let params: Vec<Option<DecodeParams>> = match stream.dict.get("DecodeParms") {
        Some(Object::Array(arr)) => arr.iter().map(DecodeParams::from_object).collect(),
        Some(obj) => vec![DecodeParams::from_object(obj)],
        None => Vec::new(),
    };

    Ok(filters
        .into_iter()
        .enumerate()
        .map(|(i, f)| (f, params.get(i).cloned().flatten()))
        .collect())
}

/// Apply a filter chain to raw data, enforcing `max_size` (0 = unlimited)
/// after every step.
pub fn decode_stream_with_params(
    data: &[u8],
    chain: &[(String, Option<DecodeParams>)],
    max_size: usize,
) -> Result<Vec<u8>> {
    let mut current = data.to_vec();
    for (filter, params) in chain {
        let decoder = decoder_for(filter)?;
        current = decoder.decode(&current)?;
        if let Some(params) = params {
            if params.predictor > 1 {
                current = decode_predictor(&current, params)?;
            }
        }
        if max_size > 0 && current.len() > max_size {
            return Err(Error::Decode(format!(
                "decoded size {} bytes exceeds limit {} bytes",
                current.len(),
                max_size
            )));
        }
    }
    Ok(current)
}

/// Raw payload of `stream` with its filter chain applied.
pub fn decode_stream_object(stream: &Stream, options: Option<&ParserOptions>) -> Result<Vec<u8>> {
    let max_size = options
        .map(|o| o.max_decompressed_size)
        .unwrap_or(DEFAULT_MAX_DECOMPRESSED_SIZE);
    let chain = filter_chain(stream)?;
    let raw = stream.raw_data()?;
    decode_stream_with_params(&raw, &chain, max_size)
}
