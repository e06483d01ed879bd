//! ASCIIHexDecode implementation.
//!
//! Decodes hexadecimal-encoded data (e.g., "48656C6C6F" -> "Hello").
//! Whitespace is ignored, `>` ends the data, and odd-length input is padded
//! with an implicit '0'.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// ASCIIHexDecode filter implementation.
pub struct AsciiHexDecoder;

impl StreamDecoder for AsciiHexDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len() / 2);
        let mut high: Option<u8> = None;

        for &c in input {
            if c == b'>' {
                break;
            }
            if c.is_ascii_whitespace() || c == 0 {
                continue;
            }
            let nibble = hex_digit_to_value(c).ok_or_else(|| {
                Error::Decode(format!("ASCIIHexDecode: invalid hex digit '{}'", c as char))
            })?;
            match high.take() {
                Some(h) => output.push((h << 4) | nibble),
                None => high = Some(nibble),
            }
        }
        if let Some(h) = high {
            output.push(h << 4);
        }

        Ok(output)
    }

    fn name(&self) -> &str {
        "ASCIIHexDecode"
    }
}

fn hex_digit_to_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_hex_decode_simple() {
        assert_eq!(AsciiHexDecoder.decode(b"48656C6C6F").unwrap(), b"Hello");
    }

    #[test]
    fn test_ascii_hex_decode_with_whitespace_and_eod() {
        assert_eq!(AsciiHexDecoder.decode(b"48 65\n6c 6C 6F> trailing").unwrap(), b"Hello");
    }

    #[test]
    fn test_ascii_hex_decode_odd_length() {
        assert_eq!(AsciiHexDecoder.decode(b"486").unwrap(), vec![0x48, 0x60]);
    }

    #[test]
    fn test_ascii_hex_decode_invalid() {
        assert!(AsciiHexDecoder.decode(b"4G").is_err());
    }
}
