//! Object streams.
//!
//! An object stream (`/Type /ObjStm`) packs several indirect objects into one
//! compressed payload. The decoded data starts with `N` pairs of
//! `object-number offset`, followed at `/First` by the objects themselves,
//! each written as a bare value without `obj`/`endobj`.

use crate::decoders;
use crate::directory::Detached;
use crate::error::{Error, Result};
use crate::factory::ObjectFactory;
use crate::lexer::{Lexer, Token};
use crate::object::{Object, Stream};
use crate::parser::{Parsed, Parser};
use crate::parser_config::ParserOptions;
use crate::source::SliceSource;
use bytes::Bytes;
use std::sync::Arc;

fn header_value(stream: &Stream, key: &str) -> Result<usize> {
    stream
        .dict
        .get(key)
        .and_then(Object::as_integer)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| Error::InvalidPdf(format!("object stream missing or invalid /{}", key)))
}

/// Read the `object-number offset` pairs from the stream header.
fn read_pairs(header: Bytes, n: usize) -> Result<Vec<(u32, usize)>> {
    let mut lexer = Lexer::new(SliceSource::new(header));
    let mut pairs = Vec::with_capacity(n);
    while pairs.len() < n {
        let number = lexer.next_token()?;
        let offset = lexer.next_token()?;
        match (number, offset) {
            (Some(Token::Integer(num)), Some(Token::Integer(off))) if num >= 0 && off >= 0 => {
                pairs.push((num as u32, off as usize));
            },
            _ => {
                log::warn!("Object stream header lists {} of {} objects", pairs.len(), n);
                break;
            },
        }
    }
    Ok(pairs)
}

/// Decode an object stream and assemble every member.
///
/// Returns `(object number, value)` pairs in header order. Each member is
/// bounded by the offset of the next one. Members that cannot be parsed are
/// skipped with a warning.
pub fn parse_object_stream(
    stream: &Stream,
    options: &ParserOptions,
    factory: &Arc<ObjectFactory>,
) -> Result<Vec<(u32, Object)>> {
    let n = header_value(stream, "N")?;
    let first = header_value(stream, "First")?;

    let data = Bytes::from(decoders::decode_stream_object(stream, Some(options))?);
    if first > data.len() {
        return Err(Error::InvalidPdf(format!(
            "object stream /First {} beyond decoded length {}",
            first,
            data.len()
        )));
    }

    let pairs = read_pairs(data.slice(..first), n)?;
    let mut members = Vec::with_capacity(pairs.len());

    for (i, &(number, offset)) in pairs.iter().enumerate() {
        let start = first.saturating_add(offset);
        let end = match pairs.get(i + 1) {
            Some(&(_, next)) if first + next >= start => (first + next).min(data.len()),
            _ => data.len(),
        };
        if start >= data.len() {
            log::warn!("Object {} offset {} lies outside its object stream", number, offset);
            continue;
        }

        let mut parser = Parser::with_factory(SliceSource::new(data.slice(start..end)), *options, factory.clone());
        let value = match parser.next_object(&mut Detached)? {
            Some(Parsed::Direct(obj)) => Some(obj),
            Some(Parsed::Indirect(obj)) => Some(obj.object),
            None => parser.take_value(),
        };
        match value {
            Some(obj) => members.push((number, obj)),
            None => log::warn!("Failed to parse object {} in object stream", number),
        }
    }

    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Dictionary, ObjectRef};
    use crate::stream::StreamByteRange;
    use crate::typed::ObjectKind;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn objstm(n: i64, first: i64, body: &[u8], compress: bool) -> Stream {
        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::Name("ObjStm".to_string()));
        dict.insert("N".to_string(), Object::Integer(n));
        dict.insert("First".to_string(), Object::Integer(first));
        let data = if compress {
            dict.insert("Filter".to_string(), Object::Name("FlateDecode".to_string()));
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(body).unwrap();
            encoder.finish().unwrap()
        } else {
            body.to_vec()
        };
        Stream::new(dict, StreamByteRange::owned(Bytes::from(data)))
    }

    #[test]
    fn test_members_in_order() {
        let header = b"10 0 11 22 12 25 ";
        let objects = b"<< /Type /Page /A 1 >> 42 [1 0 R]";
        let mut body = header.to_vec();
        body.extend_from_slice(objects);
        let stream = objstm(3, header.len() as i64, &body, true);

        let members = parse_object_stream(&stream, &ParserOptions::default(), &ObjectFactory::shared()).unwrap();
        assert_eq!(members.len(), 3);
        assert_eq!(members[0].0, 10);
        assert_eq!(members[0].1.kind(), Some(ObjectKind::Page));
        assert_eq!(members[1], (11, Object::Integer(42)));
        assert_eq!(
            members[2],
            (12, Object::Array(vec![Object::Reference(ObjectRef::new(1, 0))]))
        );
    }

    #[test]
    fn test_short_header() {
        let stream = objstm(2, 5, b"7 0  (only)", false);
        let members = parse_object_stream(&stream, &ParserOptions::default(), &ObjectFactory::shared()).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].1.as_string(), Some(&b"only"[..]));
    }

    #[test]
    fn test_first_beyond_data() {
        let stream = objstm(1, 500, b"1 0 null", false);
        assert!(parse_object_stream(&stream, &ParserOptions::default(), &ObjectFactory::shared()).is_err());
    }

    #[test]
    fn test_missing_n() {
        let mut stream = objstm(1, 4, b"1 0 null", false);
        stream.dict.remove("N");
        assert!(parse_object_stream(&stream, &ParserOptions::default(), &ObjectFactory::shared()).is_err());
    }
}
