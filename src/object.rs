//! Object types produced by the assembler.
//!
//! [`Object`] is a tagged union over every value the reader can assemble.
//! Strings and streams remember the indirect object they were defined in so
//! that a downstream decryption step can derive its per-object key; the
//! reader itself never decrypts.

use crate::stream::StreamByteRange;
use crate::typed::{ObjectKind, TypedDictionary};
use crate::xref::{CrossRefTable, Trailer};
use std::collections::HashMap;

/// Dictionary: name keys (without the slash) to values.
pub type Dictionary = HashMap<String, Object>;

/// Object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// Parenthesis-delimited string, escapes already decoded
    LiteralString(PdfString),
    /// Angle-bracket string, hex already decoded
    HexString(PdfString),
    /// Name (without the leading slash)
    Name(String),
    /// Any other bare word, kept opaque
    Keyword(String),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary with no recognized `/Type`
    Dictionary(Dictionary),
    /// Dictionary wrapped by the object factory
    Typed(TypedDictionary),
    /// Indirect object reference
    Reference(ObjectRef),
    /// Stream (dictionary + byte range)
    Stream(Box<Stream>),
    /// Decoded cross-reference section
    CrossReference(CrossRefTable),
    /// Trailer dictionary with its cross-reference section
    Trailer(Box<Trailer>),
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }

    /// Build a reference from two assembled integers, rejecting values
    /// that cannot be object or generation numbers.
    pub(crate) fn from_numbers(id: i64, gen: i64) -> Option<Self> {
        let id = u32::try_from(id).ok()?;
        let gen = u16::try_from(gen).ok()?;
        Some(Self { id, gen })
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

/// A completed top-level `N G obj ... endobj` unit.
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectObject {
    /// Address of the object
    pub reference: ObjectRef,
    /// The object's value
    pub object: Object,
}

/// String bytes plus the indirect object they were defined in.
#[derive(Debug, Clone, Default)]
pub struct PdfString {
    bytes: Vec<u8>,
    owner: Option<ObjectRef>,
}

impl PdfString {
    /// Create a string with no owning object.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            owner: None,
        }
    }

    /// Create a string defined inside the given indirect object.
    pub fn with_owner(bytes: impl Into<Vec<u8>>, owner: Option<ObjectRef>) -> Self {
        Self {
            bytes: bytes.into(),
            owner,
        }
    }

    /// The decoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The indirect object this string was read from, if any.
    pub fn owner(&self) -> Option<ObjectRef> {
        self.owner
    }

    /// Consume into the raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

// Equality is over content only: the same bytes read from two objects are
// the same string.
impl PartialEq for PdfString {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

/// A stream: dictionary plus the location of its undecoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    /// Stream dictionary
    pub dict: Dictionary,
    /// Where the raw (still filtered) payload lives
    pub data: StreamByteRange,
    /// Specialized subtype chosen by the object factory
    pub kind: Option<ObjectKind>,
    /// Indirect object the stream was defined in
    pub owner: Option<ObjectRef>,
}

impl Stream {
    /// Create an untyped stream.
    pub fn new(dict: Dictionary, data: StreamByteRange) -> Self {
        Self {
            dict,
            data,
            kind: None,
            owner: None,
        }
    }

    /// Raw payload bytes, exactly as stored in the file.
    pub fn raw_data(&self) -> crate::error::Result<bytes::Bytes> {
        self.data.raw_bytes()
    }

    /// Payload with the `/Filter` chain applied.
    pub fn decoded_data(&self) -> crate::error::Result<Vec<u8>> {
        crate::decoders::decode_stream_object(self, None)
    }
}

impl Object {
    /// Get the type name of this object (without data).
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::LiteralString(_) => "LiteralString",
            Object::HexString(_) => "HexString",
            Object::Name(_) => "Name",
            Object::Keyword(_) => "Keyword",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Typed(_) => "Typed",
            Object::Reference(_) => "Reference",
            Object::Stream(_) => "Stream",
            Object::CrossReference(_) => "CrossReference",
            Object::Trailer(_) => "Trailer",
        }
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to cast to real number.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Integer or real as `f64`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// String bytes of either a literal or a hex string.
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::LiteralString(s) | Object::HexString(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Dictionary view of dictionaries, typed dictionaries, streams and trailers.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Typed(t) => Some(t.dict()),
            Object::Stream(s) => Some(&s.dict),
            Object::Trailer(t) => Some(&t.dict),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to stream.
    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to a factory-typed dictionary.
    pub fn as_typed(&self) -> Option<&TypedDictionary> {
        match self {
            Object::Typed(t) => Some(t),
            _ => None,
        }
    }

    /// Try to cast to trailer.
    pub fn as_trailer(&self) -> Option<&Trailer> {
        match self {
            Object::Trailer(t) => Some(t),
            _ => None,
        }
    }

    /// Cross-reference table of a bare section or of a trailer.
    pub fn as_xref(&self) -> Option<&CrossRefTable> {
        match self {
            Object::CrossReference(x) => Some(x),
            Object::Trailer(t) => t.xref.as_ref(),
            _ => None,
        }
    }

    /// Specialized kind of a typed dictionary or stream.
    pub fn kind(&self) -> Option<ObjectKind> {
        match self {
            Object::Typed(t) => Some(t.kind()),
            Object::Stream(s) => s.kind,
            _ => None,
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Unwrap a plain or typed dictionary.
    pub fn into_dictionary(self) -> Option<Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Typed(t) => Some(t.into_dict()),
            _ => None,
        }
    }
}

/// `/Key` as a name, if present and a name.
pub(crate) fn dict_name<'a>(dict: &'a Dictionary, key: &str) -> Option<&'a str> {
    dict.get(key).and_then(Object::as_name)
}

/// `/Key` as an integer, if present and an integer.
pub(crate) fn dict_integer(dict: &Dictionary, key: &str) -> Option<i64> {
    dict.get(key).and_then(Object::as_integer)
}
