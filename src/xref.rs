//! Cross-reference sections and trailers.
//!
//! The xref table maps object numbers to byte offsets (or, for objects
//! stored in object streams, to a container object and index), enabling
//! random access to objects.
//!
//! Both classic `xref` tables and cross-reference streams (`/Type /XRef`)
//! decode into the same [`CrossRefTable`].

use crate::error::{Error, ParseIssue, Result};
use crate::lexer::{Lexer, Token};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::source::{ByteSource, SourceHandle};
use nom::{
    bytes::complete::tag,
    character::complete::{digit1, multispace0, one_of, space1},
    sequence::{preceded, tuple},
    IResult,
};
use std::collections::HashMap;

/// Upper bound on a classic subsection's declared entry count.
const MAX_SUBSECTION_ENTRIES: i64 = 1_000_000;

/// How many bytes at the end of the file are searched for `startxref`.
const STARTXREF_WINDOW: u64 = 2048;

/// Cross-reference table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free object slot
    Free {
        /// Next free object number
        next_free: u32,
        /// Generation to use when the slot is reused
        generation: u16,
    },
    /// Object stored at a byte offset
    InUse {
        /// Byte offset of `N G obj`
        offset: u64,
        /// Generation number
        generation: u16,
    },
    /// Object stored inside an object stream
    Compressed {
        /// Object number of the containing object stream
        container: u32,
        /// Index within the container
        index: u32,
    },
}

impl XRefEntry {
    /// Generation number this entry describes. Compressed objects always
    /// have generation 0.
    pub fn generation(&self) -> u16 {
        match self {
            XRefEntry::Free { generation, .. } | XRefEntry::InUse { generation, .. } => *generation,
            XRefEntry::Compressed { .. } => 0,
        }
    }

    /// Whether the entry describes a live object.
    pub fn is_in_use(&self) -> bool {
        !matches!(self, XRefEntry::Free { .. })
    }
}

/// Cross-reference table that maps object numbers to their locations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrossRefTable {
    entries: HashMap<u32, XRefEntry>,
}

impl CrossRefTable {
    /// Create a new empty cross-reference table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the entry for an object number.
    pub fn insert(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.insert(object_number, entry);
    }

    /// Get an entry by object number.
    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    /// Entry for a reference, regardless of generation.
    pub fn lookup(&self, reference: ObjectRef) -> Option<&XRefEntry> {
        self.get(reference.id)
    }

    /// Byte offset of an in-use object whose generation matches.
    pub fn offset_of(&self, reference: ObjectRef) -> Option<u64> {
        match self.lookup(reference)? {
            XRefEntry::InUse { offset, generation } if *generation == reference.gen => Some(*offset),
            _ => None,
        }
    }

    /// Check if an object number has an entry.
    pub fn contains(&self, object_number: u32) -> bool {
        self.entries.contains_key(&object_number)
    }

    /// Merge entries from an older section.
    ///
    /// Entries already in `self` win, which is what incremental updates
    /// need when `/Prev` is followed from the newest section backwards.
    pub fn merge_from(&mut self, older: CrossRefTable) {
        for (obj_num, entry) in older.entries {
            self.entries.entry(obj_num).or_insert(entry);
        }
    }

    /// Iterate over (object number, entry) pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &XRefEntry)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Get the number of entries in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A trailer dictionary together with the section it closes.
///
/// For cross-reference streams the dictionary is a clone of the stream
/// dictionary, so it can be overlaid without touching the stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trailer {
    /// Trailer entries (`/Root`, `/Size`, `/Prev`, ...)
    pub dict: Dictionary,
    /// Entries of the section this trailer belongs to
    pub xref: Option<CrossRefTable>,
}

impl Trailer {
    /// Trailer without a cross-reference section.
    pub fn new(dict: Dictionary) -> Self {
        Self { dict, xref: None }
    }

    /// Look up a trailer key.
    pub fn get(&self, key: &str) -> Option<&Object> {
        self.dict.get(key)
    }

    /// Document catalog reference.
    pub fn root(&self) -> Option<ObjectRef> {
        self.get("Root").and_then(Object::as_reference)
    }

    /// Document information dictionary reference.
    pub fn info(&self) -> Option<ObjectRef> {
        self.get("Info").and_then(Object::as_reference)
    }

    /// Declared number of object slots.
    pub fn size(&self) -> Option<i64> {
        self.get("Size").and_then(Object::as_integer)
    }

    /// Offset of the previous section.
    pub fn prev(&self) -> Option<u64> {
        offset_value(self.get("Prev"))
    }

    /// Offset of the hybrid-file cross-reference stream.
    pub fn xref_stm(&self) -> Option<u64> {
        offset_value(self.get("XRefStm"))
    }

    /// Whether the document declares encryption.
    pub fn is_encrypted(&self) -> bool {
        self.dict.contains_key("Encrypt")
    }

    /// Fill in keys that only an older trailer defines.
    pub fn overlay(&mut self, older: &Dictionary) {
        for (key, value) in older {
            self.dict.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}

fn offset_value(obj: Option<&Object>) -> Option<u64> {
    obj.and_then(Object::as_integer)
        .and_then(|v| u64::try_from(v).ok())
}

/// `offset generation n|f`, ignoring anything after the flag.
fn entry_line(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8], char)> {
    let (rest, (offset, _, generation, _, flag)) =
        tuple((digit1, space1, digit1, space1, one_of("nf")))(input)?;
    Ok((rest, (offset, generation, flag)))
}

fn ascii_number<T: std::str::FromStr>(digits: &[u8]) -> Option<T> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Parse one classic entry line into (offset, generation, in_use).
pub fn parse_entry_line(line: &[u8]) -> Option<(u64, u16, bool)> {
    let trimmed = match line.iter().position(|b| !b.is_ascii_whitespace()) {
        Some(start) => &line[start..],
        None => return None,
    };
    let (_, (offset, generation, flag)) = entry_line(trimmed).ok()?;
    Some((ascii_number(offset)?, ascii_number(generation)?, flag == 'n'))
}

/// Parse the body of a classic section; the `xref` keyword has already been
/// consumed.
///
/// Returns the table and the token that ended it (normally `trailer`), which
/// the caller has to process next. Free entries are dropped. A subsection
/// shorter than its declared count ends early at the first line that does
/// not start with a digit.
pub fn parse_section<S: ByteSource>(lexer: &mut Lexer<S>) -> Result<(CrossRefTable, Option<Token>)> {
    let mut table = CrossRefTable::new();
    loop {
        let header_at = lexer.position();
        let first = match lexer.next_token()? {
            Some(Token::Integer(first)) => first,
            Some(Token::Comment(_)) => continue,
            other => return Ok((table, other)),
        };
        let count = match lexer.next_token()? {
            Some(Token::Integer(count)) => count,
            other => {
                lexer.record(ParseIssue::MalformedStructure {
                    offset: header_at,
                    reason: "xref subsection header without a count".to_string(),
                });
                return Ok((table, other));
            },
        };
        if first < 0 || !(0..=MAX_SUBSECTION_ENTRIES).contains(&count) || first + count > u32::MAX as i64 {
            lexer.record(ParseIssue::MalformedStructure {
                offset: header_at,
                reason: format!("implausible xref subsection {} {}", first, count),
            });
            return Ok((table, None));
        }

        for i in 0..count {
            lexer.skip_whitespace()?;
            match lexer.source_mut().peek_byte()? {
                Some(b) if b.is_ascii_digit() => {},
                _ => {
                    log::warn!("xref subsection at {} ends after {} of {} entries", header_at, i, count);
                    break;
                },
            }
            let line_at = lexer.position();
            let line = lexer.read_line()?;
            match parse_entry_line(&line) {
                Some((offset, generation, true)) => {
                    table.insert((first + i) as u32, XRefEntry::InUse { offset, generation });
                },
                Some((_, _, false)) => {},
                None => lexer.record(ParseIssue::MalformedStructure {
                    offset: line_at,
                    reason: format!("bad xref entry {:?}", String::from_utf8_lossy(&line)),
                }),
            }
        }
    }
}

/// Read a big-endian unsigned integer.
fn read_int(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Decode the (already unfiltered) payload of a cross-reference stream.
///
/// Records are laid out per `/W`; `/Index` defaults to `[0 Size]`. A missing
/// type field means type 1. Truncated data keeps the entries read so far.
/// Free entries are kept so that they shadow older sections.
pub fn decode_xref_stream(dict: &Dictionary, data: &[u8]) -> Result<CrossRefTable> {
    let w: Vec<usize> = dict
        .get("W")
        .and_then(Object::as_array)
        .ok_or_else(|| Error::InvalidPdf("missing /W array in xref stream".to_string()))?
        .iter()
        .map(|o| o.as_integer().and_then(|v| usize::try_from(v).ok()))
        .collect::<Option<_>>()
        .ok_or_else(|| Error::InvalidPdf("invalid /W array in xref stream".to_string()))?;
    if !(2..=3).contains(&w.len()) || w.iter().any(|&width| width > 8) {
        return Err(Error::InvalidPdf(format!("invalid /W array {:?}", w)));
    }
    let (w1, w2, w3) = (w[0], w[1], w.get(2).copied().unwrap_or(0));
    let entry_size = w1 + w2 + w3;
    if entry_size == 0 {
        return Err(Error::InvalidPdf("zero-width xref stream entries".to_string()));
    }

    let ranges: Vec<(u32, u32)> = match dict.get("Index").and_then(Object::as_array) {
        Some(index) => index
            .chunks_exact(2)
            .filter_map(|pair| {
                let start = u32::try_from(pair[0].as_integer()?).ok()?;
                let count = u32::try_from(pair[1].as_integer()?).ok()?;
                Some((start, count))
            })
            .collect(),
        None => {
            let size = dict
                .get("Size")
                .and_then(Object::as_integer)
                .and_then(|s| u32::try_from(s).ok())
                .ok_or_else(|| Error::InvalidPdf("missing /Size in xref stream".to_string()))?;
            vec![(0, size)]
        },
    };

    let mut table = CrossRefTable::new();
    let mut records = data.chunks_exact(entry_size);
    'ranges: for (start, count) in ranges {
        for i in 0..count {
            let record = match records.next() {
                Some(r) => r,
                None => {
                    log::warn!("xref stream data ends before entry {}", start as u64 + i as u64);
                    break 'ranges;
                },
            };
            let entry_type = if w1 == 0 { 1 } else { read_int(&record[..w1]) };
            let field2 = read_int(&record[w1..w1 + w2]);
            let field3 = read_int(&record[w1 + w2..]);

            let entry = match entry_type {
                0 => XRefEntry::Free {
                    next_free: field2 as u32,
                    generation: field3 as u16,
                },
                1 => XRefEntry::InUse {
                    offset: field2,
                    generation: field3 as u16,
                },
                2 => XRefEntry::Compressed {
                    container: field2 as u32,
                    index: field3 as u32,
                },
                other => {
                    log::debug!("Ignoring xref stream entry of type {}", other);
                    continue;
                },
            };
            table.insert(start.wrapping_add(i), entry);
        }
    }

    Ok(table)
}

fn startxref_value(input: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(tuple((tag("startxref"), multispace0)), digit1)(input)
}

/// Offset named by the last `startxref` in `tail`.
pub fn find_startxref(tail: &[u8]) -> Option<u64> {
    let keyword = b"startxref";
    let at = tail.windows(keyword.len()).rposition(|w| w == keyword)?;
    let (_, digits) = startxref_value(&tail[at..]).ok()?;
    ascii_number(digits)
}

/// Find the offset of the newest cross-reference section by scanning the
/// end of the input.
pub fn find_xref_offset(handle: &SourceHandle) -> Result<u64> {
    let len = handle.len();
    let window = STARTXREF_WINDOW.min(len);
    let tail = handle.read_range(len - window, window)?;
    find_startxref(&tail).ok_or(Error::InvalidXref)
}
