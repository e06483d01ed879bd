//! Stream payload location.
//!
//! Called by the assembler right after the `stream` keyword. The payload is
//! located either by trusting the declared `/Length` (random-access inputs)
//! or by copying bytes until the literal `endstream` (everything else). In
//! both cases the extractor consumes the `endstream` keyword itself.

use crate::error::{ParseIssue, Result};
use crate::lexer::Lexer;
use crate::source::{ByteSource, SourceHandle};
use bytes::Bytes;

const ENDSTREAM: &[u8] = b"endstream";

#[derive(Debug, Clone)]
enum Backing {
    Source(SourceHandle),
    Owned(Bytes),
}

/// Location of a stream's raw payload.
///
/// The range is opaque: it is never tokenized, and no filter is applied
/// until someone asks for the decoded data.
#[derive(Debug, Clone)]
pub struct StreamByteRange {
    start: u64,
    length: u64,
    backing: Backing,
    trusted: bool,
}

impl StreamByteRange {
    /// Range over `length` bytes of `handle` at `start`, located through a
    /// trusted declared length.
    pub fn in_source(handle: SourceHandle, start: u64, length: u64) -> Self {
        Self {
            start,
            length,
            backing: Backing::Source(handle),
            trusted: true,
        }
    }

    /// Payload copied into its own buffer.
    pub fn owned(data: Bytes) -> Self {
        Self::owned_at(0, data)
    }

    /// Payload copied into its own buffer, read from `start` in the input.
    pub fn owned_at(start: u64, data: Bytes) -> Self {
        Self {
            start,
            length: data.len() as u64,
            backing: Backing::Owned(data),
            trusted: false,
        }
    }

    /// Offset of the first payload byte in the input.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Payload length in bytes.
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether the range was located through the declared length.
    pub fn is_trusted(&self) -> bool {
        self.trusted
    }

    /// Materialize the payload bytes.
    pub fn raw_bytes(&self) -> Result<Bytes> {
        match &self.backing {
            Backing::Source(handle) => handle.read_range(self.start, self.length),
            Backing::Owned(data) => Ok(data.clone()),
        }
    }
}

impl PartialEq for StreamByteRange {
    fn eq(&self, other: &Self) -> bool {
        if self.start != other.start || self.length != other.length || self.trusted != other.trusted {
            return false;
        }
        match (&self.backing, &other.backing) {
            (Backing::Owned(a), Backing::Owned(b)) => a == b,
            (Backing::Source(_), Backing::Source(_)) => true,
            _ => false,
        }
    }
}

/// Consume the line ending after `stream`.
///
/// CRLF and LF are consumed. A bare CR is part of the payload and is left
/// unread. Returns whether the line ending was CRLF; the writer is expected
/// to end the payload the same way.
fn consume_stream_eol<S: ByteSource>(source: &mut S) -> Result<bool> {
    match source.next_byte()? {
        Some(b'\r') => match source.next_byte()? {
            Some(b'\n') => return Ok(true),
            Some(other) => {
                source.unread(other);
                source.unread(b'\r');
            },
            None => source.unread(b'\r'),
        },
        Some(b'\n') => {},
        Some(other) => source.unread(other),
        None => {},
    }
    Ok(false)
}

/// Length of the line ending that precedes `endstream` at the end of `tail`.
///
/// Only one EOL is removed. `\r\n` counts as one EOL only when the payload
/// was opened with CRLF; otherwise a trailing `\r` before `\n` is payload.
fn trailing_eol_len(tail: &[u8], crlf: bool) -> usize {
    if crlf && tail.ends_with(b"\r\n") {
        2
    } else if tail.ends_with(b"\n") || tail.ends_with(b"\r") {
        1
    } else {
        0
    }
}

enum KeywordAt {
    EndStream,
    EndObj,
    Other,
}

/// After reading an `e` at `at`, check what keyword it starts. On anything
/// but `endstream` the cursor is moved back to just after the `e`.
fn peek_keyword<S: ByteSource>(source: &mut S, at: u64) -> Result<KeywordAt> {
    let mut buf = Vec::with_capacity(ENDSTREAM.len() - 1);
    while buf.len() < ENDSTREAM.len() - 1 {
        match source.next_byte()? {
            Some(b) => buf.push(b),
            None => break,
        }
    }
    if buf.as_slice() == &ENDSTREAM[1..] {
        return Ok(KeywordAt::EndStream);
    }
    source.seek(at + 1)?;
    if buf.starts_with(b"ndobj") {
        Ok(KeywordAt::EndObj)
    } else {
        Ok(KeywordAt::Other)
    }
}

/// Locate the payload using the declared length.
///
/// Every byte between `start + declared` and `endstream` is payload except
/// one line ending, so a short `/Length` yields the same bytes as a correct
/// one. Returns `None` when the length cannot be right (no `endstream` before
/// end of input, or the enclosing `endobj` shows up first); the cursor is
/// then back at `start`.
fn extract_trusted<S: ByteSource>(
    lexer: &mut Lexer<S>,
    handle: SourceHandle,
    start: u64,
    declared: u64,
    crlf: bool,
) -> Result<Option<StreamByteRange>> {
    let source = lexer.source_mut();
    let floor = start + declared;
    source.seek(floor)?;

    // Last two bytes scanned past the declared end
    let mut tail: Vec<u8> = Vec::with_capacity(2);
    let mut push = |b: u8| {
        if tail.len() == 2 {
            tail.remove(0);
        }
        tail.push(b);
    };
    let end_at = loop {
        let at = source.position();
        match source.next_byte()? {
            None => {
                source.seek(start)?;
                return Ok(None);
            },
            Some(b'e') => match peek_keyword(source, at)? {
                KeywordAt::EndStream => break at,
                KeywordAt::EndObj => {
                    source.seek(start)?;
                    return Ok(None);
                },
                KeywordAt::Other => push(b'e'),
            },
            Some(b) => push(b),
        }
    };

    let data_end = end_at - trailing_eol_len(&tail, crlf) as u64;
    let actual = data_end.max(floor) - start;
    if actual != declared {
        log::warn!(
            "Stream at {} declares /Length {} but endstream follows {} bytes",
            start,
            declared,
            actual
        );
        lexer.record(ParseIssue::LengthMismatch {
            offset: start,
            declared,
            actual,
        });
    }
    Ok(Some(StreamByteRange::in_source(handle, start, actual)))
}

/// Copy bytes until the literal `endstream`.
fn extract_scanning<S: ByteSource>(lexer: &mut Lexer<S>, start: u64, crlf: bool) -> Result<StreamByteRange> {
    let mut buf = Vec::new();
    let mut found = false;
    while let Some(b) = lexer.source_mut().next_byte()? {
        buf.push(b);
        if buf.ends_with(ENDSTREAM) {
            buf.truncate(buf.len() - ENDSTREAM.len());
            found = true;
            break;
        }
    }
    if !found {
        lexer.record(ParseIssue::TruncatedInput { offset: start });
    }

    // The line ending before `endstream` is not payload
    let eol = trailing_eol_len(&buf, crlf);
    buf.truncate(buf.len() - eol);
    Ok(StreamByteRange::owned_at(start, Bytes::from(buf)))
}

/// Locate the payload of the stream whose `stream` keyword was just read.
///
/// `declared` is the dictionary's `/Length` when it is known. `trust` is the
/// caller's permission to rely on it; it only takes effect on random-access
/// sources and when the declared range lies within the input. On return the
/// cursor is just past `endstream`.
pub fn extract<S: ByteSource>(
    lexer: &mut Lexer<S>,
    declared: Option<u64>,
    trust: bool,
) -> Result<StreamByteRange> {
    let crlf = consume_stream_eol(lexer.source_mut())?;
    let source = lexer.source();
    let start = source.position();

    let trusted_path = match (declared, source.handle(), source.total_len()) {
        (Some(len), Some(handle), Some(total))
            if trust && source.is_random_access() && len > 0 && start.saturating_add(len) <= total =>
        {
            Some((handle, len))
        },
        _ => None,
    };

    if let Some((handle, len)) = trusted_path {
        if let Some(range) = extract_trusted(lexer, handle, start, len, crlf)? {
            return Ok(range);
        }
        log::warn!("Declared /Length {} at {} is unusable; scanning for endstream", len, start);
    }
    extract_scanning(lexer, start, crlf)
}
