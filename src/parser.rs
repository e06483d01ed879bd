//! Object assembler.
//!
//! A push-down automaton over the token stream: primitive tokens are pushed
//! onto an explicit value stack, closing delimiters and keywords pop what
//! they need and push the assembled value back. There is no recursion in
//! the grammar itself, so nesting depth is bounded only by
//! [`ParserOptions::max_nesting`].
//!
//! Malformed input never produces an error here (unless
//! [`ParserOptions::strict`] is set). Stack underflow, bracket imbalance and
//! similar problems abandon the current object, are recorded as a
//! [`ParseIssue`] and make [`Parser::next_object`] return `None`, so a caller
//! scanning a file can skip one corrupt object and carry on. Use
//! [`Parser::at_end`] to tell that apart from the end of input. I/O failures
//! of the byte source are always returned as errors.
//!
//! # Example
//!
//! ```
//! use pdf_lexis::directory::Detached;
//! use pdf_lexis::object::{Object, ObjectRef};
//! use pdf_lexis::parser::{Parsed, Parser};
//! use pdf_lexis::source::SliceSource;
//!
//! let input = b"10 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj".to_vec();
//! let mut parser = Parser::new(SliceSource::new(input));
//! let parsed = parser.next_object(&mut Detached).unwrap().unwrap();
//!
//! let Parsed::Indirect(obj) = parsed else { panic!("expected an indirect object") };
//! assert_eq!(obj.reference, ObjectRef::new(10, 0));
//! let dict = obj.object.as_dict().unwrap();
//! assert_eq!(dict.get("Pages"), Some(&Object::Reference(ObjectRef::new(2, 0))));
//! ```

use crate::decoders;
use crate::directory::ObjectDirectory;
use crate::error::{Error, ParseIssue, Result};
use crate::factory::ObjectFactory;
use crate::lexer::{Keyword, Lexer, Token};
use crate::object::{dict_name, Dictionary, IndirectObject, Object, ObjectRef, PdfString, Stream};
use crate::parser_config::ParserOptions;
use crate::source::ByteSource;
use crate::stream;
use crate::xref::{self, CrossRefTable, Trailer};
use std::collections::VecDeque;
use std::sync::Arc;

/// Result of one [`Parser::next_object`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    /// A completed `N G obj ... endobj` unit
    Indirect(IndirectObject),
    /// A top-level value outside any indirect object (a trailer, a bare
    /// cross-reference section, or a composite parsed standalone)
    Direct(Object),
}

impl Parsed {
    /// The parsed value, dropping the reference of indirect objects.
    pub fn into_object(self) -> Object {
        match self {
            Parsed::Indirect(obj) => obj.object,
            Parsed::Direct(obj) => obj,
        }
    }

    /// Reference of an indirect object.
    pub fn reference(&self) -> Option<ObjectRef> {
        match self {
            Parsed::Indirect(obj) => Some(obj.reference),
            Parsed::Direct(_) => None,
        }
    }
}

#[derive(Debug)]
enum Slot {
    Value(Object),
    ArrayStart,
    DictStart,
}

#[derive(Debug, Clone, Copy)]
struct ObjectContext {
    reference: ObjectRef,
    offset: u64,
}

/// What the main loop does after handling one token.
enum Step {
    Continue,
    Yield(Option<Parsed>),
}

/// Stack-based object assembler over one byte source.
#[derive(Debug)]
pub struct Parser<S: ByteSource> {
    lexer: Lexer<S>,
    stack: Vec<Slot>,
    depth: usize,
    context: Option<ObjectContext>,
    lookahead: VecDeque<Token>,
    pending_xref: Option<CrossRefTable>,
    options: ParserOptions,
    factory: Arc<ObjectFactory>,
}

impl<S: ByteSource> Parser<S> {
    /// Lenient parser with the default object factory.
    pub fn new(source: S) -> Self {
        Self::with_options(source, ParserOptions::default())
    }

    /// Parser with explicit options and the default object factory.
    pub fn with_options(source: S, options: ParserOptions) -> Self {
        Self::with_factory(source, options, ObjectFactory::shared())
    }

    /// Parser with explicit options and object factory.
    pub fn with_factory(source: S, options: ParserOptions, factory: Arc<ObjectFactory>) -> Self {
        Self {
            lexer: Lexer::new(source),
            stack: Vec::new(),
            depth: 0,
            context: None,
            lookahead: VecDeque::new(),
            pending_xref: None,
            options,
            factory,
        }
    }

    /// Recoverable problems seen so far.
    pub fn issues(&self) -> &[ParseIssue] {
        self.lexer.issues()
    }

    /// Drain the recorded issues.
    pub fn take_issues(&mut self) -> Vec<ParseIssue> {
        self.lexer.take_issues()
    }

    /// Offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.lexer.position()
    }

    /// The options this parser runs with.
    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Whether all input has been consumed.
    pub fn at_end(&mut self) -> Result<bool> {
        if !self.lookahead.is_empty() {
            return Ok(false);
        }
        self.lexer.skip_whitespace()?;
        Ok(self.lexer.source_mut().peek_byte()?.is_none())
    }

    /// Pop a finished top-level value left on the stack.
    ///
    /// Standalone primitives (`42`, `/Name`) are never returned by
    /// [`next_object`](Self::next_object) because nothing marks their end;
    /// callers that parse a bounded buffer take them from here once the
    /// input is exhausted.
    pub fn take_value(&mut self) -> Option<Object> {
        if self.depth != 0 {
            return None;
        }
        match self.stack.pop() {
            Some(Slot::Value(v)) => Some(v),
            Some(other) => {
                self.stack.push(other);
                None
            },
            None => None,
        }
    }

    /// Assemble the next top-level object.
    ///
    /// Returns `None` at end of input, and also when the current object was
    /// malformed and abandoned (see [`Parser::at_end`]). Completed indirect
    /// objects are registered with `dir` before they are returned.
    pub fn next_object(&mut self, dir: &mut dyn ObjectDirectory) -> Result<Option<Parsed>> {
        loop {
            let token = match self.next_token()? {
                Some(token) => token,
                None => return self.finish_at_eof(dir),
            };

            let step = match token {
                Token::Comment(_) => Step::Continue,
                Token::Integer(i) => self.push(Object::Integer(i)),
                Token::Real(r) => self.push(Object::Real(r)),
                Token::LiteralString(bytes) => {
                    let s = PdfString::with_owner(bytes, self.owner());
                    self.push(Object::LiteralString(s))
                },
                Token::HexString(bytes) => {
                    let s = PdfString::with_owner(bytes, self.owner());
                    self.push(Object::HexString(s))
                },
                Token::Name(name) => self.push(Object::Name(name)),
                Token::ArrayStart => self.open(Slot::ArrayStart)?,
                Token::DictStart => self.open(Slot::DictStart)?,
                Token::ArrayEnd => match self.close_array() {
                    Some(value) => self.composite_closed(value, dir)?,
                    None => self.abort("unbalanced ]")?,
                },
                Token::DictEnd => match self.close_dictionary() {
                    Some(value) => self.composite_closed(value, dir)?,
                    None => self.abort("unbalanced >>")?,
                },
                Token::Keyword(keyword) => self.keyword(keyword, dir)?,
            };

            if let Step::Yield(result) = step {
                return Ok(result);
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        match self.lookahead.pop_front() {
            Some(token) => Ok(Some(token)),
            None => self.lexer.next_token(),
        }
    }

    /// Next token that is not a comment, left in the lookahead.
    fn peek_significant(&mut self) -> Result<Option<&Token>> {
        loop {
            if self.lookahead.is_empty() {
                match self.lexer.next_token()? {
                    Some(token) => self.lookahead.push_back(token),
                    None => return Ok(None),
                }
            }
            if matches!(self.lookahead.front(), Some(Token::Comment(_))) {
                self.lookahead.pop_front();
                continue;
            }
            return Ok(self.lookahead.front());
        }
    }

    fn owner(&self) -> Option<ObjectRef> {
        self.context.map(|c| c.reference)
    }

    fn push(&mut self, value: Object) -> Step {
        self.stack.push(Slot::Value(value));
        Step::Continue
    }

    fn open(&mut self, marker: Slot) -> Result<Step> {
        if self.depth >= self.options.max_nesting {
            return self.abort("nesting too deep");
        }
        self.depth += 1;
        self.stack.push(marker);
        Ok(Step::Continue)
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.depth = 0;
        self.context = None;
    }

    /// Abandon the current object.
    fn abort(&mut self, reason: &str) -> Result<Step> {
        let offset = self.lexer.position();
        log::warn!("Malformed structure at byte {}: {}", offset, reason);
        self.reset();
        if self.options.strict {
            return Err(Error::ParseError {
                offset,
                reason: reason.to_string(),
            });
        }
        self.lexer.record(ParseIssue::MalformedStructure {
            offset,
            reason: reason.to_string(),
        });
        Ok(Step::Yield(None))
    }

    fn pop_integer(&mut self) -> Option<i64> {
        match self.stack.pop() {
            Some(Slot::Value(Object::Integer(i))) => Some(i),
            Some(other) => {
                self.stack.push(other);
                None
            },
            None => None,
        }
    }

    /// Pop `object generation` in push order.
    fn pop_reference(&mut self) -> Option<ObjectRef> {
        let gen = self.pop_integer()?;
        let id = self.pop_integer()?;
        ObjectRef::from_numbers(id, gen)
    }

    /// Pop values down to the innermost marker; `None` if the marker is not
    /// the expected one.
    fn pop_until(&mut self, array: bool) -> Option<Vec<Object>> {
        let mut values = Vec::new();
        loop {
            match self.stack.pop()? {
                Slot::Value(v) => values.push(v),
                Slot::ArrayStart if array => break,
                Slot::DictStart if !array => break,
                _ => return None,
            }
        }
        values.reverse();
        self.depth -= 1;
        Some(values)
    }

    fn close_array(&mut self) -> Option<Object> {
        self.pop_until(true).map(Object::Array)
    }

    fn close_dictionary(&mut self) -> Option<Object> {
        let values = self.pop_until(false)?;
        if values.len() % 2 != 0 {
            log::warn!("Dictionary with an odd number of entries at byte {}", self.lexer.position());
        }
        let mut dict = Dictionary::with_capacity(values.len() / 2);
        let mut iter = values.into_iter();
        while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
            match key {
                Object::Name(name) => {
                    dict.insert(name, value);
                },
                other => log::warn!("Skipping dictionary entry with {} key", other.type_name()),
            }
        }
        Some(self.factory.construct_dictionary(dict))
    }

    /// A composite value was just assembled.
    ///
    /// Nested values go back on the stack. At the top level the next token
    /// decides: `stream` and `endobj` continue the current object, anything
    /// else means the value is complete on its own.
    fn composite_closed(&mut self, value: Object, dir: &mut dyn ObjectDirectory) -> Result<Step> {
        if self.depth > 0 {
            return Ok(self.push(value));
        }

        let next = self.peek_significant()?.cloned();
        match (self.context, next) {
            (_, Some(Token::Keyword(Keyword::Stream))) => Ok(self.push(value)),
            (Some(_), Some(Token::Keyword(Keyword::EndObj))) => Ok(self.push(value)),
            (Some(ctx), _) => {
                if self.options.allow_missing_endobj {
                    log::warn!("Object {} has no endobj; completing it at byte {}", ctx.reference, self.position());
                    self.complete(ctx.reference, value, dir)
                } else {
                    Ok(self.push(value))
                }
            },
            (None, _) => Ok(Step::Yield(Some(Parsed::Direct(value)))),
        }
    }

    /// Close the current indirect object with `value`.
    fn complete(&mut self, reference: ObjectRef, value: Object, dir: &mut dyn ObjectDirectory) -> Result<Step> {
        dir.register(reference, value.clone());
        self.reset();
        Ok(Step::Yield(Some(Parsed::Indirect(IndirectObject {
            reference,
            object: value,
        }))))
    }

    /// Top-of-stack value of the current object, `Null` for an empty body.
    fn object_value(&mut self) -> Option<Object> {
        if self.depth != 0 {
            return None;
        }
        match self.stack.pop() {
            Some(Slot::Value(v)) => Some(v),
            Some(_) => None,
            None => Some(Object::Null),
        }
    }

    fn keyword(&mut self, keyword: Keyword, dir: &mut dyn ObjectDirectory) -> Result<Step> {
        match keyword {
            Keyword::True => Ok(self.push(Object::Boolean(true))),
            Keyword::False => Ok(self.push(Object::Boolean(false))),
            Keyword::Null => Ok(self.push(Object::Null)),
            Keyword::R => match self.pop_reference() {
                Some(r) => Ok(self.push(Object::Reference(r))),
                None => self.abort("R without object and generation numbers"),
            },
            Keyword::Obj => self.begin_object(dir),
            Keyword::EndObj => self.end_object(dir),
            Keyword::Stream => self.read_stream(dir),
            Keyword::EndStream => self.end_stream(dir),
            Keyword::Xref => {
                let (table, terminator) = xref::parse_section(&mut self.lexer)?;
                log::debug!("Parsed xref section with {} entries", table.len());
                if let Some(token) = terminator {
                    self.lookahead.push_front(token);
                }
                self.pending_xref = Some(table);
                Ok(Step::Continue)
            },
            Keyword::Trailer => self.read_trailer(dir),
            Keyword::StartXref => {
                // `startxref N` only matters to the document loader
                if matches!(self.peek_significant()?, Some(Token::Integer(_))) {
                    self.lookahead.pop_front();
                }
                Ok(Step::Continue)
            },
            Keyword::Other(word) => Ok(self.push(Object::Keyword(word))),
        }
    }

    fn begin_object(&mut self, dir: &mut dyn ObjectDirectory) -> Result<Step> {
        let reference = match self.pop_reference() {
            Some(r) => r,
            None => return self.abort("obj without object and generation numbers"),
        };

        let mut step = Step::Continue;
        if let Some(prev) = self.context {
            // The previous object never saw its endobj
            match self.object_value() {
                Some(value) if self.options.allow_missing_endobj => {
                    log::warn!("Object {} has no endobj before object {}", prev.reference, reference);
                    dir.register(prev.reference, value.clone());
                    step = Step::Yield(Some(Parsed::Indirect(IndirectObject {
                        reference: prev.reference,
                        object: value,
                    })));
                },
                _ => {
                    self.lexer.record(ParseIssue::MalformedStructure {
                        offset: prev.offset,
                        reason: format!("object {} not terminated", prev.reference),
                    });
                },
            }
        } else if !self.stack.is_empty() {
            log::debug!("Discarding {} stray values before object {}", self.stack.len(), reference);
        }

        self.stack.clear();
        self.depth = 0;
        self.context = Some(ObjectContext {
            reference,
            offset: self.lexer.position(),
        });
        Ok(step)
    }

    fn end_object(&mut self, dir: &mut dyn ObjectDirectory) -> Result<Step> {
        let ctx = match self.context {
            Some(ctx) => ctx,
            None => return self.abort("endobj outside an object"),
        };
        match self.object_value() {
            Some(value) => self.complete(ctx.reference, value, dir),
            None => self.abort("unbalanced brackets in object"),
        }
    }

    fn read_stream(&mut self, dir: &mut dyn ObjectDirectory) -> Result<Step> {
        let dict = match self.stack.pop() {
            Some(Slot::Value(obj)) => obj.into_dictionary(),
            _ => None,
        };
        let dict = match dict {
            Some(d) => d,
            None => return self.abort("stream without a dictionary"),
        };

        let start = self.lexer.position();
        let declared = match dict.get("Length") {
            Some(Object::Integer(n)) => u64::try_from(*n).ok(),
            Some(Object::Reference(r)) => self.resolve_length(*r, start, dir)?,
            _ => None,
        };
        let trust = self.lexer.source().is_random_access()
            && !dir.is_linear_scan_mode()
            && self.options.trust_stream_lengths;

        let data = stream::extract(&mut self.lexer, declared, trust)?;
        let stream = Stream {
            dict,
            data,
            kind: None,
            owner: self.owner(),
        };

        let value = if dict_name(&stream.dict, "Type") == Some("XRef") {
            self.fold_xref_stream(stream)
        } else {
            self.factory.construct_stream(stream)
        };
        self.stack.push(Slot::Value(value));
        // The extractor already consumed the keyword
        self.lookahead.push_front(Token::Keyword(Keyword::EndStream));
        Ok(Step::Continue)
    }

    fn resolve_length(
        &mut self,
        reference: ObjectRef,
        offset: u64,
        dir: &mut dyn ObjectDirectory,
    ) -> Result<Option<u64>> {
        match dir.resolve(reference) {
            Ok(Object::Integer(n)) if n >= 0 => Ok(Some(n as u64)),
            Err(e) if e.is_io() => Err(e),
            other => {
                log::debug!("Stream /Length {} unresolvable: {:?}", reference, other);
                self.lexer
                    .record(ParseIssue::UnresolvableIndirectLength { offset, reference });
                Ok(None)
            },
        }
    }

    /// Decode a cross-reference stream into a trailer. The stream stays a
    /// plain stream if it cannot be decoded.
    fn fold_xref_stream(&mut self, stream: Stream) -> Object {
        let table = decoders::decode_stream_object(&stream, Some(&self.options))
            .and_then(|data| xref::decode_xref_stream(&stream.dict, &data));
        match table {
            Ok(table) => Object::Trailer(Box::new(Trailer {
                dict: stream.dict.clone(),
                xref: Some(table),
            })),
            Err(e) => {
                log::warn!("Cannot decode cross-reference stream {:?}: {}", stream.owner, e);
                Object::Stream(Box::new(stream))
            },
        }
    }

    fn end_stream(&mut self, dir: &mut dyn ObjectDirectory) -> Result<Step> {
        let ctx = match self.context {
            Some(ctx) => ctx,
            None => {
                if let Some(value) = self.take_value() {
                    return Ok(Step::Yield(Some(Parsed::Direct(value))));
                }
                return Ok(Step::Continue);
            },
        };

        if matches!(self.peek_significant()?, Some(Token::Keyword(Keyword::EndObj))) {
            self.lookahead.pop_front();
        } else if self.options.allow_missing_endobj {
            log::warn!("Stream object {} has no endobj", ctx.reference);
        } else {
            return self.abort("endstream not followed by endobj");
        }

        match self.object_value() {
            Some(value) => self.complete(ctx.reference, value, dir),
            None => self.abort("unbalanced brackets around stream"),
        }
    }

    fn read_trailer(&mut self, dir: &mut dyn ObjectDirectory) -> Result<Step> {
        let at = self.lexer.position();
        self.reset();
        let dict = match self.next_object(dir)? {
            Some(Parsed::Direct(obj)) => obj.into_dictionary(),
            _ => None,
        };
        let xref = self.pending_xref.take();
        match dict {
            Some(dict) => Ok(Step::Yield(Some(Parsed::Direct(Object::Trailer(Box::new(Trailer {
                dict,
                xref,
            })))))),
            None => {
                self.lexer.record(ParseIssue::MalformedStructure {
                    offset: at,
                    reason: "trailer without a dictionary".to_string(),
                });
                Ok(Step::Yield(xref.map(|t| Parsed::Direct(Object::CrossReference(t)))))
            },
        }
    }

    fn finish_at_eof(&mut self, dir: &mut dyn ObjectDirectory) -> Result<Option<Parsed>> {
        if let Some(ctx) = self.context {
            self.lexer.record(ParseIssue::TruncatedInput { offset: ctx.offset });
            if self.options.allow_missing_endobj && !self.stack.is_empty() {
                if let Some(value) = self.object_value() {
                    log::warn!("Input ends inside object {}; completing it", ctx.reference);
                    if let Step::Yield(done) = self.complete(ctx.reference, value, dir)? {
                        return Ok(done);
                    }
                }
            }
            self.reset();
            return Ok(None);
        }
        Ok(self
            .pending_xref
            .take()
            .map(|t| Parsed::Direct(Object::CrossReference(t))))
    }
}
